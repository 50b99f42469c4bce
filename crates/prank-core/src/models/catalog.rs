//! Credit package catalog
//!
//! Packages are configuration data: an identifier, a credit count and a
//! price in minor currency units. The recurring package is sold as a
//! subscription that grants its credits once per period.

use serde::{Deserialize, Serialize};

/// A purchasable credit package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub credits: i32,
    /// Price in minor units (cents)
    pub price_cents: i64,
    #[serde(default)]
    pub recurring: bool,
}

impl Package {
    pub fn one_time(id: &str, name: &str, credits: i32, price_cents: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            credits,
            price_cents,
            recurring: false,
        }
    }

    pub fn recurring(id: &str, name: &str, credits: i32, price_cents: i64) -> Self {
        Self {
            recurring: true,
            ..Self::one_time(id, name, credits, price_cents)
        }
    }

    /// Price after a percentage discount, rounded to the nearest cent
    pub fn discounted_price(&self, percent_off: i32) -> i64 {
        let percent = i64::from(percent_off.clamp(0, 100));
        (self.price_cents * (100 - percent) + 50) / 100
    }
}

/// Lookup table over the configured packages
#[derive(Debug, Clone, Default)]
pub struct PackageCatalog {
    packages: Vec<Package>,
}

impl PackageCatalog {
    pub fn new(packages: Vec<Package>) -> Self {
        Self { packages }
    }

    pub fn find(&self, id: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn all(&self) -> &[Package] {
        &self.packages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_package() {
        let catalog = PackageCatalog::new(vec![
            Package::one_time("single", "1 Prank", 1, 299),
            Package::recurring("monthly", "Monthly", 5, 999),
        ]);

        assert_eq!(catalog.find("single").map(|p| p.credits), Some(1));
        assert!(catalog.find("monthly").map(|p| p.recurring).unwrap_or(false));
        assert!(catalog.find("pack_100").is_none());
    }

    #[test]
    fn test_discounted_price() {
        let pack = Package::one_time("pack_3", "3 Pranks", 3, 799);
        assert_eq!(pack.discounted_price(0), 799);
        assert_eq!(pack.discounted_price(50), 400);
        assert_eq!(pack.discounted_price(100), 0);
        assert_eq!(pack.discounted_price(150), 0);
    }
}
