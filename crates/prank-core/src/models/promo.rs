//! Promo code model

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Percentage discount code applied at checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    pub code: String,
    pub percent_off: i32,
    /// `None` means unlimited
    pub max_uses: Option<i32>,
    pub times_used: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    /// Check the code can still be redeemed at `now`
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        if !self.active {
            return Err(AppError::Validation(format!(
                "Promo code '{}' is not active",
                self.code
            )));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(AppError::Validation(format!(
                    "Promo code '{}' has expired",
                    self.code
                )));
            }
        }
        if let Some(max) = self.max_uses {
            if self.times_used >= max {
                return Err(AppError::Validation(format!(
                    "Promo code '{}' has reached its usage limit",
                    self.code
                )));
            }
        }
        if !(1..=100).contains(&self.percent_off) {
            return Err(AppError::Validation(format!(
                "Promo code '{}' has an invalid discount",
                self.code
            )));
        }
        Ok(())
    }

    /// Codes are matched case-insensitively and stored upper-case
    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promo() -> PromoCode {
        PromoCode {
            code: "SCHERZO20".to_string(),
            percent_off: 20,
            max_uses: Some(10),
            times_used: 3,
            expires_at: Some(Utc::now() + Duration::days(7)),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_usable_promo() {
        assert!(promo().check_usable(Utc::now()).is_ok());
    }

    #[test]
    fn test_expired_promo() {
        let expired = PromoCode {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..promo()
        };
        assert!(expired.check_usable(Utc::now()).is_err());
    }

    #[test]
    fn test_exhausted_and_inactive_promo() {
        let exhausted = PromoCode {
            times_used: 10,
            ..promo()
        };
        assert!(exhausted.check_usable(Utc::now()).is_err());

        let inactive = PromoCode {
            active: false,
            ..promo()
        };
        assert!(inactive.check_usable(Utc::now()).is_err());

        let unlimited = PromoCode {
            max_uses: None,
            times_used: 10_000,
            ..promo()
        };
        assert!(unlimited.check_usable(Utc::now()).is_ok());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(PromoCode::normalize("  scherzo20 "), "SCHERZO20");
    }
}
