//! Payment models
//!
//! Checkout sessions exchanged with the payment gateway and the records
//! that make session reconciliation idempotent.

use super::catalog::Package;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reconciled payment session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// External checkout session id (idempotency key)
    pub session_id: String,
    pub user_id: Uuid,
    pub package_id: String,
    pub credits_granted: i32,
    pub amount_cents: Option<i64>,
    pub promo_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Credits to grant for a verified session
#[derive(Debug, Clone)]
pub struct PaymentGrant {
    pub session_id: String,
    pub user_id: Uuid,
    pub package_id: String,
    pub credits: i32,
    pub amount_cents: Option<i64>,
    /// Promo code whose usage counter is bumped with the grant
    pub promo_code: Option<String>,
}

/// Parameters for a new checkout session
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub package: Package,
    pub customer_email: Option<String>,
    /// Gateway coupon created for a validated promo code
    pub coupon_id: Option<String>,
    pub promo_code: Option<String>,
}

/// Checkout session as reported by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Redirect URL; only present while the session is open
    pub url: Option<String>,
    /// Payment captured (one-time) or subscription started
    pub paid: bool,
    pub amount_total: Option<i64>,
    /// `user_id` stored in the session metadata at creation
    pub metadata_user_id: Option<String>,
    pub metadata_package_id: Option<String>,
    pub metadata_promo_code: Option<String>,
}

impl CheckoutSession {
    /// Whether the session was created for `user_id`
    pub fn belongs_to(&self, user_id: Uuid) -> bool {
        self.metadata_user_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(|owner| owner == user_id)
            .unwrap_or(false)
    }
}

/// Subscription invoice as reported by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub paid: bool,
    /// `subscription_create` for the first period, `subscription_cycle` for renewals
    pub billing_reason: Option<String>,
    pub amount_paid: Option<i64>,
    /// Metadata copied from the subscription at checkout
    pub metadata_user_id: Option<String>,
    pub metadata_package_id: Option<String>,
}

impl Invoice {
    /// Paid invoice for a period after the first; the first one is credited
    /// through its checkout session
    pub fn is_paid_renewal(&self) -> bool {
        self.paid && self.billing_reason.as_deref() == Some("subscription_cycle")
    }

    pub fn owner(&self) -> Option<Uuid> {
        self.metadata_user_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_belongs_to_requires_matching_metadata() {
        let user = Uuid::new_v4();
        let mut session = CheckoutSession {
            id: "cs_test_1".to_string(),
            metadata_user_id: Some(user.to_string()),
            ..Default::default()
        };
        assert!(session.belongs_to(user));
        assert!(!session.belongs_to(Uuid::new_v4()));

        session.metadata_user_id = None;
        assert!(!session.belongs_to(user));

        session.metadata_user_id = Some("not-a-uuid".to_string());
        assert!(!session.belongs_to(user));
    }

    #[test]
    fn test_only_paid_cycle_invoices_renew() {
        let mut invoice = Invoice {
            id: "in_test_1".to_string(),
            paid: true,
            billing_reason: Some("subscription_cycle".to_string()),
            ..Default::default()
        };
        assert!(invoice.is_paid_renewal());

        invoice.billing_reason = Some("subscription_create".to_string());
        assert!(!invoice.is_paid_renewal());

        invoice.billing_reason = Some("subscription_cycle".to_string());
        invoice.paid = false;
        assert!(!invoice.is_paid_renewal());
    }
}
