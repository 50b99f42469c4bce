//! Payment DTOs

use chrono::{DateTime, Utc};
use prank_core::models::{Package, PaymentRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Create checkout session request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[validate(length(min = 1, max = 50, message = "Package is required"))]
    pub package_id: String,

    #[serde(default)]
    #[validate(length(max = 50))]
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

/// Verify payment request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 255, message = "Session id is required"))]
    pub session_id: String,
}

/// Stripe event notification; only the type and object id are read
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: StripeEventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventObject {
    pub id: String,
}

/// Package as listed to callers
#[derive(Debug, Clone, Serialize)]
pub struct PackageResponse {
    pub id: String,
    pub name: String,
    pub credits: i32,
    pub price_cents: i64,
    pub recurring: bool,
}

impl From<&Package> for PackageResponse {
    fn from(package: &Package) -> Self {
        Self {
            id: package.id.clone(),
            name: package.name.clone(),
            credits: package.credits,
            price_cents: package.price_cents,
            recurring: package.recurring,
        }
    }
}

/// Reconciled payment, admin view
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecordResponse {
    pub session_id: String,
    pub user_id: Uuid,
    pub package_id: String,
    pub credits_granted: i32,
    pub amount_cents: Option<i64>,
    pub promo_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentRecord> for PaymentRecordResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            session_id: record.session_id,
            user_id: record.user_id,
            package_id: record.package_id,
            credits_granted: record.credits_granted,
            amount_cents: record.amount_cents,
            promo_code: record.promo_code,
            created_at: record.created_at,
        }
    }
}
