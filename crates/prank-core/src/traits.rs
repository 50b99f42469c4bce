//! Common traits for repositories and providers
//!
//! Repositories abstract the relational store; providers abstract the
//! third-party HTTP APIs. Services only depend on these traits.

use crate::error::AppError;
use crate::models::{
    AuditLog, AuditLogData, CallRequest, CallScript, CallStatus, CheckoutRequest, CheckoutSession,
    ConsumeOutcome, ContentCheck, EndCallOutcome, GrantOutcome, Invoice, ModerationVerdict,
    NormalizedStatus, PaymentGrant, PaymentRecord, Profile, PromoCode, ProviderKind,
    RevealStatus, RuntimeSettings, StatusUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

// ==================== Repositories ====================

/// Call request persistence
#[async_trait]
pub trait CallRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CallRequest>, AppError>;

    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallRequest>, AppError>;

    /// Scheduled requests whose `scheduled_at <= now`
    async fn find_due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CallRequest>, AppError>;

    /// Record a successful dispatch.
    ///
    /// Applies only while the request has no provider call id and is still
    /// pending or scheduled. Returns false when another dispatch won.
    async fn mark_initiated(
        &self,
        id: Uuid,
        provider: ProviderKind,
        provider_call_id: &str,
    ) -> Result<bool, AppError>;

    /// Compare-and-set status update.
    ///
    /// Applies only if the stored status still equals `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: CallStatus,
        update: &StatusUpdate,
    ) -> Result<bool, AppError>;
}

/// Per-user prank credit balance
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<i32, AppError>;

    /// Decrement one credit, at most once per call request
    async fn consume_for_call(
        &self,
        user_id: Uuid,
        call_request_id: Uuid,
    ) -> Result<ConsumeOutcome, AppError>;

    /// Grant credits for a payment session, at most once per session id.
    ///
    /// Counts a promo code use in the same transaction.
    async fn grant_for_payment(&self, grant: &PaymentGrant) -> Result<GrantOutcome, AppError>;
}

/// Admin-editable key/value settings
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_all(&self) -> Result<HashMap<String, String>, AppError>;

    async fn upsert(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Fresh settings snapshot
    async fn load(&self) -> Result<RuntimeSettings, AppError> {
        Ok(RuntimeSettings::from_pairs(self.get_all().await?))
    }
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<Profile>, AppError>;
}

/// Reveal notification idempotency
#[async_trait]
pub trait RevealNotificationRepository: Send + Sync {
    /// Claim the notification slot for a call request.
    ///
    /// Returns false if it was claimed before.
    async fn claim(&self, call_request_id: Uuid, recipient: &str) -> Result<bool, AppError>;

    async fn finish(
        &self,
        call_request_id: Uuid,
        status: RevealStatus,
        message: Option<&str>,
        provider_message_id: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait PaymentRecordRepository: Send + Sync {
    async fn find_by_session(&self, session_id: &str) -> Result<Option<PaymentRecord>, AppError>;

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<PaymentRecord>, i64), AppError>;
}

#[async_trait]
pub trait PromoCodeRepository: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, AppError>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn insert(&self, entry: AuditLogData) -> Result<(), AppError>;

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<AuditLog>, i64), AppError>;
}

// ==================== Providers ====================

/// Telephony / voice-AI provider contract
#[async_trait]
pub trait CallProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Submit the outbound call; returns the provider's call id
    async fn start_call(
        &self,
        request: &CallRequest,
        script: &CallScript,
    ) -> Result<String, AppError>;

    async fn end_call(&self, provider_call_id: &str) -> Result<EndCallOutcome, AppError>;

    /// Map a provider status token to the internal vocabulary
    fn normalize_status(&self, token: &str) -> NormalizedStatus;

    /// Stored form of a provider recording reference
    fn recording_url(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Outbound text messages
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Returns the provider message id
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, AppError>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, AppError>;

    async fn retrieve_invoice(&self, invoice_id: &str) -> Result<Invoice, AppError>;

    /// One-off percentage coupon; returns the coupon id
    async fn create_coupon(&self, percent_off: i32, label: &str) -> Result<String, AppError>;
}

/// LLM classifier behind the content gate
#[async_trait]
pub trait ModerationClient: Send + Sync {
    async fn classify(&self, check: &ContentCheck) -> Result<ModerationVerdict, AppError>;
}

/// The configured call providers, selected by kind
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<ProviderKind, Arc<dyn CallProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn CallProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn CallProvider>, AppError> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::Config(format!("call provider '{}' is not configured", kind)))
    }
}

// ==================== Pagination ====================

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 200),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination() {
        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);
        assert_eq!(p.limit(), 20);

        let p = Pagination::new(0, 10);
        assert_eq!(p.page, 1);

        let p = Pagination::new(1, 5000);
        assert_eq!(p.per_page, 200);
    }

    #[test]
    fn test_pagination_meta() {
        assert_eq!(PaginationMeta::new(95, 1, 10).total_pages, 10);
        assert_eq!(PaginationMeta::new(101, 1, 10).total_pages, 11);
        assert_eq!(PaginationMeta::new(0, 1, 10).total_pages, 0);
    }

    #[test]
    fn test_missing_provider_is_config_error() {
        let set = ProviderSet::new();
        assert!(matches!(
            set.get(ProviderKind::Twilio),
            Err(AppError::Config(_))
        ));
    }
}
