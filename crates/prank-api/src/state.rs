//! Shared application state handed to every handler

use prank_core::traits::{
    AuditLogRepository, CallRequestRepository, CreditLedger, PaymentRecordRepository,
};
use prank_services::{
    CallDispatcher, ContentModerator, PaymentService, SchedulerSweep, SettingsService,
    StatusReconciler,
};
use std::sync::Arc;

/// Services and read-side repositories
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<CallDispatcher>,
    pub reconciler: Arc<StatusReconciler>,
    pub scheduler: Arc<SchedulerSweep>,
    pub moderator: Arc<ContentModerator>,
    pub payments: Arc<PaymentService>,
    pub settings: Arc<SettingsService>,

    pub calls: Arc<dyn CallRequestRepository>,
    pub ledger: Arc<dyn CreditLedger>,
    pub payment_records: Arc<dyn PaymentRecordRepository>,
    pub audit: Arc<dyn AuditLogRepository>,

    /// Realtime media bridge the voice webhook connects answered calls to
    pub media_stream_url: Option<String>,
}
