//! Scheduled call sweep
//!
//! Triggered periodically from outside. Dispatches every scheduled request
//! whose time has come, one at a time, with the settings snapshot taken at
//! the start of the sweep. A failing request is counted and skipped. One
//! that can never be dispatched as stored (no credits, blocked content,
//! invalid data) is cancelled so it does not hold a slot in every later
//! batch; a provider or database failure leaves it `scheduled` for the next
//! sweep.

use crate::constants::SWEEP_BATCH_LIMIT;
use crate::dispatcher::CallDispatcher;
use chrono::{DateTime, Utc};
use prank_core::{
    models::{CallStatus, ProviderKind, StatusUpdate},
    traits::{CallRequestRepository, SettingsRepository},
    AppError, AppResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub provider: ProviderKind,
}

pub struct SchedulerSweep {
    calls: Arc<dyn CallRequestRepository>,
    settings: Arc<dyn SettingsRepository>,
    dispatcher: Arc<CallDispatcher>,
}

impl SchedulerSweep {
    pub fn new(
        calls: Arc<dyn CallRequestRepository>,
        settings: Arc<dyn SettingsRepository>,
        dispatcher: Arc<CallDispatcher>,
    ) -> Self {
        Self {
            calls,
            settings,
            dispatcher,
        }
    }

    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let settings = self.settings.load().await?;
        let mut report = SweepReport {
            provider: settings.call_provider,
            ..Default::default()
        };

        let due = self
            .calls
            .find_due_scheduled(now, SWEEP_BATCH_LIMIT)
            .await?;

        for call in due {
            report.processed += 1;
            match self.dispatcher.dispatch_with(call.id, None, &settings).await {
                Ok(result) => {
                    report.succeeded += 1;
                    info!(
                        call_request_id = %call.id,
                        provider_call_id = %result.provider_call_id,
                        "Scheduled call dispatched"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(call_request_id = %call.id, error = %e, "Scheduled call dispatch failed");
                    if is_permanent(&e) && self.cancel(call.id).await {
                        report.cancelled += 1;
                    }
                }
            }
        }

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Scheduler sweep finished"
        );
        Ok(report)
    }

    async fn cancel(&self, id: Uuid) -> bool {
        let update = StatusUpdate::status(CallStatus::Cancelled);
        match self.calls.update_status(id, CallStatus::Scheduled, &update).await {
            Ok(true) => {
                warn!(call_request_id = %id, "Scheduled call cancelled, it cannot be dispatched");
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(call_request_id = %id, error = %e, "Failed to cancel scheduled call");
                false
            }
        }
    }
}

/// Failures that retrying the same stored request cannot cure
fn is_permanent(err: &AppError) -> bool {
    matches!(
        err,
        AppError::InsufficientCredits { .. }
            | AppError::ModerationBlocked { .. }
            | AppError::Validation(_)
            | AppError::MissingField(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::ContentModerator;
    use crate::testing::{sample_call, FakeCallProvider, InMemoryStore};
    use chrono::Duration;
    use prank_core::models::{settings::keys, CallRequest, CallStatus};
    use prank_core::traits::ProviderSet;

    fn sweeper(store: &Arc<InMemoryStore>, provider: &Arc<FakeCallProvider>) -> SchedulerSweep {
        let dispatcher = Arc::new(CallDispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            ProviderSet::new().with(provider.clone()),
            Arc::new(ContentModerator::rules_only()),
        ));
        SchedulerSweep::new(store.clone(), store.clone(), dispatcher)
    }

    fn scheduled(store: &InMemoryStore, user: uuid::Uuid, at: DateTime<Utc>) -> uuid::Uuid {
        store.insert_call(CallRequest {
            call_status: CallStatus::Scheduled,
            scheduled_at: Some(at),
            ..sample_call(user)
        })
    }

    #[tokio::test]
    async fn test_sweep_dispatches_due_requests_best_effort() {
        let store = Arc::new(InMemoryStore::new());
        store.set_setting(keys::CALL_PROVIDER, "twilio");
        let twilio = Arc::new(FakeCallProvider::new(ProviderKind::Twilio));
        let user = store.add_user(5, None);
        let now = Utc::now();

        let first = scheduled(&store, user, now - Duration::minutes(10));
        let broken = scheduled(&store, user, now - Duration::minutes(5));
        let third = scheduled(&store, user, now - Duration::minutes(1));
        let later = scheduled(&store, user, now + Duration::hours(1));
        twilio.fail_for(broken);

        let report = sweeper(&store, &twilio).sweep(now).await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.cancelled, 0);
        assert_eq!(report.provider, ProviderKind::Twilio);

        assert_eq!(store.call(first).unwrap().call_status, CallStatus::Initiated);
        assert_eq!(store.call(third).unwrap().call_status, CallStatus::Initiated);
        assert_eq!(store.call(broken).unwrap().call_status, CallStatus::Scheduled);
        assert_eq!(store.call(later).unwrap().call_status, CallStatus::Scheduled);
        assert_eq!(store.credits(user), 5);
    }

    #[tokio::test]
    async fn test_empty_sweep_reports_configured_provider() {
        let store = Arc::new(InMemoryStore::new());
        store.set_setting(keys::CALL_PROVIDER, "twilio");
        let twilio = Arc::new(FakeCallProvider::new(ProviderKind::Twilio));

        let report = sweeper(&store, &twilio).sweep(Utc::now()).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.provider, ProviderKind::Twilio);
        assert!(twilio.started().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_retried_next_sweep() {
        let store = Arc::new(InMemoryStore::new());
        store.set_setting(keys::CALL_PROVIDER, "twilio");
        let twilio = Arc::new(FakeCallProvider::new(ProviderKind::Twilio));
        let user = store.add_user(1, None);
        let now = Utc::now();
        let id = scheduled(&store, user, now - Duration::minutes(1));
        twilio.fail_for(id);

        let sweep = sweeper(&store, &twilio);
        for _ in 0..2 {
            let report = sweep.sweep(now).await.unwrap();
            assert_eq!(report.failed, 1);
            assert_eq!(report.cancelled, 0);
        }
        assert_eq!(twilio.started(), vec![id, id]);
        assert_eq!(store.call(id).unwrap().call_status, CallStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_unfundable_requests_do_not_starve_the_queue() {
        let store = Arc::new(InMemoryStore::new());
        store.set_setting(keys::CALL_PROVIDER, "twilio");
        let twilio = Arc::new(FakeCallProvider::new(ProviderKind::Twilio));
        let broke = store.add_user(0, None);
        let funded = store.add_user(1, None);
        let now = Utc::now();

        let stuck: Vec<_> = (0..SWEEP_BATCH_LIMIT)
            .map(|i| scheduled(&store, broke, now - Duration::hours(2) + Duration::seconds(i)))
            .collect();
        let good = scheduled(&store, funded, now - Duration::minutes(1));

        let sweep = sweeper(&store, &twilio);
        let report = sweep.sweep(now).await.unwrap();
        assert_eq!(report.processed, stuck.len());
        assert_eq!(report.cancelled, stuck.len());
        assert!(stuck
            .iter()
            .all(|id| store.call(*id).unwrap().call_status == CallStatus::Cancelled));

        let report = sweep.sweep(now).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(twilio.started(), vec![good]);
        assert_eq!(store.call(good).unwrap().call_status, CallStatus::Initiated);
    }
}
