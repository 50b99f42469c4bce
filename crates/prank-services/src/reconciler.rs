//! Status Reconciler
//!
//! Applies provider callbacks to call requests. Statuses only move forward
//! (see `CallStatus::check_transition`); every write is a compare-and-set
//! on the status the decision was made from, retried on a lost race.
//!
//! Once a terminal status is stored, the follow-up work runs: one credit is
//! consumed if the current consumption policy says the call counts, and the
//! reveal SMS is sent for qualifying completed calls. Both are idempotent
//! per call request, so redelivered terminal callbacks re-run them safely.
//! A recording callback that beats the completed callback moves a live call
//! straight to `recording_available`; the completed callback then only adds
//! its duration.

use crate::constants::MAX_STATUS_CAS_ATTEMPTS;
use crate::reveal::RevealNotifier;
use prank_core::{
    models::{
        CallRequest, CallStatus, ConsumeOutcome, EndCallOutcome, NormalizedStatus, ProviderEvent,
        ProviderKind, RuntimeSettings, StatusUpdate, TransitionCheck,
    },
    traits::{CallRequestRepository, CreditLedger, ProviderSet, SettingsRepository},
    AppError, AppResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Telephony status callback fields we act on
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioStatusCallback {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
    #[serde(rename = "RecordingUrl", default)]
    pub recording_url: Option<String>,
    #[serde(rename = "CallDuration", default)]
    pub call_duration: Option<String>,
    #[serde(rename = "RecordingDuration", default)]
    pub recording_duration: Option<String>,
}

impl TwilioStatusCallback {
    fn duration_seconds(&self) -> Option<i32> {
        self.call_duration
            .as_deref()
            .or(self.recording_duration.as_deref())
            .and_then(|raw| raw.trim().parse::<i32>().ok())
    }
}

/// Result of applying one provider signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied { status: CallStatus },
    /// Same terminal status delivered again
    Redelivered { status: CallStatus },
    /// Older or contradicting signal; stored status kept
    Stale { current: CallStatus },
    /// Token outside the mapping; only side data was stored
    Passthrough { raw: String },
    /// No call request carries this provider call id
    UnknownCall,
    /// The callback carried nothing to apply
    Ignored,
}

/// Identifies the call to end
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndCallTarget {
    pub call_request_id: Option<Uuid>,
    pub provider_call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndCallResult {
    pub status: CallStatus,
    pub message: String,
}

pub struct StatusReconciler {
    calls: Arc<dyn CallRequestRepository>,
    ledger: Arc<dyn CreditLedger>,
    settings: Arc<dyn SettingsRepository>,
    providers: ProviderSet,
    notifier: Arc<RevealNotifier>,
}

impl StatusReconciler {
    pub fn new(
        calls: Arc<dyn CallRequestRepository>,
        ledger: Arc<dyn CreditLedger>,
        settings: Arc<dyn SettingsRepository>,
        providers: ProviderSet,
        notifier: Arc<RevealNotifier>,
    ) -> Self {
        Self {
            calls,
            ledger,
            settings,
            providers,
            notifier,
        }
    }

    /// Apply a Twilio status or recording callback
    #[instrument(skip(self, callback), fields(call_sid = %callback.call_sid))]
    pub async fn handle_twilio_callback(
        &self,
        callback: &TwilioStatusCallback,
    ) -> AppResult<ReconcileOutcome> {
        if callback.call_sid.trim().is_empty() {
            return Ok(ReconcileOutcome::Ignored);
        }

        let twilio = self.providers.get(ProviderKind::Twilio)?;
        let recording_url = callback
            .recording_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| twilio.recording_url(url));

        let status = match callback.call_status.as_deref() {
            Some(token) => twilio.normalize_status(token),
            // Recording status callbacks carry no call status
            None if recording_url.is_some() => {
                NormalizedStatus::Known(CallStatus::RecordingAvailable)
            }
            None => return Ok(ReconcileOutcome::Ignored),
        };

        self.handle_event(&ProviderEvent {
            provider_call_id: callback.call_sid.trim().to_string(),
            status,
            recording_url,
            duration_seconds: callback.duration_seconds(),
        })
        .await
    }

    /// Apply a normalized provider event
    #[instrument(skip(self, event), fields(provider_call_id = %event.provider_call_id))]
    pub async fn handle_event(&self, event: &ProviderEvent) -> AppResult<ReconcileOutcome> {
        let Some(call) = self
            .calls
            .find_by_provider_call_id(&event.provider_call_id)
            .await?
        else {
            info!("Callback for untracked provider call ignored");
            return Ok(ReconcileOutcome::UnknownCall);
        };

        let settings = self.settings.load().await?;

        match &event.status {
            NormalizedStatus::Known(status) => {
                let update = StatusUpdate {
                    status: *status,
                    recording_url: event.recording_url.clone(),
                    duration_seconds: event.duration_seconds,
                };
                self.advance(call, update, &settings).await
            }
            NormalizedStatus::Passthrough(raw) => {
                warn!(raw_status = %raw, current = %call.call_status, "Unmapped provider status");
                if event.duration_seconds.is_some() {
                    let update = StatusUpdate {
                        status: call.call_status,
                        recording_url: None,
                        duration_seconds: event.duration_seconds,
                    };
                    self.calls
                        .update_status(call.id, call.call_status, &update)
                        .await?;
                }
                Ok(ReconcileOutcome::Passthrough { raw: raw.clone() })
            }
        }
    }

    /// End a call early.
    ///
    /// A request that never reached a provider is cancelled without any
    /// provider contact. Otherwise the provider hangs up and the request is
    /// marked completed, also when the provider says it already ended.
    #[instrument(skip(self, target))]
    pub async fn end_call(
        &self,
        target: &EndCallTarget,
        owner: Option<Uuid>,
    ) -> AppResult<EndCallResult> {
        let call = match (&target.call_request_id, &target.provider_call_id) {
            (Some(id), _) => self.calls.find_by_id(*id).await?,
            (None, Some(pcid)) if !pcid.trim().is_empty() => {
                self.calls.find_by_provider_call_id(pcid.trim()).await?
            }
            _ => {
                return Err(AppError::MissingField(
                    "callRequestId or providerCallId".to_string(),
                ))
            }
        };

        let call = call
            .filter(|c| owner.map(|user| c.user_id == user).unwrap_or(true))
            .ok_or_else(|| {
                AppError::CallRequestNotFound(
                    target
                        .call_request_id
                        .map(|id| id.to_string())
                        .or_else(|| target.provider_call_id.clone())
                        .unwrap_or_default(),
                )
            })?;

        let settings = self.settings.load().await?;

        let Some(provider_call_id) = call.provider_call_id.clone() else {
            let outcome = self
                .advance(call, StatusUpdate::status(CallStatus::Cancelled), &settings)
                .await?;
            info!(?outcome, "Call cancelled before dispatch");
            return Ok(EndCallResult {
                status: final_status(&outcome),
                message: "Call cancelled before it started".to_string(),
            });
        };

        let provider = self
            .providers
            .get(call.call_provider.unwrap_or(settings.call_provider))?;
        let ended = provider.end_call(&provider_call_id).await?;

        let outcome = self
            .advance(call, StatusUpdate::status(CallStatus::Completed), &settings)
            .await?;
        info!(?ended, ?outcome, "Call ended on request");

        Ok(EndCallResult {
            status: final_status(&outcome),
            message: match ended {
                EndCallOutcome::Ended => "Call ended".to_string(),
                EndCallOutcome::AlreadyEnded => "Call had already ended".to_string(),
            },
        })
    }

    /// Move `call` to `update.status` if the state machine allows it
    async fn advance(
        &self,
        mut call: CallRequest,
        update: StatusUpdate,
        settings: &RuntimeSettings,
    ) -> AppResult<ReconcileOutcome> {
        for attempt in 1..=MAX_STATUS_CAS_ATTEMPTS {
            let check = call.call_status.check_transition(update.status);
            if check == TransitionCheck::Stale {
                debug!(
                    current = %call.call_status,
                    incoming = %update.status,
                    "Stale status ignored"
                );
                return Ok(ReconcileOutcome::Stale {
                    current: call.call_status,
                });
            }

            // A redelivery keeps the stored status and only refreshes side data
            let write = match check {
                TransitionCheck::Redelivery => StatusUpdate {
                    status: call.call_status,
                    ..update.clone()
                },
                _ => update.clone(),
            };

            if self
                .calls
                .update_status(call.id, call.call_status, &write)
                .await?
            {
                let applied = merged(call, &write);
                info!(status = %applied.call_status, "Call status applied");
                self.after_terminal(&applied, settings).await;

                return Ok(match check {
                    TransitionCheck::Redelivery => ReconcileOutcome::Redelivered {
                        status: write.status,
                    },
                    _ => ReconcileOutcome::Applied {
                        status: write.status,
                    },
                });
            }

            debug!(attempt, "Status changed concurrently, re-reading");
            call = match self.calls.find_by_id(call.id).await? {
                Some(fresh) => fresh,
                None => return Ok(ReconcileOutcome::UnknownCall),
            };
        }

        warn!(call_request_id = %call.id, "Gave up applying status after repeated races");
        Ok(ReconcileOutcome::Stale {
            current: call.call_status,
        })
    }

    /// Credit consumption and reveal, after the terminal status is stored.
    ///
    /// Failures are logged. A redelivered terminal callback, including a
    /// `completed` arriving after `recording_available`, retries a consumption
    /// that did not go through; a reveal is claimed once and a failed send
    /// is recorded rather than resent.
    async fn after_terminal(&self, call: &CallRequest, settings: &RuntimeSettings) {
        if !call.call_status.is_terminal() {
            return;
        }

        let counts = settings
            .policy
            .counts(call.call_status, call.duration_seconds);

        if counts {
            match self.ledger.consume_for_call(call.user_id, call.id).await {
                Ok(ConsumeOutcome::Consumed { remaining }) => {
                    info!(call_request_id = %call.id, remaining, "Credit consumed");
                }
                Ok(ConsumeOutcome::AlreadyConsumed) => {
                    debug!(call_request_id = %call.id, "Credit already consumed");
                }
                Ok(ConsumeOutcome::InsufficientCredits) => {
                    warn!(
                        call_request_id = %call.id,
                        user_id = %call.user_id,
                        "Call counts but the user has no credits left"
                    );
                }
                Err(e) => {
                    error!(call_request_id = %call.id, error = %e, "Credit consumption failed");
                }
            }
        } else {
            debug!(
                call_request_id = %call.id,
                status = %call.call_status,
                duration = ?call.duration_seconds,
                "Call does not count against credits"
            );
        }

        let qualifies_for_reveal = counts && call.call_status.allows_recording();
        if qualifies_for_reveal && call.send_reveal_sms && settings.reveal_sms_enabled {
            match self.notifier.notify(call).await {
                Ok(outcome) => debug!(call_request_id = %call.id, ?outcome, "Reveal handled"),
                Err(e) => {
                    error!(call_request_id = %call.id, error = %e, "Reveal notification failed")
                }
            }
        }
    }
}

/// The row as it reads after `update` was applied to `call`
fn merged(mut call: CallRequest, update: &StatusUpdate) -> CallRequest {
    call.call_status = update.status;
    if update.status.allows_recording() && update.recording_url.is_some() {
        call.recording_url = update.recording_url.clone();
    }
    if update.duration_seconds.is_some() {
        call.duration_seconds = update.duration_seconds;
    }
    call
}

fn final_status(outcome: &ReconcileOutcome) -> CallStatus {
    match outcome {
        ReconcileOutcome::Applied { status } | ReconcileOutcome::Redelivered { status } => *status,
        ReconcileOutcome::Stale { current } => *current,
        _ => CallStatus::Cancelled,
    }
}
