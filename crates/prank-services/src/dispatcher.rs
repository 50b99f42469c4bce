//! Call Dispatcher
//!
//! Submits a call request to the provider selected in the runtime settings
//! and links the provider's call id to it. Guards run in order: lifecycle
//! state, request completeness, credit balance, content gate. A failed
//! submission leaves the request untouched so it can be retried.

use crate::moderation::ContentModerator;
use crate::prompt::build_script;
use chrono::Utc;
use prank_core::{
    models::{ContentCheck, ProviderKind, RuntimeSettings},
    traits::{CallProvider, CallRequestRepository, CreditLedger, ProviderSet, SettingsRepository},
    AppError, AppResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Successful dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub call_request_id: Uuid,
    pub provider: ProviderKind,
    pub provider_call_id: String,
}

pub struct CallDispatcher {
    calls: Arc<dyn CallRequestRepository>,
    ledger: Arc<dyn CreditLedger>,
    settings: Arc<dyn SettingsRepository>,
    providers: ProviderSet,
    moderator: Arc<ContentModerator>,
}

impl CallDispatcher {
    pub fn new(
        calls: Arc<dyn CallRequestRepository>,
        ledger: Arc<dyn CreditLedger>,
        settings: Arc<dyn SettingsRepository>,
        providers: ProviderSet,
        moderator: Arc<ContentModerator>,
    ) -> Self {
        Self {
            calls,
            ledger,
            settings,
            providers,
            moderator,
        }
    }

    /// Dispatch with a fresh settings snapshot.
    ///
    /// When `owner` is given the request must belong to that user.
    pub async fn dispatch(&self, id: Uuid, owner: Option<Uuid>) -> AppResult<DispatchResult> {
        let settings = self.settings.load().await?;
        self.dispatch_with(id, owner, &settings).await
    }

    #[instrument(skip(self, settings), fields(provider = %settings.call_provider))]
    pub async fn dispatch_with(
        &self,
        id: Uuid,
        owner: Option<Uuid>,
        settings: &RuntimeSettings,
    ) -> AppResult<DispatchResult> {
        let request = self
            .calls
            .find_by_id(id)
            .await?
            .filter(|call| owner.map(|user| call.user_id == user).unwrap_or(true))
            .ok_or_else(|| AppError::CallRequestNotFound(id.to_string()))?;

        if !request.call_status.is_awaiting_dispatch() || request.provider_call_id.is_some() {
            warn!(status = %request.call_status, "Call request is not awaiting dispatch");
            return Err(AppError::Conflict(format!(
                "Call request {} is already {}",
                id, request.call_status
            )));
        }

        let script = build_script(&request, Utc::now())?;

        let available = self.ledger.balance(request.user_id).await?;
        if available <= 0 {
            warn!(user_id = %request.user_id, "Dispatch refused, no credits left");
            return Err(AppError::InsufficientCredits { available });
        }

        self.moderator
            .gate(&ContentCheck {
                theme: request.prank_theme.clone(),
                detail: request.real_detail.clone(),
                language: request.language.clone(),
            })
            .await?;

        let provider = self.providers.get(settings.call_provider)?;
        let provider_call_id = provider.start_call(&request, &script).await.map_err(|e| {
            error!(error = %e, "Provider rejected the call, request left unchanged");
            e
        })?;

        match self
            .calls
            .mark_initiated(id, provider.kind(), &provider_call_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    provider_call_id = %provider_call_id,
                    "Call request was dispatched concurrently, ending orphan call"
                );
                end_orphan(provider.as_ref(), &provider_call_id).await;
                return Err(AppError::Conflict(format!(
                    "Call request {} was dispatched concurrently",
                    id
                )));
            }
            Err(e) => {
                error!(error = %e, "Failed to link provider call, ending orphan call");
                end_orphan(provider.as_ref(), &provider_call_id).await;
                return Err(e);
            }
        }

        info!(
            call_request_id = %id,
            provider_call_id = %provider_call_id,
            "Call dispatched"
        );

        Ok(DispatchResult {
            call_request_id: id,
            provider: provider.kind(),
            provider_call_id,
        })
    }
}

async fn end_orphan(provider: &dyn CallProvider, provider_call_id: &str) {
    if let Err(e) = provider.end_call(provider_call_id).await {
        warn!(provider_call_id, error = %e, "Failed to end orphan call");
    }
}
