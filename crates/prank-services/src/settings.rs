//! Runtime settings administration
//!
//! The only write path for the `app_settings` table. Every value is
//! validated before anything is stored, and each changed key leaves an
//! audit entry. Audit failures are logged and never undo the change.

use prank_core::{
    models::{settings::normalize_setting, AuditLog, RuntimeSettings},
    traits::{AuditLogRepository, SettingsRepository},
    AppError, AppResult,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Who is changing the settings
#[derive(Debug, Clone)]
pub struct SettingsActor {
    pub user_id: Uuid,
    pub actor: String,
    pub ip_address: Option<String>,
}

pub struct SettingsService {
    settings: Arc<dyn SettingsRepository>,
    audit: Arc<dyn AuditLogRepository>,
}

impl SettingsService {
    pub fn new(settings: Arc<dyn SettingsRepository>, audit: Arc<dyn AuditLogRepository>) -> Self {
        Self { settings, audit }
    }

    /// Effective settings, defaults included
    pub async fn current(&self) -> AppResult<RuntimeSettings> {
        self.settings.load().await
    }

    /// Apply `changes` and return the effective settings afterwards.
    ///
    /// Rejects the whole batch if any key is unknown or any value invalid.
    #[instrument(skip(self, changes), fields(actor = %actor.actor))]
    pub async fn update(
        &self,
        actor: &SettingsActor,
        changes: HashMap<String, String>,
    ) -> AppResult<RuntimeSettings> {
        if changes.is_empty() {
            return Err(AppError::Validation("No settings to update".to_string()));
        }

        let mut normalized = BTreeMap::new();
        for (key, value) in &changes {
            let value = normalize_setting(key, value).map_err(AppError::Validation)?;
            normalized.insert(key.clone(), value);
        }

        let before = self.settings.load().await?.to_pairs();

        for (key, value) in &normalized {
            let old = before.get(key);
            if old == Some(value) {
                continue;
            }

            self.settings.upsert(key, value).await?;
            info!(key = %key, old = ?old, new = %value, "Setting updated");

            let entry = AuditLog::builder()
                .user_id(actor.user_id)
                .actor(actor.actor.clone())
                .action("update_setting")
                .entity_type("app_setting")
                .entity_id(key.clone())
                .details(json!({ "old_value": old, "new_value": value }));
            let entry = match &actor.ip_address {
                Some(ip) => entry.ip_address(ip.clone()),
                None => entry,
            };

            if let Ok(data) = entry.build() {
                if let Err(e) = self.audit.insert(data).await {
                    error!(key = %key, error = %e, "Failed to record settings audit entry");
                }
            }
        }

        self.settings.load().await
    }
}
