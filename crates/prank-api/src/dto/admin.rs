//! Admin console DTOs

use chrono::{DateTime, Utc};
use prank_core::models::{AuditLog, RuntimeSettings};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// Runtime settings as edited in the console
#[derive(Debug, Clone, Serialize)]
pub struct SettingsResponse {
    pub settings: HashMap<String, String>,
}

impl From<RuntimeSettings> for SettingsResponse {
    fn from(settings: RuntimeSettings) -> Self {
        Self {
            settings: settings.to_pairs(),
        }
    }
}

/// Settings update; values are validated per key
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSettingsRequest {
    pub settings: HashMap<String, String>,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogResponse {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: Option<JsonValue>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLog> for AuditLogResponse {
    fn from(log: AuditLog) -> Self {
        Self {
            id: log.id,
            user_id: log.user_id,
            actor: log.actor,
            action: log.action,
            entity_type: log.entity_type,
            entity_id: log.entity_id,
            details: log.details,
            ip_address: log.ip_address,
            created_at: log.created_at,
        }
    }
}
