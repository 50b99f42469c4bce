//! Audit log model
//!
//! Records admin configuration changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,

    /// Acting user (if available)
    pub user_id: Option<Uuid>,

    /// Acting user's email or subject
    pub actor: String,

    /// Action performed (e.g., "update_setting")
    pub action: String,

    /// Entity type affected (e.g., "app_setting")
    pub entity_type: String,

    pub entity_id: Option<String>,

    /// Old/new values and other context
    pub details: Option<JsonValue>,

    pub ip_address: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn builder() -> AuditLogBuilder {
        AuditLogBuilder::default()
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Default)]
pub struct AuditLogBuilder {
    user_id: Option<Uuid>,
    actor: Option<String>,
    action: Option<String>,
    entity_type: Option<String>,
    entity_id: Option<String>,
    details: Option<JsonValue>,
    ip_address: Option<String>,
}

impl AuditLogBuilder {
    pub fn user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Build the audit log entry (returns data for insertion, not the final entity)
    pub fn build(self) -> Result<AuditLogData, &'static str> {
        Ok(AuditLogData {
            user_id: self.user_id,
            actor: self.actor.ok_or("actor is required")?,
            action: self.action.ok_or("action is required")?,
            entity_type: self.entity_type.ok_or("entity_type is required")?,
            entity_id: self.entity_id,
            details: self.details,
            ip_address: self.ip_address,
        })
    }
}

/// Data for creating an audit log entry
#[derive(Debug, Clone)]
pub struct AuditLogData {
    pub user_id: Option<Uuid>,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: Option<JsonValue>,
    pub ip_address: Option<String>,
}
