//! Reveal notification model
//!
//! At most one reveal message is attempted per call request; the row keyed
//! by the call request id is claimed before sending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Delivery state of a reveal notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RevealStatus {
    /// Claimed, send in flight
    #[default]
    Pending,
    Sent,
    Failed,
    /// Not sent (caller has no verified phone, or reveals are disabled)
    Skipped,
}

impl fmt::Display for RevealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RevealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevealStatus::Pending => "pending",
            RevealStatus::Sent => "sent",
            RevealStatus::Failed => "failed",
            RevealStatus::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(RevealStatus::Pending),
            "sent" => Some(RevealStatus::Sent),
            "failed" => Some(RevealStatus::Failed),
            "skipped" => Some(RevealStatus::Skipped),
            _ => None,
        }
    }
}

/// Stored reveal notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealNotification {
    pub call_request_id: Uuid,
    pub status: RevealStatus,
    pub recipient: String,
    pub message: Option<String>,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
