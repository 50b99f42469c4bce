//! Provider-facing types
//!
//! What the dispatcher hands to a call provider, and what providers report
//! back through webhooks once normalized.

use super::call_request::CallStatus;
use serde::{Deserialize, Serialize};

/// Rendered conversation material for one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallScript {
    pub system_prompt: String,
    pub first_message: String,
    /// Time-of-day greeting used in the first message
    pub greeting: String,
    /// Model temperature derived from the creativity level
    pub temperature: f32,
    /// BCP-47 language tag (e.g. "it-IT")
    pub language_code: String,
    pub voice_id: String,
}

/// A provider status token mapped to the internal vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedStatus {
    Known(CallStatus),
    /// Token outside the documented mapping, kept verbatim
    Passthrough(String),
}

impl NormalizedStatus {
    pub fn known(&self) -> Option<CallStatus> {
        match self {
            NormalizedStatus::Known(status) => Some(*status),
            NormalizedStatus::Passthrough(_) => None,
        }
    }
}

/// A status signal from a provider webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub provider_call_id: String,
    pub status: NormalizedStatus,
    pub recording_url: Option<String>,
    pub duration_seconds: Option<i32>,
}

/// Result of asking a provider to hang up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCallOutcome {
    Ended,
    /// Provider reported the call unknown or already finished
    AlreadyEnded,
}
