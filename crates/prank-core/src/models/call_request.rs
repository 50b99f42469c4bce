//! Call request model
//!
//! A CallRequest is one user-authored prank configuration plus the lifecycle
//! state of the outbound call placed for it.

use super::settings::ProviderKind;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a call request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Created, waiting for immediate dispatch
    #[default]
    Pending,
    /// Created with a future `scheduled_at`
    Scheduled,
    /// Accepted by the provider
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
    NoAnswer,
    Busy,
    Cancelled,
    /// Completed and the provider confirmed the recording
    RecordingAvailable,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking whether a status update may be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// The update moves the lifecycle forward
    Advance,
    /// The same terminal status was delivered again
    Redelivery,
    /// Older phase, contradicting terminal status, or a no-op
    Stale,
}

impl CallStatus {
    pub const ALL: [CallStatus; 11] = [
        CallStatus::Pending,
        CallStatus::Scheduled,
        CallStatus::Initiated,
        CallStatus::Ringing,
        CallStatus::InProgress,
        CallStatus::Completed,
        CallStatus::Failed,
        CallStatus::NoAnswer,
        CallStatus::Busy,
        CallStatus::Cancelled,
        CallStatus::RecordingAvailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Scheduled => "scheduled",
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in_progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Busy => "busy",
            CallStatus::Cancelled => "cancelled",
            CallStatus::RecordingAvailable => "recording_available",
        }
    }

    /// Parse from the stored string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == lower)
    }

    /// Waiting for the dispatcher; no provider call exists yet
    pub fn is_awaiting_dispatch(&self) -> bool {
        matches!(self, CallStatus::Pending | CallStatus::Scheduled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Failed
                | CallStatus::NoAnswer
                | CallStatus::Busy
                | CallStatus::Cancelled
                | CallStatus::RecordingAvailable
        )
    }

    /// Dispatched and not yet ended
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            CallStatus::Initiated | CallStatus::Ringing | CallStatus::InProgress
        )
    }

    /// Ended without the conversation taking place
    pub fn is_unsuccessful(&self) -> bool {
        matches!(
            self,
            CallStatus::Failed | CallStatus::NoAnswer | CallStatus::Busy
        )
    }

    /// Recording references are only meaningful in these states
    pub fn allows_recording(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::RecordingAvailable
        )
    }

    fn phase(&self) -> u8 {
        match self {
            CallStatus::Pending | CallStatus::Scheduled => 0,
            CallStatus::Initiated => 1,
            CallStatus::Ringing => 2,
            CallStatus::InProgress => 3,
            CallStatus::Completed
            | CallStatus::Failed
            | CallStatus::NoAnswer
            | CallStatus::Busy
            | CallStatus::Cancelled => 4,
            CallStatus::RecordingAvailable => 5,
        }
    }

    /// Decide whether moving from `self` to `next` is allowed.
    ///
    /// Statuses only move forward. Once a terminal status is recorded, the
    /// only further transition is `completed -> recording_available`.
    /// A recording may arrive before the completed callback, so
    /// `recording_available` is also reachable from a live call, and a
    /// later `completed` counts as a redelivery of it.
    pub fn check_transition(&self, next: CallStatus) -> TransitionCheck {
        if *self == next {
            return if self.is_terminal() {
                TransitionCheck::Redelivery
            } else {
                TransitionCheck::Stale
            };
        }

        match next {
            CallStatus::Pending | CallStatus::Scheduled => TransitionCheck::Stale,
            CallStatus::Cancelled if !self.is_terminal() => TransitionCheck::Advance,
            CallStatus::RecordingAvailable => {
                if *self == CallStatus::Completed || self.is_live() {
                    TransitionCheck::Advance
                } else {
                    TransitionCheck::Stale
                }
            }
            CallStatus::Completed if *self == CallStatus::RecordingAvailable => {
                TransitionCheck::Redelivery
            }
            _ if self.is_terminal() => TransitionCheck::Stale,
            _ if next.phase() > self.phase() => TransitionCheck::Advance,
            _ => TransitionCheck::Stale,
        }
    }
}

/// CallRequest entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    pub victim_first_name: String,
    pub victim_last_name: Option<String>,

    /// E.164 phone number of the call recipient
    pub victim_phone: String,

    /// Grammatical gender used when the prompt addresses the victim
    pub victim_gender: Option<String>,

    /// Display name of the conversation language (e.g. "Italiano")
    pub language: String,

    pub voice_gender: Option<String>,
    pub voice_id: Option<String>,

    pub prank_theme: String,
    pub real_detail: Option<String>,

    /// Personality/tone tag
    pub personality: Option<String>,

    /// 0-100, mapped to model temperature
    pub creativity_level: i32,

    pub scheduled_at: Option<DateTime<Utc>>,

    pub call_provider: Option<ProviderKind>,
    pub provider_call_id: Option<String>,
    pub call_status: CallStatus,

    pub recording_url: Option<String>,
    pub duration_seconds: Option<i32>,

    /// Hard cap on call length in seconds
    pub max_duration: i32,

    pub send_reveal_sms: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRequest {
    /// Full display name of the victim
    pub fn victim_full_name(&self) -> String {
        match self.victim_last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {}", self.victim_first_name.trim(), last),
            _ => self.victim_first_name.trim().to_string(),
        }
    }

    /// Ensure the request carries everything a provider needs.
    ///
    /// Fails before any provider is contacted.
    pub fn validate_for_dispatch(&self) -> Result<(), AppError> {
        if self.victim_phone.trim().is_empty() {
            return Err(AppError::MissingField("victim_phone".to_string()));
        }
        if !is_e164(self.victim_phone.trim()) {
            return Err(AppError::Validation(format!(
                "victim_phone '{}' is not a valid E.164 number",
                self.victim_phone
            )));
        }
        if self.prank_theme.trim().is_empty() {
            return Err(AppError::MissingField("prank_theme".to_string()));
        }
        if self.victim_first_name.trim().is_empty() {
            return Err(AppError::MissingField("victim_first_name".to_string()));
        }
        if !(0..=100).contains(&self.creativity_level) {
            return Err(AppError::Validation(format!(
                "creativity_level must be between 0 and 100, got {}",
                self.creativity_level
            )));
        }
        if self.max_duration <= 0 {
            return Err(AppError::Validation(
                "max_duration must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the stored-state invariants.
    ///
    /// - `provider_call_id` is set iff the status is past dispatch; a request
    ///   cancelled before it was ever dispatched has none
    /// - `recording_url` is only set for completed calls
    pub fn check_invariants(&self) -> Result<(), String> {
        let awaiting = self.call_status.is_awaiting_dispatch();
        let cancelled_early =
            self.call_status == CallStatus::Cancelled && self.provider_call_id.is_none();
        if !cancelled_early && awaiting == self.provider_call_id.is_some() {
            return Err(format!(
                "call {} has status {} but provider_call_id {:?}",
                self.id, self.call_status, self.provider_call_id
            ));
        }
        if self.recording_url.is_some() && !self.call_status.allows_recording() {
            return Err(format!(
                "call {} has a recording but status {}",
                self.id, self.call_status
            ));
        }
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.call_status == CallStatus::Scheduled
            && self.scheduled_at.map(|at| at <= now).unwrap_or(false)
    }
}

impl Default for CallRequest {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            victim_first_name: String::new(),
            victim_last_name: None,
            victim_phone: String::new(),
            victim_gender: None,
            language: "Italiano".to_string(),
            voice_gender: None,
            voice_id: None,
            prank_theme: String::new(),
            real_detail: None,
            personality: None,
            creativity_level: 50,
            scheduled_at: None,
            call_provider: None,
            provider_call_id: None,
            call_status: CallStatus::Pending,
            recording_url: None,
            duration_seconds: None,
            max_duration: 300,
            send_reveal_sms: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields written when a status change is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: CallStatus,
    /// Only kept when `status` allows a recording
    pub recording_url: Option<String>,
    pub duration_seconds: Option<i32>,
}

impl StatusUpdate {
    pub fn status(status: CallStatus) -> Self {
        Self {
            status,
            recording_url: None,
            duration_seconds: None,
        }
    }
}

/// E.164: leading '+', 8 to 15 digits, no leading zero
pub fn is_e164(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CallRequest {
        CallRequest {
            victim_first_name: "Marco".to_string(),
            victim_phone: "+393331234567".to_string(),
            prank_theme: "Pizza delivery with 40 pizzas".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in CallStatus::ALL {
            assert_eq!(CallStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(CallStatus::from_str("IN_PROGRESS"), Some(CallStatus::InProgress));
        assert_eq!(CallStatus::from_str("queued"), None);
    }

    #[test]
    fn test_forward_transitions() {
        use TransitionCheck::*;
        assert_eq!(CallStatus::Initiated.check_transition(CallStatus::Ringing), Advance);
        assert_eq!(CallStatus::Initiated.check_transition(CallStatus::Completed), Advance);
        assert_eq!(CallStatus::Ringing.check_transition(CallStatus::InProgress), Advance);
        assert_eq!(
            CallStatus::Completed.check_transition(CallStatus::RecordingAvailable),
            Advance
        );
    }

    #[test]
    fn test_backward_and_contradicting_transitions_are_stale() {
        use TransitionCheck::*;
        assert_eq!(CallStatus::InProgress.check_transition(CallStatus::Ringing), Stale);
        assert_eq!(CallStatus::Initiated.check_transition(CallStatus::Pending), Stale);
        assert_eq!(CallStatus::Completed.check_transition(CallStatus::Failed), Stale);
        assert_eq!(CallStatus::Failed.check_transition(CallStatus::Completed), Stale);
        assert_eq!(CallStatus::Completed.check_transition(CallStatus::InProgress), Stale);
        assert_eq!(
            CallStatus::Failed.check_transition(CallStatus::RecordingAvailable),
            Stale
        );
        assert_eq!(CallStatus::Ringing.check_transition(CallStatus::Ringing), Stale);
    }

    #[test]
    fn test_terminal_redelivery() {
        assert_eq!(
            CallStatus::Completed.check_transition(CallStatus::Completed),
            TransitionCheck::Redelivery
        );
        assert_eq!(
            CallStatus::RecordingAvailable.check_transition(CallStatus::Completed),
            TransitionCheck::Redelivery
        );
    }

    #[test]
    fn test_recording_before_completion() {
        use TransitionCheck::*;
        assert_eq!(
            CallStatus::InProgress.check_transition(CallStatus::RecordingAvailable),
            Advance
        );
        assert_eq!(
            CallStatus::Ringing.check_transition(CallStatus::RecordingAvailable),
            Advance
        );
        assert_eq!(
            CallStatus::Pending.check_transition(CallStatus::RecordingAvailable),
            Stale
        );
        assert_eq!(
            CallStatus::NoAnswer.check_transition(CallStatus::RecordingAvailable),
            Stale
        );
    }

    #[test]
    fn test_cancel_only_before_terminal() {
        assert_eq!(
            CallStatus::Scheduled.check_transition(CallStatus::Cancelled),
            TransitionCheck::Advance
        );
        assert_eq!(
            CallStatus::InProgress.check_transition(CallStatus::Cancelled),
            TransitionCheck::Advance
        );
        assert_eq!(
            CallStatus::Completed.check_transition(CallStatus::Cancelled),
            TransitionCheck::Stale
        );
    }

    #[test]
    fn test_validate_for_dispatch() {
        assert!(valid_request().validate_for_dispatch().is_ok());

        let missing_phone = CallRequest {
            victim_phone: "  ".to_string(),
            ..valid_request()
        };
        assert!(matches!(
            missing_phone.validate_for_dispatch(),
            Err(AppError::MissingField(f)) if f == "victim_phone"
        ));

        let missing_theme = CallRequest {
            prank_theme: String::new(),
            ..valid_request()
        };
        assert!(matches!(
            missing_theme.validate_for_dispatch(),
            Err(AppError::MissingField(f)) if f == "prank_theme"
        ));

        let bad_creativity = CallRequest {
            creativity_level: 140,
            ..valid_request()
        };
        assert!(matches!(
            bad_creativity.validate_for_dispatch(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_is_e164() {
        assert!(is_e164("+393331234567"));
        assert!(is_e164("+14155552671"));
        assert!(!is_e164("3331234567"));
        assert!(!is_e164("+0123456789"));
        assert!(!is_e164("+39 333 1234567"));
        assert!(!is_e164("+123"));
    }

    #[test]
    fn test_invariants() {
        let pending = valid_request();
        assert!(pending.check_invariants().is_ok());

        let dispatched_without_id = CallRequest {
            call_status: CallStatus::Initiated,
            ..valid_request()
        };
        assert!(dispatched_without_id.check_invariants().is_err());

        let recording_while_ringing = CallRequest {
            call_status: CallStatus::Ringing,
            provider_call_id: Some("CA123".to_string()),
            recording_url: Some("https://example.com/r.mp3".to_string()),
            ..valid_request()
        };
        assert!(recording_while_ringing.check_invariants().is_err());

        let cancelled_before_dispatch = CallRequest {
            call_status: CallStatus::Cancelled,
            ..valid_request()
        };
        assert!(cancelled_before_dispatch.check_invariants().is_ok());
    }

    #[test]
    fn test_victim_full_name() {
        let mut req = valid_request();
        assert_eq!(req.victim_full_name(), "Marco");
        req.victim_last_name = Some("Rossi".to_string());
        assert_eq!(req.victim_full_name(), "Marco Rossi");
    }
}
