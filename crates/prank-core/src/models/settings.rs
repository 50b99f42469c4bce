//! Runtime settings
//!
//! Admin-editable key/value settings read fresh at the start of each core
//! operation: provider selection, the credit consumption policy, and the
//! reveal notification switch.

use super::call_request::CallStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Persisted setting keys
pub mod keys {
    pub const CALL_PROVIDER: &str = "call_provider";
    pub const MIN_CALL_DURATION_SECONDS: &str = "min_call_duration_seconds";
    pub const REQUIRE_ANSWERED: &str = "require_answered";
    pub const COUNT_FAILED_CALLS: &str = "count_failed_calls";
    pub const REVEAL_SMS_ENABLED: &str = "reveal_sms_enabled";

    pub const ALL: [&str; 5] = [
        CALL_PROVIDER,
        MIN_CALL_DURATION_SECONDS,
        REQUIRE_ANSWERED,
        COUNT_FAILED_CALLS,
        REVEAL_SMS_ENABLED,
    ];
}

/// Telephony / voice-AI provider placing the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Twilio,
    #[default]
    Vapi,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Twilio => "twilio",
            ProviderKind::Vapi => "vapi",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "twilio" => Some(ProviderKind::Twilio),
            "vapi" => Some(ProviderKind::Vapi),
            _ => None,
        }
    }
}

/// When a finished call counts against the caller's credits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionPolicy {
    pub min_call_duration_seconds: i32,
    pub require_answered: bool,
    pub count_failed_calls: bool,
}

impl Default for ConsumptionPolicy {
    fn default() -> Self {
        Self {
            min_call_duration_seconds: 0,
            require_answered: false,
            count_failed_calls: false,
        }
    }
}

impl ConsumptionPolicy {
    /// Whether a call in `status` lasting `duration_seconds` consumes a credit
    pub fn counts(&self, status: CallStatus, duration_seconds: Option<i32>) -> bool {
        let duration = duration_seconds.unwrap_or(0).max(0);
        match status {
            CallStatus::Completed | CallStatus::RecordingAvailable => {
                if self.require_answered && duration == 0 {
                    return false;
                }
                duration >= self.min_call_duration_seconds
            }
            CallStatus::Failed | CallStatus::NoAnswer | CallStatus::Busy => {
                self.count_failed_calls
            }
            _ => false,
        }
    }
}

/// Snapshot of the runtime settings for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub call_provider: ProviderKind,
    pub policy: ConsumptionPolicy,
    pub reveal_sms_enabled: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            call_provider: ProviderKind::default(),
            policy: ConsumptionPolicy::default(),
            reveal_sms_enabled: true,
        }
    }
}

impl RuntimeSettings {
    /// Build a snapshot from stored key/value pairs.
    ///
    /// Missing or malformed values keep their defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref().trim();
            match key.as_ref() {
                keys::CALL_PROVIDER => {
                    if let Some(kind) = ProviderKind::from_str(value) {
                        settings.call_provider = kind;
                    }
                }
                keys::MIN_CALL_DURATION_SECONDS => {
                    if let Ok(secs) = value.parse::<i32>() {
                        settings.policy.min_call_duration_seconds = secs.max(0);
                    }
                }
                keys::REQUIRE_ANSWERED => {
                    if let Some(flag) = parse_flag(value) {
                        settings.policy.require_answered = flag;
                    }
                }
                keys::COUNT_FAILED_CALLS => {
                    if let Some(flag) = parse_flag(value) {
                        settings.policy.count_failed_calls = flag;
                    }
                }
                keys::REVEAL_SMS_ENABLED => {
                    if let Some(flag) = parse_flag(value) {
                        settings.reveal_sms_enabled = flag;
                    }
                }
                _ => {}
            }
        }
        settings
    }

    /// Serialize back into key/value pairs
    pub fn to_pairs(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                keys::CALL_PROVIDER.to_string(),
                self.call_provider.to_string(),
            ),
            (
                keys::MIN_CALL_DURATION_SECONDS.to_string(),
                self.policy.min_call_duration_seconds.to_string(),
            ),
            (
                keys::REQUIRE_ANSWERED.to_string(),
                self.policy.require_answered.to_string(),
            ),
            (
                keys::COUNT_FAILED_CALLS.to_string(),
                self.policy.count_failed_calls.to_string(),
            ),
            (
                keys::REVEAL_SMS_ENABLED.to_string(),
                self.reveal_sms_enabled.to_string(),
            ),
        ])
    }
}

/// Validate a raw value for a known key; returns the normalized value
pub fn normalize_setting(key: &str, value: &str) -> Result<String, String> {
    let value = value.trim();
    match key {
        keys::CALL_PROVIDER => ProviderKind::from_str(value)
            .map(|k| k.to_string())
            .ok_or_else(|| format!("call_provider must be 'twilio' or 'vapi', got '{}'", value)),
        keys::MIN_CALL_DURATION_SECONDS => match value.parse::<i32>() {
            Ok(secs) if secs >= 0 => Ok(secs.to_string()),
            _ => Err(format!(
                "min_call_duration_seconds must be a non-negative integer, got '{}'",
                value
            )),
        },
        keys::REQUIRE_ANSWERED | keys::COUNT_FAILED_CALLS | keys::REVEAL_SMS_ENABLED => {
            parse_flag(value)
                .map(|b| b.to_string())
                .ok_or_else(|| format!("{} must be a boolean, got '{}'", key, value))
        }
        _ => Err(format!("unknown setting '{}'", key)),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict_policy() -> ConsumptionPolicy {
        ConsumptionPolicy {
            min_call_duration_seconds: 30,
            require_answered: true,
            count_failed_calls: false,
        }
    }

    #[test]
    fn test_completed_call_over_threshold_counts() {
        assert!(strict_policy().counts(CallStatus::Completed, Some(45)));
        assert!(!strict_policy().counts(CallStatus::Completed, Some(12)));
        assert!(!strict_policy().counts(CallStatus::Completed, None));
    }

    #[test]
    fn test_failed_calls_follow_count_failed_flag() {
        let policy = strict_policy();
        assert!(!policy.counts(CallStatus::Failed, Some(0)));
        assert!(!policy.counts(CallStatus::NoAnswer, None));

        let counting = ConsumptionPolicy {
            count_failed_calls: true,
            ..policy
        };
        assert!(counting.counts(CallStatus::Failed, None));
        assert!(counting.counts(CallStatus::Busy, None));
    }

    #[test]
    fn test_cancelled_and_live_states_never_count() {
        let lenient = ConsumptionPolicy {
            min_call_duration_seconds: 0,
            require_answered: false,
            count_failed_calls: true,
        };
        assert!(!lenient.counts(CallStatus::Cancelled, Some(100)));
        assert!(!lenient.counts(CallStatus::InProgress, Some(100)));
        assert!(lenient.counts(CallStatus::Completed, None));
    }

    #[test]
    fn test_from_pairs_with_defaults_and_garbage() {
        let settings = RuntimeSettings::from_pairs([
            ("call_provider", "TWILIO"),
            ("min_call_duration_seconds", "30"),
            ("require_answered", "true"),
            ("count_failed_calls", "maybe"),
            ("unrelated", "x"),
        ]);
        assert_eq!(settings.call_provider, ProviderKind::Twilio);
        assert_eq!(settings.policy.min_call_duration_seconds, 30);
        assert!(settings.policy.require_answered);
        assert!(!settings.policy.count_failed_calls);
        assert!(settings.reveal_sms_enabled);
    }

    #[test]
    fn test_pairs_roundtrip() {
        let settings = RuntimeSettings {
            call_provider: ProviderKind::Twilio,
            policy: strict_policy(),
            reveal_sms_enabled: false,
        };
        assert_eq!(RuntimeSettings::from_pairs(settings.to_pairs()), settings);
    }

    #[test]
    fn test_normalize_setting() {
        assert_eq!(normalize_setting("call_provider", " Vapi "), Ok("vapi".to_string()));
        assert!(normalize_setting("call_provider", "plivo").is_err());
        assert_eq!(normalize_setting("require_answered", "1"), Ok("true".to_string()));
        assert!(normalize_setting("min_call_duration_seconds", "-5").is_err());
        assert!(normalize_setting("nope", "1").is_err());
    }
}
