//! Twilio call status vocabulary

use prank_core::models::{CallStatus, NormalizedStatus};

/// Map a Twilio `CallStatus` token to the internal status.
///
/// Busy, unanswered and canceled calls all collapse into `failed`.
/// Unknown tokens are passed through verbatim.
pub fn normalize_call_status(token: &str) -> NormalizedStatus {
    let status = match token.trim().to_lowercase().as_str() {
        "queued" => CallStatus::Pending,
        "initiated" => CallStatus::Initiated,
        "ringing" => CallStatus::Ringing,
        "in-progress" => CallStatus::InProgress,
        "completed" => CallStatus::Completed,
        "busy" | "no-answer" | "canceled" | "failed" => CallStatus::Failed,
        _ => return NormalizedStatus::Passthrough(token.to_string()),
    };
    NormalizedStatus::Known(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_table_is_total_for_documented_tokens() {
        let table = [
            ("queued", CallStatus::Pending),
            ("initiated", CallStatus::Initiated),
            ("ringing", CallStatus::Ringing),
            ("in-progress", CallStatus::InProgress),
            ("completed", CallStatus::Completed),
            ("busy", CallStatus::Failed),
            ("no-answer", CallStatus::Failed),
            ("canceled", CallStatus::Failed),
            ("failed", CallStatus::Failed),
        ];

        for (token, expected) in table {
            assert_eq!(
                normalize_call_status(token),
                NormalizedStatus::Known(expected),
                "token {}",
                token
            );
        }
    }

    #[test]
    fn test_mapping_is_stable_and_case_insensitive() {
        assert_eq!(normalize_call_status("Completed"), normalize_call_status("completed"));
        assert_eq!(
            normalize_call_status(" in-progress "),
            NormalizedStatus::Known(CallStatus::InProgress)
        );
    }

    #[test]
    fn test_unknown_token_passes_through() {
        assert_eq!(
            normalize_call_status("answered-by-machine"),
            NormalizedStatus::Passthrough("answered-by-machine".to_string())
        );
    }
}
