//! Call lifecycle DTOs
//!
//! Request and response types for dispatch, end call, the call view, and
//! the content check.

use chrono::{DateTime, Utc};
use prank_core::models::{CallRequest, CallStatus, ContentCheck, ModerationVerdict, ProviderKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Dispatch call request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchCallRequest {
    pub call_request_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchCallResponse {
    pub success: bool,
    pub call_request_id: Uuid,
    pub provider: ProviderKind,
    pub provider_call_id: String,
}

/// End call request; at least one id is required
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndCallRequest {
    pub call_request_id: Option<Uuid>,
    pub provider_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndCallResponse {
    pub success: bool,
    pub status: CallStatus,
    pub message: String,
}

/// Caller-facing view of a call request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequestResponse {
    pub id: Uuid,
    pub victim_name: String,
    pub victim_phone: String,
    pub language: String,
    pub prank_theme: String,
    pub status: CallStatus,
    pub provider: Option<ProviderKind>,
    pub provider_call_id: Option<String>,
    pub recording_url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub send_reveal_sms: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CallRequest> for CallRequestResponse {
    fn from(call: CallRequest) -> Self {
        Self {
            victim_name: call.victim_full_name(),
            id: call.id,
            victim_phone: call.victim_phone,
            language: call.language,
            prank_theme: call.prank_theme,
            status: call.call_status,
            provider: call.call_provider,
            provider_call_id: call.provider_call_id,
            recording_url: call.recording_url,
            duration_seconds: call.duration_seconds,
            scheduled_at: call.scheduled_at,
            send_reveal_sms: call.send_reveal_sms,
            created_at: call.created_at,
            updated_at: call.updated_at,
        }
    }
}

/// Content check request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContentCheckRequest {
    #[validate(length(min = 1, max = 2000, message = "Theme is required"))]
    pub theme: String,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub detail: Option<String>,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "Italiano".to_string()
}

impl ContentCheckRequest {
    pub fn to_check(&self) -> ContentCheck {
        ContentCheck {
            theme: self.theme.clone(),
            detail: self.detail.clone().filter(|d| !d.trim().is_empty()),
            language: self.language.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentCheckResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
}

impl From<ModerationVerdict> for ContentCheckResponse {
    fn from(verdict: ModerationVerdict) -> Self {
        Self {
            approved: verdict.approved,
            blocked: verdict.blocked,
            category: verdict.category,
            message: verdict.message,
        }
    }
}

/// Scheduler sweep summary
#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub provider: ProviderKind,
}

/// Caller's credit balance
#[derive(Debug, Clone, Serialize)]
pub struct CreditsResponse {
    pub user_id: Uuid,
    pub prank_credits: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_call_request_accepts_either_id() {
        let req: EndCallRequest =
            serde_json::from_str(r#"{"providerCallId": "CA123"}"#).unwrap();
        assert!(req.call_request_id.is_none());
        assert_eq!(req.provider_call_id.as_deref(), Some("CA123"));

        let req: EndCallRequest = serde_json::from_str("{}").unwrap();
        assert!(req.call_request_id.is_none() && req.provider_call_id.is_none());
    }

    #[test]
    fn test_content_check_validation() {
        let req: ContentCheckRequest = serde_json::from_str(r#"{"theme": ""}"#).unwrap();
        assert!(req.validate().is_err());
        assert_eq!(req.language, "Italiano");

        let req: ContentCheckRequest =
            serde_json::from_str(r#"{"theme": "Pizza", "detail": " ", "language": "English"}"#)
                .unwrap();
        assert!(req.validate().is_ok());
        assert!(req.to_check().detail.is_none());
    }

    #[test]
    fn test_approved_verdict_omits_block_fields() {
        let body = serde_json::to_value(ContentCheckResponse::from(ModerationVerdict::approve()))
            .unwrap();
        assert_eq!(body["approved"], true);
        assert!(body.get("blocked").is_none());
        assert!(body.get("category").is_none());
    }
}
