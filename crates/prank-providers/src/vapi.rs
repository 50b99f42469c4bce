//! VAPI voice-AI calls
//!
//! Outbound calls are created with either a referenced assistant plus
//! overrides, or an inline assistant carrying the rendered prompt. VAPI
//! reports progress by posting server messages to our webhook; those are
//! parsed here into [`ProviderEvent`]s.

use crate::error::ProviderError;
use crate::http::{build_client, send, send_json};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prank_core::{
    config::{HttpConfig, VapiConfig},
    models::{
        CallRequest, CallScript, CallStatus, EndCallOutcome, NormalizedStatus, ProviderEvent,
        ProviderKind,
    },
    traits::CallProvider,
    AppError,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

const PROVIDER: &str = "vapi";

const VOICE_PROVIDER: &str = "11labs";
const TRANSCRIBER_PROVIDER: &str = "deepgram";
const TRANSCRIBER_MODEL: &str = "nova-2";

/// VAPI implementation of `CallProvider`
pub struct VapiClient {
    http: Client,
    config: VapiConfig,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

impl VapiClient {
    pub fn new(config: &VapiConfig, http: &HttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(http.timeout_secs)?,
            config: config.clone(),
            timeout_secs: http.timeout_secs,
        })
    }

    fn check_credentials(&self) -> Result<(), ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::Config("api_key is required".to_string()));
        }
        if self.config.phone_number_id.trim().is_empty() {
            return Err(ProviderError::Config("phone_number_id is required".to_string()));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Request body for `POST /call`
    fn call_payload(&self, request: &CallRequest, script: &CallScript) -> Value {
        let mut payload = json!({
            "phoneNumberId": self.config.phone_number_id,
            "customer": {
                "number": request.victim_phone.trim(),
                "name": request.victim_full_name(),
            },
            "metadata": {
                "callRequestId": request.id.to_string(),
            },
        });

        match self.config.assistant_id.as_deref().filter(|id| !id.is_empty()) {
            Some(assistant_id) => {
                payload["assistantId"] = json!(assistant_id);
                payload["assistantOverrides"] = json!({
                    "firstMessage": script.first_message,
                    "model": self.model_block(script),
                    "voice": voice_block(script),
                    "variableValues": {
                        "victimName": request.victim_full_name(),
                        "greeting": script.greeting,
                    },
                });
            }
            None => {
                let mut assistant = json!({
                    "name": format!("prank-{}", request.id),
                    "firstMessage": script.first_message,
                    "model": self.model_block(script),
                    "voice": voice_block(script),
                    "transcriber": {
                        "provider": TRANSCRIBER_PROVIDER,
                        "model": TRANSCRIBER_MODEL,
                        "language": transcriber_language(&script.language_code),
                    },
                    "maxDurationSeconds": request.max_duration,
                    "recordingEnabled": true,
                });
                if let Some(server_url) = self.config.server_url.as_deref() {
                    assistant["serverUrl"] = json!(server_url);
                }
                payload["assistant"] = assistant;
            }
        }

        payload
    }

    fn model_block(&self, script: &CallScript) -> Value {
        json!({
            "provider": "openai",
            "model": self.config.model,
            "temperature": script.temperature,
            "messages": [
                { "role": "system", "content": script.system_prompt }
            ],
        })
    }

    async fn create_call(
        &self,
        request: &CallRequest,
        script: &CallScript,
    ) -> Result<CallResource, ProviderError> {
        self.check_credentials()?;

        let builder = self
            .http
            .post(self.url("call"))
            .bearer_auth(&self.config.api_key)
            .json(&self.call_payload(request, script));

        send_json(PROVIDER, builder, self.timeout_secs).await
    }

    async fn delete_call(&self, provider_call_id: &str) -> Result<EndCallOutcome, ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::Config("api_key is required".to_string()));
        }

        let builder = self
            .http
            .delete(self.url(&format!("call/{}", provider_call_id)))
            .bearer_auth(&self.config.api_key);

        match send(PROVIDER, builder, self.timeout_secs).await {
            Ok(_) => Ok(EndCallOutcome::Ended),
            Err(ProviderError::Http { status: 404, .. }) => Ok(EndCallOutcome::AlreadyEnded),
            Err(e) => Err(e),
        }
    }
}

fn voice_block(script: &CallScript) -> Value {
    json!({
        "provider": VOICE_PROVIDER,
        "voiceId": script.voice_id,
    })
}

/// Deepgram takes the primary language subtag ("it-IT" -> "it")
fn transcriber_language(language_code: &str) -> String {
    language_code
        .split('-')
        .next()
        .unwrap_or(language_code)
        .to_lowercase()
}

#[async_trait]
impl CallProvider for VapiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vapi
    }

    #[instrument(skip(self, request, script), fields(call_request_id = %request.id))]
    async fn start_call(
        &self,
        request: &CallRequest,
        script: &CallScript,
    ) -> Result<String, AppError> {
        let payload_shape = if self.config.assistant_id.is_some() {
            "assistantId + assistantOverrides"
        } else {
            "inline assistant"
        };

        let call = self.create_call(request, script).await.map_err(|e| {
            warn!(
                call_request_id = %request.id,
                provider = PROVIDER,
                payload = payload_shape,
                error = %e,
                "Failed to start call"
            );
            e.into_app(PROVIDER)
        })?;

        info!(
            call_request_id = %request.id,
            vapi_call_id = %call.id,
            status = ?call.status,
            "VAPI call created"
        );

        Ok(call.id)
    }

    #[instrument(skip(self))]
    async fn end_call(&self, provider_call_id: &str) -> Result<EndCallOutcome, AppError> {
        self.delete_call(provider_call_id).await.map_err(|e| {
            warn!(vapi_call_id = %provider_call_id, error = %e, "Failed to end VAPI call");
            e.into_app(PROVIDER)
        })
    }

    fn normalize_status(&self, token: &str) -> NormalizedStatus {
        normalize_vapi_status(token)
    }
}

/// Map a `status-update` token
pub fn normalize_vapi_status(token: &str) -> NormalizedStatus {
    match token.trim().to_lowercase().as_str() {
        "queued" => NormalizedStatus::Known(CallStatus::Initiated),
        "ringing" => NormalizedStatus::Known(CallStatus::Ringing),
        "in-progress" => NormalizedStatus::Known(CallStatus::InProgress),
        "ended" => NormalizedStatus::Known(CallStatus::Completed),
        _ => NormalizedStatus::Passthrough(token.to_string()),
    }
}

/// Map the `endedReason` of an end-of-call report
pub fn status_from_ended_reason(reason: &str) -> CallStatus {
    let reason = reason.trim().to_lowercase();
    match reason.as_str() {
        "customer-busy" => CallStatus::Busy,
        "customer-did-not-answer" | "no-answer" => CallStatus::NoAnswer,
        r if r.contains("error") || r.contains("failed") => CallStatus::Failed,
        _ => CallStatus::Completed,
    }
}

/// Parse a server message posted to the VAPI webhook.
///
/// Returns `None` for message types that carry no lifecycle signal or
/// lack a call id.
pub fn parse_server_message(body: &Value) -> Option<ProviderEvent> {
    let message = body.get("message").unwrap_or(body);
    let kind = message.get("type")?.as_str()?;
    let call_id = message.pointer("/call/id")?.as_str()?.to_string();

    match kind {
        "status-update" => {
            let token = message.get("status")?.as_str()?;
            let status = match normalize_vapi_status(token) {
                // The outcome lives in endedReason; without one the
                // end-of-call report decides
                NormalizedStatus::Known(CallStatus::Completed) => ended_reason(message)
                    .map(|reason| NormalizedStatus::Known(status_from_ended_reason(reason)))
                    .unwrap_or_else(|| NormalizedStatus::Passthrough(token.to_string())),
                other => other,
            };
            Some(ProviderEvent {
                provider_call_id: call_id,
                status,
                recording_url: None,
                duration_seconds: None,
            })
        }
        "end-of-call-report" => {
            let reason = ended_reason(message).unwrap_or_default();
            let recording_url = message
                .get("recordingUrl")
                .or_else(|| message.pointer("/artifact/recordingUrl"))
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(str::to_string);

            Some(ProviderEvent {
                provider_call_id: call_id,
                status: NormalizedStatus::Known(status_from_ended_reason(reason)),
                recording_url,
                duration_seconds: report_duration(message),
            })
        }
        other => {
            debug!(message_type = other, "Ignoring VAPI server message");
            None
        }
    }
}

fn ended_reason(message: &Value) -> Option<&str> {
    message
        .get("endedReason")
        .or_else(|| message.pointer("/call/endedReason"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
}

fn report_duration(message: &Value) -> Option<i32> {
    if let Some(seconds) = message.get("durationSeconds").and_then(Value::as_f64) {
        return Some(seconds.round() as i32);
    }

    let timestamp = |key: &str| {
        message
            .get(key)
            .or_else(|| message.pointer(&format!("/call/{}", key)))
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
    };
    let started = timestamp("startedAt")?;
    let ended = timestamp("endedAt")?;

    Some((ended - started).num_seconds().max(0) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(assistant_id: Option<&str>) -> VapiConfig {
        VapiConfig {
            api_key: "key".to_string(),
            phone_number_id: "pn_1".to_string(),
            assistant_id: assistant_id.map(str::to_string),
            server_url: Some("https://pranks.example.com/webhooks/vapi".to_string()),
            api_base_url: "https://api.vapi.ai".to_string(),
            model: "gpt-4o".to_string(),
        }
    }

    fn script() -> CallScript {
        CallScript {
            system_prompt: "Sei un fattorino".to_string(),
            first_message: "Buongiorno, parlo con Marco?".to_string(),
            greeting: "buongiorno".to_string(),
            temperature: 0.9,
            language_code: "it-IT".to_string(),
            voice_id: "voice_it_male".to_string(),
        }
    }

    fn request() -> CallRequest {
        CallRequest {
            victim_first_name: "Marco".to_string(),
            victim_last_name: Some("Rossi".to_string()),
            victim_phone: "+393331234567".to_string(),
            max_duration: 240,
            ..Default::default()
        }
    }

    #[test]
    fn test_inline_assistant_payload() {
        let client = VapiClient::new(&config(None), &HttpConfig::default()).unwrap();
        let request = request();
        let payload = client.call_payload(&request, &script());

        assert_eq!(payload["phoneNumberId"], "pn_1");
        assert_eq!(payload["customer"]["name"], "Marco Rossi");
        assert_eq!(payload["metadata"]["callRequestId"], request.id.to_string());
        assert!(payload.get("assistantId").is_none());

        let assistant = &payload["assistant"];
        assert_eq!(assistant["firstMessage"], "Buongiorno, parlo con Marco?");
        assert_eq!(assistant["model"]["messages"][0]["role"], "system");
        assert_eq!(assistant["voice"]["provider"], "11labs");
        assert_eq!(assistant["transcriber"]["language"], "it");
        assert_eq!(assistant["maxDurationSeconds"], 240);
        assert_eq!(
            assistant["serverUrl"],
            "https://pranks.example.com/webhooks/vapi"
        );
    }

    #[test]
    fn test_referenced_assistant_payload() {
        let client = VapiClient::new(&config(Some("asst_1")), &HttpConfig::default()).unwrap();
        let payload = client.call_payload(&request(), &script());

        assert_eq!(payload["assistantId"], "asst_1");
        assert_eq!(
            payload["assistantOverrides"]["voice"]["voiceId"],
            "voice_it_male"
        );
        assert!(payload.get("assistant").is_none());
    }

    #[test]
    fn test_status_update_mapping() {
        assert_eq!(
            normalize_vapi_status("queued"),
            NormalizedStatus::Known(CallStatus::Initiated)
        );
        assert_eq!(
            normalize_vapi_status("in-progress"),
            NormalizedStatus::Known(CallStatus::InProgress)
        );
        assert_eq!(
            normalize_vapi_status("ended"),
            NormalizedStatus::Known(CallStatus::Completed)
        );
        assert_eq!(
            normalize_vapi_status("forwarding"),
            NormalizedStatus::Passthrough("forwarding".to_string())
        );
    }

    #[test]
    fn test_ended_reason_mapping() {
        assert_eq!(status_from_ended_reason("customer-busy"), CallStatus::Busy);
        assert_eq!(
            status_from_ended_reason("customer-did-not-answer"),
            CallStatus::NoAnswer
        );
        assert_eq!(
            status_from_ended_reason("pipeline-error-openai-llm-failed"),
            CallStatus::Failed
        );
        assert_eq!(
            status_from_ended_reason("customer-ended-call"),
            CallStatus::Completed
        );
        assert_eq!(status_from_ended_reason(""), CallStatus::Completed);
    }

    #[test]
    fn test_parse_end_of_call_report() {
        let body = json!({
            "message": {
                "type": "end-of-call-report",
                "endedReason": "assistant-ended-call",
                "call": { "id": "call_1" },
                "artifact": { "recordingUrl": "https://storage.vapi.ai/call_1.wav" },
                "durationSeconds": 44.6
            }
        });

        let event = parse_server_message(&body).unwrap();
        assert_eq!(event.provider_call_id, "call_1");
        assert_eq!(event.status, NormalizedStatus::Known(CallStatus::Completed));
        assert_eq!(
            event.recording_url.as_deref(),
            Some("https://storage.vapi.ai/call_1.wav")
        );
        assert_eq!(event.duration_seconds, Some(45));
    }

    #[test]
    fn test_ended_status_update_uses_reason() {
        let unanswered = json!({
            "message": {
                "type": "status-update",
                "status": "ended",
                "endedReason": "customer-did-not-answer",
                "call": { "id": "call_3" }
            }
        });
        assert_eq!(
            parse_server_message(&unanswered).unwrap().status,
            NormalizedStatus::Known(CallStatus::NoAnswer)
        );

        let no_reason = json!({
            "message": { "type": "status-update", "status": "ended", "call": { "id": "call_3" } }
        });
        assert_eq!(
            parse_server_message(&no_reason).unwrap().status,
            NormalizedStatus::Passthrough("ended".to_string())
        );
    }

    #[test]
    fn test_report_duration_from_timestamps() {
        let body = json!({
            "message": {
                "type": "end-of-call-report",
                "endedReason": "customer-ended-call",
                "call": { "id": "call_2" },
                "startedAt": "2024-05-01T10:00:00Z",
                "endedAt": "2024-05-01T10:01:05Z"
            }
        });

        let event = parse_server_message(&body).unwrap();
        assert_eq!(event.duration_seconds, Some(65));
        assert_eq!(event.recording_url, None);
    }

    #[test]
    fn test_ignored_messages() {
        let transcript = json!({
            "message": { "type": "transcript", "call": { "id": "call_1" } }
        });
        assert!(parse_server_message(&transcript).is_none());

        let no_call = json!({ "message": { "type": "status-update", "status": "ringing" } });
        assert!(parse_server_message(&no_call).is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let mut cfg = config(None);
        cfg.api_key = String::new();
        let client = VapiClient::new(&cfg, &HttpConfig::default()).unwrap();

        let result = client.start_call(&request(), &script()).await;
        assert!(matches!(result, Err(AppError::Config(_))));

        let result = client.end_call("call_1").await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
