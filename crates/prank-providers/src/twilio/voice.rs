//! Twilio outbound voice calls

use super::{account_url, check_credentials, status::normalize_call_status, PROVIDER};
use crate::error::ProviderError;
use crate::http::{build_client, send, send_json};
use async_trait::async_trait;
use prank_core::{
    config::{HttpConfig, TwilioConfig},
    models::{CallRequest, CallScript, EndCallOutcome, NormalizedStatus, ProviderKind},
    traits::CallProvider,
    AppError,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};

/// Status callback events requested for every call
const STATUS_EVENTS: [&str; 4] = ["initiated", "ringing", "answered", "completed"];

/// Twilio implementation of `CallProvider`
pub struct TwilioVoiceClient {
    http: Client,
    config: TwilioConfig,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

impl TwilioVoiceClient {
    pub fn new(config: &TwilioConfig, http: &HttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(http.timeout_secs)?,
            config: config.clone(),
            timeout_secs: http.timeout_secs,
        })
    }

    fn webhook_base(&self) -> Result<&str, ProviderError> {
        let base = self.config.webhook_base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ProviderError::Config("webhook_base_url is required".to_string()));
        }
        Ok(base)
    }

    /// Form parameters for the Calls resource
    fn call_params(&self, request: &CallRequest) -> Result<Vec<(&'static str, String)>, ProviderError> {
        let base = self.webhook_base()?;
        let status_url = format!("{}/webhooks/twilio/status", base);

        let mut params = vec![
            ("To", request.victim_phone.trim().to_string()),
            ("From", self.config.from_number.clone()),
            ("Url", format!("{}/webhooks/twilio/voice/{}", base, request.id)),
            ("Method", "POST".to_string()),
            ("StatusCallback", status_url.clone()),
            ("StatusCallbackMethod", "POST".to_string()),
        ];
        params.extend(
            STATUS_EVENTS
                .iter()
                .map(|event| ("StatusCallbackEvent", event.to_string())),
        );
        params.extend([
            ("Record", "true".to_string()),
            ("RecordingStatusCallback", status_url),
            ("RecordingStatusCallbackMethod", "POST".to_string()),
            ("TimeLimit", request.max_duration.to_string()),
        ]);

        Ok(params)
    }

    async fn create_call(&self, request: &CallRequest) -> Result<CallResource, ProviderError> {
        check_credentials(&self.config)?;
        let params = self.call_params(request)?;

        let builder = self
            .http
            .post(account_url(&self.config, "Calls.json"))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params);

        send_json(PROVIDER, builder, self.timeout_secs).await
    }

    async fn hang_up(&self, provider_call_id: &str) -> Result<EndCallOutcome, ProviderError> {
        check_credentials(&self.config)?;

        let builder = self
            .http
            .post(account_url(
                &self.config,
                &format!("Calls/{}.json", provider_call_id),
            ))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("Status", "completed")]);

        match send(PROVIDER, builder, self.timeout_secs).await {
            Ok(_) => Ok(EndCallOutcome::Ended),
            Err(e) if is_already_ended(&e) => Ok(EndCallOutcome::AlreadyEnded),
            Err(e) => Err(e),
        }
    }
}

/// Twilio answers 404 for unknown calls and 400 for calls no longer live
fn is_already_ended(err: &ProviderError) -> bool {
    match err {
        ProviderError::Http { status: 404, .. } => true,
        ProviderError::Http {
            status: 400,
            message,
        } => message.to_lowercase().contains("not in-progress"),
        _ => false,
    }
}

#[async_trait]
impl CallProvider for TwilioVoiceClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Twilio
    }

    #[instrument(skip(self, request, _script), fields(call_request_id = %request.id))]
    async fn start_call(
        &self,
        request: &CallRequest,
        _script: &CallScript,
    ) -> Result<String, AppError> {
        let call = self.create_call(request).await.map_err(|e| {
            warn!(
                call_request_id = %request.id,
                provider = PROVIDER,
                payload = "Calls.json form (To, From, Url, StatusCallback, Record, TimeLimit)",
                error = %e,
                "Failed to start call"
            );
            e.into_app(PROVIDER)
        })?;

        info!(
            call_request_id = %request.id,
            call_sid = %call.sid,
            status = ?call.status,
            "Twilio call created"
        );

        Ok(call.sid)
    }

    #[instrument(skip(self))]
    async fn end_call(&self, provider_call_id: &str) -> Result<EndCallOutcome, AppError> {
        self.hang_up(provider_call_id).await.map_err(|e| {
            warn!(call_sid = %provider_call_id, error = %e, "Failed to end Twilio call");
            e.into_app(PROVIDER)
        })
    }

    fn normalize_status(&self, token: &str) -> NormalizedStatus {
        normalize_call_status(token)
    }

    /// Recording references are stored with the configured media extension
    fn recording_url(&self, raw: &str) -> String {
        let raw = raw.trim();
        let last_segment = raw.rsplit('/').next().unwrap_or(raw);
        if last_segment.contains('.') {
            raw.to_string()
        } else {
            format!("{}{}", raw, self.config.recording_extension)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            from_number: "+390212345678".to_string(),
            webhook_base_url: "https://pranks.example.com/".to_string(),
            media_stream_url: None,
            recording_extension: ".mp3".to_string(),
            api_base_url: "https://api.twilio.com/2010-04-01".to_string(),
        }
    }

    fn client() -> TwilioVoiceClient {
        TwilioVoiceClient::new(&config(), &HttpConfig::default()).unwrap()
    }

    #[test]
    fn test_call_params() {
        let request = CallRequest {
            victim_phone: "+393331234567".to_string(),
            max_duration: 180,
            ..Default::default()
        };

        let params = client().call_params(&request).unwrap();
        let get = |key: &str| {
            params
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .collect::<Vec<_>>()
        };

        assert_eq!(get("To"), vec!["+393331234567"]);
        assert_eq!(
            get("Url"),
            vec![format!("https://pranks.example.com/webhooks/twilio/voice/{}", request.id).as_str()]
        );
        assert_eq!(
            get("StatusCallback"),
            vec!["https://pranks.example.com/webhooks/twilio/status"]
        );
        assert_eq!(get("StatusCallbackEvent").len(), 4);
        assert_eq!(get("TimeLimit"), vec!["180"]);
    }

    #[test]
    fn test_missing_webhook_base_is_config_error() {
        let mut cfg = config();
        cfg.webhook_base_url = String::new();
        let client = TwilioVoiceClient::new(&cfg, &HttpConfig::default()).unwrap();

        assert!(matches!(
            client.call_params(&CallRequest::default()),
            Err(ProviderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_network() {
        let mut cfg = config();
        cfg.auth_token = String::new();
        let client = TwilioVoiceClient::new(&cfg, &HttpConfig::default()).unwrap();

        let result = client
            .start_call(&CallRequest::default(), &test_script())
            .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_recording_url_extension() {
        let client = client();
        assert_eq!(
            client.recording_url("https://api.twilio.com/2010-04-01/Accounts/AC1/Recordings/RE1"),
            "https://api.twilio.com/2010-04-01/Accounts/AC1/Recordings/RE1.mp3"
        );
        assert_eq!(
            client.recording_url("https://api.twilio.com/Recordings/RE1.wav"),
            "https://api.twilio.com/Recordings/RE1.wav"
        );
    }

    #[test]
    fn test_already_ended_detection() {
        assert!(is_already_ended(&ProviderError::Http {
            status: 404,
            message: "The requested resource was not found".to_string(),
        }));
        assert!(is_already_ended(&ProviderError::Http {
            status: 400,
            message: "Call is not in-progress. Cannot redirect.".to_string(),
        }));
        assert!(!is_already_ended(&ProviderError::Http {
            status: 401,
            message: "Authenticate".to_string(),
        }));
        assert!(!is_already_ended(&ProviderError::Timeout(15)));
    }

    fn test_script() -> CallScript {
        CallScript {
            system_prompt: String::new(),
            first_message: String::new(),
            greeting: "buongiorno".to_string(),
            temperature: 0.7,
            language_code: "it-IT".to_string(),
            voice_id: "voice".to_string(),
        }
    }
}
