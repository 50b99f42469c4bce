//! Twilio Messaging

use super::{account_url, check_credentials, PROVIDER};
use crate::error::ProviderError;
use crate::http::{build_client, send_json};
use async_trait::async_trait;
use prank_core::{
    config::{HttpConfig, TwilioConfig},
    traits::SmsSender,
    AppError,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};

/// Twilio implementation of `SmsSender`
pub struct TwilioSmsClient {
    http: Client,
    config: TwilioConfig,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

impl TwilioSmsClient {
    pub fn new(config: &TwilioConfig, http: &HttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(http.timeout_secs)?,
            config: config.clone(),
            timeout_secs: http.timeout_secs,
        })
    }
}

#[async_trait]
impl SmsSender for TwilioSmsClient {
    #[instrument(skip(self, body))]
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, AppError> {
        check_credentials(&self.config).map_err(|e| e.into_app(PROVIDER))?;

        let builder = self
            .http
            .post(account_url(&self.config, "Messages.json"))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ]);

        let message: MessageResource = send_json(PROVIDER, builder, self.timeout_secs)
            .await
            .map_err(|e| {
                warn!(
                    provider = PROVIDER,
                    payload = "Messages.json form (To, From, Body)",
                    body_chars = body.chars().count(),
                    error = %e,
                    "Failed to send SMS"
                );
                e.into_app(PROVIDER)
            })?;

        info!(message_sid = %message.sid, "SMS queued");
        Ok(message.sid)
    }
}
