//! LLM content classification
//!
//! Sends the prank theme to an OpenAI-compatible chat completions endpoint
//! and expects a JSON verdict back. Keyword rules and the fail-open policy
//! live in the service layer; this client only reports what the model said.

use crate::error::ProviderError;
use crate::http::{build_client, send_json};
use async_trait::async_trait;
use prank_core::{
    config::{HttpConfig, ModerationConfig},
    models::{ContentCheck, ModerationVerdict},
    traits::ModerationClient,
    AppError,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

const PROVIDER: &str = "moderation";

const SYSTEM_PROMPT: &str = "You review themes for harmless prank phone calls. \
Block content involving threats, violence, self-harm, sexual content, harassment, \
discrimination, impersonation of police, medical or emergency services, fake \
accidents or deaths, extortion, or requests for personal or financial data. \
Answer only with a JSON object: \
{\"approved\": boolean, \"category\": string or null, \"reason\": string}. \
Write the reason in the language of the theme.";

/// Chat-completions backed `ModerationClient`
pub struct LlmModerationClient {
    http: Client,
    config: ModerationConfig,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    approved: bool,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl LlmModerationClient {
    pub fn new(config: &ModerationConfig, http: &HttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(http.timeout_secs)?,
            config: config.clone(),
            timeout_secs: http.timeout_secs,
        })
    }

    fn request_body(&self, check: &ContentCheck) -> Value {
        let mut user = format!("Language: {}\nTheme: {}", check.language, check.theme.trim());
        if let Some(detail) = check.detail.as_deref().filter(|d| !d.trim().is_empty()) {
            user.push_str(&format!("\nExtra detail: {}", detail.trim()));
        }

        json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user },
            ],
        })
    }

    async fn complete(&self, check: &ContentCheck) -> Result<Completion, ProviderError> {
        let url = self
            .config
            .gateway_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ProviderError::Config("gateway_url is required".to_string()))?;

        let mut builder = self.http.post(url).json(&self.request_body(check));
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        send_json(PROVIDER, builder, self.timeout_secs).await
    }
}

/// Turn the model's JSON answer into a verdict
fn parse_verdict(content: &str) -> Result<ModerationVerdict, ProviderError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let raw: RawVerdict = serde_json::from_str(trimmed)
        .map_err(|e| ProviderError::Parse(format!("moderation verdict: {}", e)))?;

    if raw.approved {
        return Ok(ModerationVerdict::approve());
    }

    Ok(ModerationVerdict::block(
        raw.category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "inappropriate".to_string()),
        raw.reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "This theme is not allowed".to_string()),
    ))
}

#[async_trait]
impl ModerationClient for LlmModerationClient {
    #[instrument(skip(self, check), fields(language = %check.language))]
    async fn classify(&self, check: &ContentCheck) -> Result<ModerationVerdict, AppError> {
        let completion = self.complete(check).await.map_err(|e| {
            warn!(
                provider = PROVIDER,
                payload = "chat completion (system + user, json_object)",
                theme_chars = check.theme.chars().count(),
                error = %e,
                "Moderation request failed"
            );
            e.into_app(PROVIDER)
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::provider(PROVIDER, "empty completion"))?;

        let verdict = parse_verdict(&content).map_err(|e| e.into_app(PROVIDER))?;
        debug!(approved = verdict.approved, category = ?verdict.category, "Moderation verdict");

        Ok(verdict)
    }
}
