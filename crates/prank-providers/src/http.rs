//! Shared HTTP plumbing for provider clients

use crate::error::ProviderError;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// Build a client with a bounded request timeout
pub fn build_client(timeout_secs: u64) -> Result<Client, ProviderError> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(5)))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| ProviderError::Connection(e.to_string()))
}

/// Send a request; non-2xx responses become `ProviderError::Http`
pub async fn send(
    provider: &str,
    request: RequestBuilder,
    timeout_secs: u64,
) -> Result<Response, ProviderError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(timeout_secs)
        } else {
            ProviderError::Connection(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        debug!(provider, status = status.as_u16(), "Provider request succeeded");
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| truncate(&body, 300));
    error!(
        provider,
        status = status.as_u16(),
        message = %message,
        "Provider rejected request"
    );

    Err(ProviderError::Http {
        status: status.as_u16(),
        message,
    })
}

/// Send and decode a JSON body
pub async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
    timeout_secs: u64,
) -> Result<T, ProviderError> {
    let response = send(provider, request, timeout_secs).await?;
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Parse(format!("Failed to read response body: {}", e)))?;

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::Parse(format!("Unexpected {} response: {}", provider, e)))
}

/// Pull a human-readable message out of common provider error bodies
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.get("message"),
        value.pointer("/error/message"),
        value.get("error"),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string));
    found
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"code":21211,"message":"Invalid 'To' Phone Number"}"#).as_deref(),
            Some("Invalid 'To' Phone Number")
        );
        assert_eq!(
            error_message(r#"{"error":{"message":"No such checkout.session"}}"#).as_deref(),
            Some("No such checkout.session")
        );
        assert_eq!(
            error_message(r#"{"error":"Unauthorized"}"#).as_deref(),
            Some("Unauthorized")
        );
        assert_eq!(error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
