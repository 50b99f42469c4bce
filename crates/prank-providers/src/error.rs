//! Provider client errors

use prank_core::AppError;
use thiserror::Error;

/// Errors raised by provider HTTP clients
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout after {0}s")]
    Timeout(u64),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Attach the provider name and convert for the service layer
    pub fn into_app(self, provider: &str) -> AppError {
        match self {
            ProviderError::Config(msg) => {
                AppError::Config(format!("{} is not configured: {}", provider, msg))
            }
            other => AppError::provider(provider, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_app_error() {
        let err = ProviderError::Http {
            status: 400,
            message: "Invalid 'To' phone number".to_string(),
        };
        assert_eq!(err.status(), Some(400));

        match err.into_app("twilio") {
            AppError::Provider { provider, message } => {
                assert_eq!(provider, "twilio");
                assert!(message.contains("Invalid 'To'"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(matches!(
            ProviderError::Config("missing api key".to_string()).into_app("vapi"),
            AppError::Config(_)
        ));
    }
}
