//! Unified error handling for the prank call service
//!
//! This module provides a single error type covering every failure the
//! user-facing RPCs can report, with automatic HTTP response mapping.
//! Provider-facing webhooks never surface these; they always acknowledge.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Error surfaced by the user-facing RPCs and the admin console
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Authentication Errors ====================
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: insufficient permissions")]
    Forbidden,

    // ==================== Business Logic Errors ====================
    #[error("Call request not found: {0}")]
    CallRequestNotFound(String),

    #[error("Insufficient prank credits: {available} available")]
    InsufficientCredits { available: i32 },

    #[error("{message}")]
    ModerationBlocked { category: String, message: String },

    #[error("Payment not completed: {0}")]
    PaymentNotCompleted(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ==================== External Service Errors ====================
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },
}

impl AppError {
    /// Build a provider error from any displayable source
    pub fn provider(provider: impl Into<String>, message: impl ToString) -> Self {
        AppError::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MissingField(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidToken(_) | AppError::TokenExpired | AppError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InsufficientCredits { .. } | AppError::PaymentNotCompleted(_) => {
                StatusCode::PAYMENT_REQUIRED
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::CallRequestNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ModerationBlocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Provider { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the `error` field
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::TokenExpired => "token_expired",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::CallRequestNotFound(_) => "call_request_not_found",
            AppError::InsufficientCredits { .. } => "insufficient_credits",
            AppError::ModerationBlocked { .. } => "moderation_blocked",
            AppError::PaymentNotCompleted(_) => "payment_not_completed",
            AppError::Validation(_) => "validation_error",
            AppError::MissingField(_) => "missing_field",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Provider { .. } => "provider_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        if let AppError::ModerationBlocked { category, .. } = self {
            body["category"] = json!(category);
        }

        HttpResponse::build(status).json(body)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::MissingField("victim_phone".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::CallRequestNotFound("123".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InsufficientCredits { available: 0 }.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::provider("twilio", "timeout").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Forbidden.error_code(), "forbidden");
        assert_eq!(
            AppError::ModerationBlocked {
                category: "violence".to_string(),
                message: "Theme not allowed".to_string(),
            }
            .error_code(),
            "moderation_blocked"
        );
    }

    #[test]
    fn test_moderation_message_is_surfaced_verbatim() {
        let err = AppError::ModerationBlocked {
            category: "threats".to_string(),
            message: "Il tema contiene minacce".to_string(),
        };
        assert_eq!(err.to_string(), "Il tema contiene minacce");
    }
}
