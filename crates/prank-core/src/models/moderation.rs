//! Content moderation types

use serde::{Deserialize, Serialize};

/// Text submitted to the content gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentCheck {
    pub theme: String,
    pub detail: Option<String>,
    pub language: String,
}

/// Gate decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub approved: bool,
    pub blocked: bool,
    pub category: Option<String>,
    pub message: String,
}

impl ModerationVerdict {
    pub fn approve() -> Self {
        Self {
            approved: true,
            blocked: false,
            category: None,
            message: "Content approved".to_string(),
        }
    }

    pub fn block(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            approved: false,
            blocked: true,
            category: Some(category.into()),
            message: message.into(),
        }
    }
}
