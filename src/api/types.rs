//! API request and response types

use serde::{Deserialize, Serialize};

/// Request to submit a prompt
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    /// Continue an existing conversation; omitted starts a new one
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Response for a prompt submission
#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Request to rename a conversation
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

/// Response for actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
