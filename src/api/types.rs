//! API request and response types

use crate::llm::OptionSpec;
use crate::state_machine::SessionSettings;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    /// Sidebar values at the moment of sending
    #[serde(default)]
    pub settings: SessionSettings,
}

/// Request to update the sidebar values
#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub settings: SessionSettings,
}

/// Response for session creation
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: String,
    pub log_file: String,
}

/// Response describing the sidebar controls
#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub options: Vec<OptionSpec>,
    pub defaults: SessionSettings,
    pub speech_available: bool,
    pub model: String,
}

/// Response for chat action
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub queued: bool,
}

/// Response for lifecycle actions
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
