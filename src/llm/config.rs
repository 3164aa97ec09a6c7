//! Provider configuration from the environment

use super::{GeminiService, LlmService, LoggingService};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for the hosted model
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub gemini_api_key: Option<String>,
    /// Gateway URL; when set the gateway handles authentication
    pub gateway: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gateway: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout: std::env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
        }
    }
}

/// Build the logging-wrapped service, or `None` when no credentials exist
pub fn create_service(config: &LlmConfig) -> Option<Arc<dyn LlmService>> {
    // In gateway mode, use "implicit" as the API key
    let api_key = if config.gateway.is_some() {
        "implicit".to_string()
    } else {
        config.gemini_api_key.clone().filter(|k| !k.is_empty())?
    };

    match GeminiService::new(api_key, &config.model, config.gateway.as_deref(), config.timeout) {
        Ok(service) => Some(Arc::new(LoggingService::new(Arc::new(service)))),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create Gemini client");
            None
        }
    }
}
