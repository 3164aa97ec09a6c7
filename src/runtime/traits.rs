//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::llm::{GenerationOptions, GenerationRequest, LlmError, LlmService};
use async_trait::async_trait;
use std::sync::Arc;

/// Client for single-prompt generation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a reply for `prompt`.
    ///
    /// Fails when the call fails, the service returns an error status, or
    /// the reply has no text.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        (**self).generate(prompt, options).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use an `LlmService` as `LlmClient`
pub struct ServiceLlmClient {
    service: Option<Arc<dyn LlmService>>,
}

impl ServiceLlmClient {
    /// `None` yields a client whose every call fails with an auth error
    pub fn new(service: Option<Arc<dyn LlmService>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LlmClient for ServiceLlmClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| LlmError::auth("No LLM available: set GEMINI_API_KEY or LLM_GATEWAY"))?;

        let response = service
            .generate(&GenerationRequest::new(prompt, *options))
            .await?;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(LlmError::empty_response("Response contained no text"));
        }
        Ok(text.to_string())
    }

    fn model_id(&self) -> &str {
        self.service.as_ref().map_or("none", |s| s.model_id())
    }
}
