//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::LlmClient;
use crate::llm::{GenerationOptions, LlmError};
use crate::narrator::{SpeechEngine, SpeechError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Duration,
    /// Record of all requests made
    pub requests: Mutex<Vec<(String, GenerationOptions)>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Every call sleeps for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            delay,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<(String, GenerationOptions)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap()
            .push((prompt.to_string(), *options));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Recording Speech Engine
// ============================================================================

/// Speech engine that records what it was asked to say
pub struct RecordingSpeechEngine {
    spoken: Mutex<Vec<String>>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingSpeechEngine {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Each utterance takes `delay` to "play"
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Utterances in the order playback started
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Highest number of utterances ever playing at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Wait until `count` utterances have started
    pub async fn wait_for(&self, count: usize) {
        tokio::time::timeout(WAIT_LIMIT, async {
            while self.spoken.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("timed out waiting for speech");
    }

    /// Wait until the first utterance has started
    pub async fn wait_for_start(&self) {
        self.wait_for(1).await;
    }
}

impl Default for RecordingSpeechEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechEngine for RecordingSpeechEngine {
    async fn say(&self, text: &str) -> Result<(), SpeechError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.spoken.lock().unwrap().push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
