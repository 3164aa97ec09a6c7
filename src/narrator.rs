//! Spoken playback of assistant replies
//!
//! Callers enqueue text; a single worker task speaks utterances one at a
//! time, so playback never overlaps. Clearing the queue drops everything
//! that has not started yet.

mod command;

pub use command::CommandSpeechEngine;

use crate::config::SpeechConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Speech backend errors
#[derive(Debug, Error)]
pub enum SpeechError {
    /// No usable voice backend on this platform
    #[error("speech engine unavailable: {0}")]
    Init(String),
    /// A single utterance failed to play
    #[error("speech playback failed: {0}")]
    Playback(String),
}

/// A voice that can read one string aloud
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Speak `text`, returning once playback has finished
    async fn say(&self, text: &str) -> Result<(), SpeechError>;

    fn name(&self) -> &str;
}

struct Utterance {
    epoch: u64,
    text: String,
}

/// Handle to the playback queue
pub struct Narrator {
    tx: Option<mpsc::UnboundedSender<Utterance>>,
    epoch: Arc<AtomicU64>,
}

impl Narrator {
    /// Start the playback worker for `engine`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(engine: Arc<dyn SpeechEngine>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Utterance>();
        let epoch = Arc::new(AtomicU64::new(0));
        let current = epoch.clone();

        tokio::spawn(async move {
            tracing::info!(engine = %engine.name(), "Narrator started");
            while let Some(utterance) = rx.recv().await {
                if utterance.epoch < current.load(Ordering::Acquire) {
                    continue; // cleared
                }
                if let Err(e) = engine.say(&utterance.text).await {
                    tracing::warn!(error = %e, "Speech playback failed");
                }
            }
            tracing::info!("Narrator stopped");
        });

        Self {
            tx: Some(tx),
            epoch,
        }
    }

    /// Start a narrator on the configured voice, falling back to a
    /// disabled one when speech is off or no backend can be found
    pub fn from_config(config: &SpeechConfig) -> Self {
        if !config.enabled {
            tracing::info!("Speech disabled by configuration");
            return Self::disabled();
        }

        let engine = match &config.command {
            Some(command) => CommandSpeechEngine::from_command(command),
            None => CommandSpeechEngine::detect(),
        };

        match engine {
            Ok(engine) => Self::spawn(Arc::new(engine)),
            Err(e) => {
                tracing::warn!(error = %e, "Speech unavailable, replies will not be read aloud");
                Self::disabled()
            }
        }
    }

    /// A narrator that never speaks
    pub fn disabled() -> Self {
        Self {
            tx: None,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue `text` for playback and return immediately.
    ///
    /// Blank text is ignored, as is everything when disabled.
    pub fn speak(&self, text: &str) {
        let Some(tx) = &self.tx else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }
        let utterance = Utterance {
            epoch: self.epoch.load(Ordering::Acquire),
            text: text.to_string(),
        };
        if tx.send(utterance).is_err() {
            tracing::warn!("Narrator worker has stopped; dropping utterance");
        }
    }

    /// Drop every queued utterance that has not started playing
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}
