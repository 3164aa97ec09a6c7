//! Runtime for executing sessions
//!
//! Each session is owned by one runtime task. Callers talk to it through
//! its event queue and observe it through the broadcast channel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{RuntimeChannels, SessionRuntime};
pub use traits::*;

use crate::narrator::Narrator;
use crate::session_log::SessionLog;
use crate::state_machine::{ConvContext, ConvState, Event, Message};
use chrono::Local;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio_util::sync::CancellationToken;

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = SessionRuntime<Arc<dyn LlmClient>>;

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        messages: Vec<serde_json::Value>,
        state: serde_json::Value,
        log_file: String,
    },
    Message {
        message: serde_json::Value,
    },
    StateChange {
        state: serde_json::Value,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session {0} is closed")]
    Closed(String),
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    history: Arc<RwLock<Vec<Message>>>,
    state_rx: watch::Receiver<ConvState>,
    shutdown: CancellationToken,
    log_path: PathBuf,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub state: ConvState,
    pub log_file: String,
}

impl SessionHandle {
    pub async fn snapshot(&self) -> SessionSnapshot {
        let messages = self.history.read().await.clone();
        let state = self.state_rx.borrow().clone();
        SessionSnapshot {
            messages,
            state,
            log_file: self.log_path.display().to_string(),
        }
    }
}

/// Manager for all session runtimes
pub struct RuntimeManager {
    llm_client: Arc<dyn LlmClient>,
    narrator: Arc<Narrator>,
    log_dir: PathBuf,
    soliloquy_delay: Duration,
    /// Sessions with no SSE subscriber for this long are closed
    idle_timeout: Duration,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl RuntimeManager {
    pub fn new(
        llm_client: Arc<dyn LlmClient>,
        narrator: Arc<Narrator>,
        log_dir: impl Into<PathBuf>,
        soliloquy_delay: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            llm_client,
            narrator,
            log_dir: log_dir.into(),
            soliloquy_delay,
            idle_timeout,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a new session with empty history and a fresh log file
    pub async fn create_session(&self) -> (String, SessionSnapshot) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let context = ConvContext::new(&session_id, self.soliloquy_delay);
        let session_log = SessionLog::new(&self.log_dir, Local::now());
        let log_path = session_log.path().to_path_buf();

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let (state_tx, state_rx) = watch::channel(ConvState::default());
        let history = Arc::new(RwLock::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let runtime: ProductionRuntime = SessionRuntime::new(
            context,
            Arc::new(self.llm_client.clone()),
            session_log,
            self.narrator.clone(),
            RuntimeChannels {
                event_rx,
                event_tx: event_tx.clone(),
                broadcast_tx: broadcast_tx.clone(),
                state_tx,
                history: history.clone(),
                shutdown: shutdown.clone(),
            },
        )
        .with_idle_timeout(self.idle_timeout);

        let id = session_id.clone();
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            runtime.run().await;
            sessions.write().await.remove(&id);
            tracing::info!(session_id = %id, "Session runtime finished");
        });

        let handle = SessionHandle {
            event_tx,
            broadcast_tx,
            history,
            state_rx,
            shutdown,
            log_path,
        };
        let snapshot = handle.snapshot().await;

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), handle);

        tracing::info!(session_id = %session_id, log_file = %snapshot.log_file, "Session created");
        (session_id, snapshot)
    }

    async fn handle(&self, session_id: &str) -> Result<SessionHandle, RuntimeError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.to_string()))
    }

    /// Send an event to a session
    pub async fn send_event(&self, session_id: &str, event: Event) -> Result<(), RuntimeError> {
        let handle = self.handle(session_id).await?;
        handle
            .event_tx
            .send(event)
            .await
            .map_err(|_| RuntimeError::Closed(session_id.to_string()))
    }

    /// Subscribe to a session's updates.
    ///
    /// The snapshot is taken after subscribing, so nothing published in
    /// between is missed.
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(broadcast::Receiver<SseEvent>, SessionSnapshot), RuntimeError> {
        let handle = self.handle(session_id).await?;
        let rx = handle.broadcast_tx.subscribe();
        Ok((rx, handle.snapshot().await))
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, RuntimeError> {
        Ok(self.handle(session_id).await?.snapshot().await)
    }

    /// Stop a session's runtime and forget it
    pub async fn close_session(&self, session_id: &str) -> Result<(), RuntimeError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.to_string()))?;
        handle.shutdown.cancel();
        tracing::info!(session_id = %session_id, "Session closed");
        Ok(())
    }

    pub fn narrator(&self) -> &Arc<Narrator> {
        &self.narrator
    }

    pub fn model_id(&self) -> &str {
        self.llm_client.model_id()
    }
}
