//! Session runtime executor

use super::traits::LlmClient;
use super::SseEvent;
use crate::narrator::Narrator;
use crate::session_log::SessionLog;
use crate::state_machine::{transition, ConvContext, ConvState, Effect, Event, Message};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Subscriber checks never run more often than this
const MIN_IDLE_CHECK: Duration = Duration::from_millis(5);

/// Channels and shared views a runtime is wired to
pub struct RuntimeChannels {
    pub event_rx: mpsc::Receiver<Event>,
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    pub state_tx: watch::Sender<ConvState>,
    pub history: Arc<RwLock<Vec<Message>>>,
    /// Cancelled when the session is closed
    pub shutdown: CancellationToken,
}

/// Generic session runtime that can work with any LLM implementation
pub struct SessionRuntime<L>
where
    L: LlmClient + 'static,
{
    context: ConvContext,
    state: ConvState,
    llm_client: Arc<L>,
    session_log: SessionLog,
    narrator: Arc<Narrator>,
    channels: RuntimeChannels,
    /// Token for the scheduled soliloquy tick, if any
    soliloquy_cancel: Option<CancellationToken>,
    /// Close the session after this long without SSE subscribers
    idle_timeout: Option<Duration>,
}

impl<L> SessionRuntime<L>
where
    L: LlmClient + 'static,
{
    pub fn new(
        context: ConvContext,
        llm_client: Arc<L>,
        session_log: SessionLog,
        narrator: Arc<Narrator>,
        channels: RuntimeChannels,
    ) -> Self {
        Self {
            context,
            state: ConvState::default(),
            llm_client,
            session_log,
            narrator,
            channels,
            soliloquy_cancel: None,
            idle_timeout: None,
        }
    }

    /// Shut down once nobody has been subscribed for `timeout`
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting session runtime");

        let idle_timeout = self.idle_timeout;
        let mut idle_check = tokio::time::interval(
            idle_timeout.map_or(Duration::from_secs(60), |t| (t / 2).max(MIN_IDLE_CHECK)),
        );
        let mut unwatched_since = None;

        // Process events in a loop, one at a time to completion
        loop {
            tokio::select! {
                biased;

                () = self.channels.shutdown.cancelled() => break,

                Some(event) = self.channels.event_rx.recv() => {
                    if let Err(e) = self.process_event(event).await {
                        tracing::warn!(
                            session_id = %self.context.session_id,
                            error = %e,
                            "Event rejected"
                        );
                        let _ = self.channels.broadcast_tx.send(SseEvent::Error { message: e });
                    }
                }

                _ = idle_check.tick(), if idle_timeout.is_some() => {
                    if let Some(timeout) = idle_timeout {
                        if self.unwatched_for(&mut unwatched_since, timeout) {
                            tracing::info!(
                                session_id = %self.context.session_id,
                                timeout_secs = timeout.as_secs(),
                                "No subscribers left, closing session"
                            );
                            // Abandons any generation still in flight
                            self.channels.shutdown.cancel();
                            break;
                        }
                    }
                }

                else => break,
            }
        }

        self.cancel_soliloquy();
        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) -> Result<(), String> {
        tracing::debug!(session_id = %self.context.session_id, event = ?event, "Processing event");

        // Pure state transition
        let result = transition(&self.state, &self.context, event).map_err(|e| e.to_string())?;

        self.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(effect).await;
        }

        Ok(())
    }

    /// Execute an effect
    async fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RequestGeneration { prompt, options } => {
                let llm_client = self.llm_client.clone();
                let event_tx = self.channels.event_tx.clone();
                let shutdown = self.channels.shutdown.clone();
                let session_id = self.context.session_id.clone();

                tokio::spawn(async move {
                    tracing::info!(session_id = %session_id, "Requesting generation (background)");

                    tokio::select! {
                        biased;

                        () = shutdown.cancelled() => {
                            tracing::info!(
                                session_id = %session_id,
                                "Generation abandoned, session closed"
                            );
                        }

                        result = llm_client.generate(&prompt, &options) => {
                            let event = match result {
                                Ok(text) => Event::GenerationComplete { text },
                                Err(e) => Event::GenerationFailed { message: e.message },
                            };
                            let _ = event_tx.send(event).await;
                        }
                    }
                });
            }

            Effect::AppendMessage { message } => {
                self.channels.history.write().await.push(message.clone());
                let msg_json = serde_json::to_value(&message).unwrap_or(Value::Null);
                let _ = self
                    .channels
                    .broadcast_tx
                    .send(SseEvent::Message { message: msg_json });
            }

            Effect::WriteLog { record } => {
                self.session_log.append(&record);
            }

            Effect::Speak { text } => {
                self.narrator.speak(&text);
            }

            Effect::ScheduleSoliloquyTick { delay, epoch } => {
                let shutdown = &self.channels.shutdown;
                let token = self
                    .soliloquy_cancel
                    .get_or_insert_with(|| shutdown.child_token())
                    .clone();
                let event_tx = self.channels.event_tx.clone();

                tokio::spawn(async move {
                    tokio::select! {
                        biased;

                        () = token.cancelled() => {}

                        () = tokio::time::sleep(delay) => {
                            let _ = event_tx.send(Event::SoliloquyTick { epoch }).await;
                        }
                    }
                });
            }

            Effect::CancelSoliloquy => {
                self.cancel_soliloquy();
            }

            Effect::PublishState => {
                self.channels.state_tx.send_replace(self.state.clone());
                let state_json = serde_json::to_value(&self.state).unwrap_or(Value::Null);
                let _ = self
                    .channels
                    .broadcast_tx
                    .send(SseEvent::StateChange { state: state_json });
            }

            Effect::NotifyError { message } => {
                let _ = self.channels.broadcast_tx.send(SseEvent::Error { message });
            }
        }
    }

    /// Whether the session has had no subscribers for at least `timeout`
    fn unwatched_for(&self, since: &mut Option<Instant>, timeout: Duration) -> bool {
        if self.channels.broadcast_tx.receiver_count() > 0 {
            *since = None;
            return false;
        }
        since.get_or_insert_with(Instant::now).elapsed() >= timeout
    }

    fn cancel_soliloquy(&mut self) {
        if let Some(token) = self.soliloquy_cancel.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::mirror;
    use crate::runtime::testing::{MockLlmClient, RecordingSpeechEngine};
    use crate::state_machine::transition::SOLILOQUY_PROMPT;
    use crate::state_machine::{Mode, Role, SessionSettings};
    use chrono::Local;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        event_tx: mpsc::Sender<Event>,
        broadcast_rx: broadcast::Receiver<SseEvent>,
        state_rx: watch::Receiver<ConvState>,
        history: Arc<RwLock<Vec<Message>>>,
        shutdown: CancellationToken,
        log_path: PathBuf,
    }

    impl Harness {
        async fn send(&self, event: Event) {
            self.event_tx.send(event).await.unwrap();
        }

        /// Wait for the next `message` broadcast
        async fn next_message(&mut self) -> Value {
            tokio::time::timeout(WAIT, async {
                loop {
                    if let SseEvent::Message { message } = self.broadcast_rx.recv().await.unwrap() {
                        return message;
                    }
                }
            })
            .await
            .expect("timed out waiting for message")
        }

        /// Wait for the next `error` broadcast
        async fn next_error(&mut self) -> String {
            tokio::time::timeout(WAIT, async {
                loop {
                    if let SseEvent::Error { message } = self.broadcast_rx.recv().await.unwrap() {
                        return message;
                    }
                }
            })
            .await
            .expect("timed out waiting for error")
        }

        async fn wait_until(&mut self, f: impl Fn(&ConvState) -> bool) {
            tokio::time::timeout(WAIT, self.state_rx.wait_for(|s| f(s)))
                .await
                .expect("timed out waiting for state")
                .unwrap();
        }

        async fn history(&self) -> Vec<Message> {
            self.history.read().await.clone()
        }

        fn log(&self) -> String {
            std::fs::read_to_string(&self.log_path).unwrap_or_default()
        }
    }

    fn spawn_runtime(
        llm: Arc<MockLlmClient>,
        narrator: Arc<Narrator>,
        log_dir: &Path,
        delay: Duration,
    ) -> Harness {
        build_runtime(llm, narrator, log_dir, delay, None)
    }

    fn spawn_runtime_with(
        llm: Arc<MockLlmClient>,
        log_dir: &Path,
        delay: Duration,
        idle_timeout: Option<Duration>,
    ) -> Harness {
        build_runtime(llm, Arc::new(Narrator::disabled()), log_dir, delay, idle_timeout)
    }

    fn build_runtime(
        llm: Arc<MockLlmClient>,
        narrator: Arc<Narrator>,
        log_dir: &Path,
        delay: Duration,
        idle_timeout: Option<Duration>,
    ) -> Harness {
        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(128);
        let (state_tx, state_rx) = watch::channel(ConvState::default());
        let history = Arc::new(RwLock::new(Vec::new()));
        let shutdown = CancellationToken::new();
        let session_log = SessionLog::new(log_dir, Local::now());
        let log_path = session_log.path().to_path_buf();

        let mut runtime = SessionRuntime::new(
            ConvContext::new("test-session", delay),
            llm,
            session_log,
            narrator,
            RuntimeChannels {
                event_rx,
                event_tx: event_tx.clone(),
                broadcast_tx,
                state_tx,
                history: history.clone(),
                shutdown: shutdown.clone(),
            },
        );
        if let Some(timeout) = idle_timeout {
            runtime = runtime.with_idle_timeout(timeout);
        }
        tokio::spawn(runtime.run());

        Harness {
            event_tx,
            broadcast_rx,
            state_rx,
            history,
            shutdown,
            log_path,
        }
    }

    fn mirror_on() -> SessionSettings {
        SessionSettings {
            mirror_enabled: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_chat_turn_with_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response("고요함");
        let mut h = spawn_runtime(
            llm.clone(),
            Arc::new(Narrator::disabled()),
            dir.path(),
            Duration::from_secs(2),
        );

        h.send(Event::UserMessage {
            text: "물 이야기해줘".to_string(),
            settings: mirror_on(),
        })
        .await;

        h.next_message().await;
        let assistant = h.next_message().await;
        let expected = mirror::transform("물", "고요함");
        assert_eq!(assistant["text"], expected.as_str());

        assert_eq!(
            h.history().await,
            vec![Message::user("물 이야기해줘"), Message::assistant(expected.clone())]
        );
        assert_eq!(h.log(), format!("USER: 물 이야기해줘\nASSISTANT: {expected}\n"));
        assert_eq!(llm.recorded_requests()[0].0, "물 이야기해줘");
    }

    #[tokio::test]
    async fn test_soliloquy_turn_logged_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response("평화의 속삭임");
        let mut h = spawn_runtime(
            llm.clone(),
            Arc::new(Narrator::disabled()),
            dir.path(),
            Duration::from_millis(10),
        );

        h.send(Event::StartSoliloquy).await;
        let message = h.next_message().await;
        h.send(Event::StopSoliloquy).await;
        h.wait_until(|s| s.mode == Mode::Idle && !s.is_working()).await;

        assert_eq!(message["role"], "assistant");
        assert_eq!(message["text"], "평화의 속삭임");
        assert_eq!(h.history().await, vec![Message::assistant("평화의 속삭임")]);
        assert_eq!(h.log(), "ASSISTANT(MONO): 평화의 속삭임\n");
        assert_eq!(llm.recorded_requests()[0].0, SOLILOQUY_PROMPT);
    }

    #[tokio::test]
    async fn test_soliloquy_repeats_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        for line in ["하나", "둘", "셋"] {
            llm.queue_response(line);
        }
        let mut h = spawn_runtime(
            llm.clone(),
            Arc::new(Narrator::disabled()),
            dir.path(),
            Duration::from_millis(5),
        );

        h.send(Event::StartSoliloquy).await;
        h.next_message().await;
        h.next_message().await;
        h.send(Event::StopSoliloquy).await;
        h.wait_until(|s| s.mode == Mode::Idle && !s.is_working()).await;

        let after_stop = llm.recorded_requests().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(llm.recorded_requests().len(), after_stop);

        let history = h.history().await;
        assert!(history.len() >= 2);
        assert!(history.iter().all(|m| m.role == Role::Assistant));
    }

    #[tokio::test]
    async fn test_generation_failure_is_inline_and_session_continues() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_error(LlmError::network("Connection failed: refused"));
        llm.queue_response("두 번째는 성공");
        let mut h = spawn_runtime(
            llm,
            Arc::new(Narrator::disabled()),
            dir.path(),
            Duration::from_secs(2),
        );

        h.send(Event::UserMessage {
            text: "불".to_string(),
            settings: SessionSettings::default(),
        })
        .await;
        let error = h.next_error().await;
        assert!(error.contains("Connection failed"));
        h.wait_until(|s| !s.is_working()).await;
        assert!(h.history().await.is_empty());

        h.send(Event::UserMessage {
            text: "불".to_string(),
            settings: SessionSettings::default(),
        })
        .await;
        h.next_message().await;
        h.next_message().await;
        assert_eq!(h.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_log_failure_does_not_block_history() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response("바람이 분다");
        let mut h = spawn_runtime(
            llm,
            Arc::new(Narrator::disabled()),
            &blocker.join("logs"),
            Duration::from_secs(2),
        );

        h.send(Event::UserMessage {
            text: "바람".to_string(),
            settings: SessionSettings::default(),
        })
        .await;
        h.next_message().await;
        h.next_message().await;

        assert_eq!(
            h.history().await,
            vec![Message::user("바람"), Message::assistant("바람이 분다")]
        );
        assert!(!h.log_path.exists());
    }

    #[tokio::test]
    async fn test_reply_spoken_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        llm.queue_response("들리나요");
        let engine = Arc::new(RecordingSpeechEngine::new());
        let narrator = Arc::new(Narrator::spawn(engine.clone()));
        let mut h = spawn_runtime(llm, narrator, dir.path(), Duration::from_secs(2));

        h.send(Event::UserMessage {
            text: "흙".to_string(),
            settings: SessionSettings {
                tts_enabled: true,
                ..Default::default()
            },
        })
        .await;
        h.next_message().await;
        h.next_message().await;

        engine.wait_for(1).await;
        assert_eq!(engine.spoken(), vec!["들리나요"]);
    }

    #[tokio::test]
    async fn test_busy_rejection_reported() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::with_delay(Duration::from_millis(100)));
        llm.queue_response("느린 대답");
        let mut h = spawn_runtime(
            llm,
            Arc::new(Narrator::disabled()),
            dir.path(),
            Duration::from_secs(2),
        );

        let settings = SessionSettings::default();
        h.send(Event::UserMessage {
            text: "첫째".to_string(),
            settings,
        })
        .await;
        h.send(Event::UserMessage {
            text: "둘째".to_string(),
            settings,
        })
        .await;

        let error = h.next_error().await;
        assert!(error.contains("still being generated"));
    }

    #[tokio::test]
    async fn test_tick_queued_behind_restart_does_not_fork_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::with_delay(Duration::from_millis(30)));
        let mut h = spawn_runtime(
            llm.clone(),
            Arc::new(Narrator::disabled()),
            dir.path(),
            Duration::from_millis(100),
        );

        h.send(Event::StartSoliloquy).await;
        h.send(Event::StopSoliloquy).await;
        h.send(Event::StartSoliloquy).await;
        // The first cycle's timer fired before the stop was processed
        h.send(Event::SoliloquyTick { epoch: 1 }).await;
        h.wait_until(|s| s.soliloquy_epoch == 3).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(
            llm.recorded_requests().is_empty(),
            "stale tick started a generation"
        );

        // The live cycle still runs on its own schedule
        h.next_error().await;
        assert_eq!(llm.recorded_requests().len(), 1);
        h.send(Event::StopSoliloquy).await;
    }

    #[tokio::test]
    async fn test_unwatched_session_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        let h = spawn_runtime_with(
            llm.clone(),
            dir.path(),
            Duration::from_millis(10),
            Some(Duration::from_millis(50)),
        );

        h.send(Event::StartSoliloquy).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!h.shutdown.is_cancelled(), "watched session closed");
        assert!(!llm.recorded_requests().is_empty());

        let Harness {
            broadcast_rx,
            shutdown,
            ..
        } = h;
        drop(broadcast_rx);
        tokio::time::timeout(WAIT, shutdown.cancelled())
            .await
            .expect("session kept running without subscribers");

        let after_close = llm.recorded_requests().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(llm.recorded_requests().len(), after_close);
    }

    #[tokio::test]
    async fn test_shutdown_stops_soliloquy() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        let h = spawn_runtime(
            llm.clone(),
            Arc::new(Narrator::disabled()),
            dir.path(),
            Duration::from_millis(20),
        );

        h.send(Event::StartSoliloquy).await;
        h.shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(llm.recorded_requests().is_empty());
    }
}
