//! Pure state transition function

use super::state::{Message, Mode, PendingTurn, SessionSettings, Turn};
use super::{ConvContext, ConvState, Effect, Event};
use crate::mirror::{self, SOLILOQUY_SUBJECT};
use crate::session_log::{chat_record, soliloquy_record};
use thiserror::Error;

/// Prompt sent on every soliloquy cycle
pub const SOLILOQUY_PROMPT: &str =
    "은은하고 조용한 혼잣말을 한국어로 1~3문장 해줘. '예수님의 평화와 양의 문' 상징을 가볍게 담아.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("A reply is still being generated, try again when it arrives")]
    Busy,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs; all I/O is
/// described by the returned effects.
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::SettingsChanged { settings } => Ok(TransitionResult::new(ConvState {
            settings,
            ..state.clone()
        })
        .with_effect(Effect::PublishState)),

        // ============================================================
        // User submission
        // ============================================================
        Event::UserMessage { text, settings } => {
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            if state.is_working() {
                return Err(TransitionError::Busy);
            }

            let new_state = ConvState {
                pending: Some(PendingTurn {
                    turn: Turn::Chat {
                        user_text: text.clone(),
                    },
                    settings,
                }),
                settings,
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::request_generation(text, settings.options)))
        }

        // ============================================================
        // Soliloquy controls
        // ============================================================
        Event::StartSoliloquy => match state.mode {
            Mode::SoliloquyActive => Ok(TransitionResult::new(state.clone())),
            Mode::Idle => {
                let new_state = ConvState {
                    mode: Mode::SoliloquyActive,
                    soliloquy_epoch: state.soliloquy_epoch + 1,
                    ..state.clone()
                };

                // An in-flight soliloquy line schedules the next tick itself
                let tick = if state.soliloquy_pending() {
                    None
                } else {
                    next_tick(&new_state, context)
                };
                Ok(TransitionResult::new(new_state)
                    .with_effect(Effect::PublishState)
                    .with_effects(tick))
            }
        },

        Event::StopSoliloquy => match state.mode {
            Mode::Idle => Ok(TransitionResult::new(state.clone())),
            Mode::SoliloquyActive => Ok(TransitionResult::new(ConvState {
                mode: Mode::Idle,
                soliloquy_epoch: state.soliloquy_epoch + 1,
                ..state.clone()
            })
            .with_effect(Effect::CancelSoliloquy)
            .with_effect(Effect::PublishState)),
        },

        Event::SoliloquyTick { epoch } => {
            if state.mode == Mode::Idle || epoch != state.soliloquy_epoch {
                // Stale tick from a stopped or restarted cycle
                return Ok(TransitionResult::new(state.clone()));
            }
            if state.is_working() {
                // Wait for the chat reply, then try again
                return Ok(TransitionResult::new(state.clone())
                    .with_effects(next_tick(state, context)));
            }

            let settings = state.settings;
            Ok(TransitionResult::new(ConvState {
                pending: Some(PendingTurn {
                    turn: Turn::Soliloquy,
                    settings,
                }),
                ..state.clone()
            })
            .with_effect(Effect::PublishState)
            .with_effect(Effect::request_generation(SOLILOQUY_PROMPT, settings.options)))
        }

        // ============================================================
        // Generation results
        // ============================================================
        Event::GenerationComplete { text } => {
            let pending = take_pending(state, "GenerationComplete")?;
            let new_state = ConvState {
                pending: None,
                ..state.clone()
            };

            let effects = match pending.turn {
                Turn::Chat { user_text } => {
                    let answer = if pending.settings.mirror_enabled {
                        mirror::transform(mirror::subject_of(&user_text), &text)
                    } else {
                        text
                    };
                    let mut effects = vec![
                        Effect::write_log(chat_record(&user_text, &answer)),
                        Effect::append(Message::user(user_text)),
                        Effect::append(Message::assistant(answer.clone())),
                    ];
                    effects.extend(speak_if_enabled(&pending.settings, answer));
                    effects
                }
                Turn::Soliloquy => {
                    let answer = if pending.settings.mirror_enabled {
                        mirror::transform(SOLILOQUY_SUBJECT, &text)
                    } else {
                        text
                    };
                    let mut effects = vec![
                        Effect::write_log(soliloquy_record(&answer)),
                        Effect::append(Message::assistant(answer.clone())),
                    ];
                    effects.extend(speak_if_enabled(&pending.settings, answer));
                    effects.extend(next_tick(&new_state, context));
                    effects
                }
            };

            Ok(TransitionResult::new(new_state)
                .with_effects(effects)
                .with_effect(Effect::PublishState))
        }

        Event::GenerationFailed { message } => {
            let pending = take_pending(state, "GenerationFailed")?;
            let new_state = ConvState {
                pending: None,
                ..state.clone()
            };

            let mut result = TransitionResult::new(new_state.clone())
                .with_effect(Effect::notify_error(format!("Generation failed: {message}")));
            if pending.turn == Turn::Soliloquy {
                result = result.with_effects(next_tick(&new_state, context));
            }
            Ok(result.with_effect(Effect::PublishState))
        }
    }
}

fn take_pending(state: &ConvState, event: &str) -> Result<PendingTurn, TransitionError> {
    state
        .pending
        .clone()
        .ok_or_else(|| {
            TransitionError::InvalidTransition(format!("{event} with no generation in flight"))
        })
}

fn speak_if_enabled(settings: &SessionSettings, text: String) -> Option<Effect> {
    settings.tts_enabled.then(|| Effect::speak(text))
}

/// Keep the soliloquy cycle going while it is active
fn next_tick(state: &ConvState, context: &ConvContext) -> Option<Effect> {
    state.soliloquy_running().then_some(Effect::ScheduleSoliloquyTick {
        delay: context.soliloquy_delay,
        epoch: state.soliloquy_epoch,
    })
}
