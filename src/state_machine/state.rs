//! Session state types

use crate::llm::GenerationOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default pause before each soliloquy generation
pub const DEFAULT_SOLILOQUY_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// Messages
// ============================================================================

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the session history; never mutated once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Values of the sidebar controls
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub options: GenerationOptions,
    pub mirror_enabled: bool,
    pub tts_enabled: bool,
}

// ============================================================================
// Session State
// ============================================================================

/// Soliloquy mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Idle,
    SoliloquyActive,
}

/// What an in-flight generation is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    /// Answer to a user submission
    Chat { user_text: String },
    /// Unprompted soliloquy line
    Soliloquy,
}

/// A generation in flight, with the settings captured when it was requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTurn {
    pub turn: Turn,
    pub settings: SessionSettings,
}

/// Per-session state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConvState {
    pub mode: Mode,
    pub pending: Option<PendingTurn>,
    pub settings: SessionSettings,
    /// Bumped on every start and stop; ticks from other epochs are stale
    pub soliloquy_epoch: u64,
}

impl ConvState {
    pub fn soliloquy_running(&self) -> bool {
        self.mode == Mode::SoliloquyActive
    }

    /// Check if a generation is in flight
    pub fn is_working(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn soliloquy_pending(&self) -> bool {
        matches!(
            self.pending,
            Some(PendingTurn {
                turn: Turn::Soliloquy,
                ..
            })
        )
    }
}

/// Context for a session (immutable configuration)
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub session_id: String,
    pub soliloquy_delay: Duration,
}

impl ConvContext {
    pub fn new(session_id: impl Into<String>, soliloquy_delay: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            soliloquy_delay,
        }
    }
}
