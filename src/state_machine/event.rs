//! Events that can occur in a session

use super::state::SessionSettings;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // UI events
    SettingsChanged {
        settings: SessionSettings,
    },
    UserMessage {
        text: String,
        settings: SessionSettings,
    },
    StartSoliloquy,
    StopSoliloquy,

    // Timer events
    SoliloquyTick {
        epoch: u64,
    },

    // Generation events
    GenerationComplete {
        text: String,
    },
    GenerationFailed {
        message: String,
    },
}
