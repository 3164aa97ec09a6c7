//! Effects produced by state transitions

use super::state::Message;
use crate::llm::GenerationOptions;
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Call the model (spawns as background task)
    RequestGeneration {
        prompt: String,
        options: GenerationOptions,
    },

    /// Append a message to the session history
    AppendMessage { message: Message },

    /// Append a record to the session log file
    WriteLog { record: String },

    /// Queue text for speech playback
    Speak { text: String },

    /// Fire a `SoliloquyTick` carrying `epoch` after `delay`
    ScheduleSoliloquyTick { delay: Duration, epoch: u64 },

    /// Cancel any scheduled soliloquy tick
    CancelSoliloquy,

    /// Broadcast the new state to connected clients
    PublishState,

    /// Show an inline error to connected clients
    NotifyError { message: String },
}

impl Effect {
    pub fn request_generation(prompt: impl Into<String>, options: GenerationOptions) -> Self {
        Effect::RequestGeneration {
            prompt: prompt.into(),
            options,
        }
    }

    pub fn append(message: Message) -> Self {
        Effect::AppendMessage { message }
    }

    pub fn write_log(record: impl Into<String>) -> Self {
        Effect::WriteLog {
            record: record.into(),
        }
    }

    pub fn speak(text: impl Into<String>) -> Self {
        Effect::Speak { text: text.into() }
    }

    pub fn notify_error(message: impl Into<String>) -> Self {
        Effect::NotifyError {
            message: message.into(),
        }
    }
}
