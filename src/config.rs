//! Server configuration from the environment

use crate::state_machine::state::DEFAULT_SOLILOQUY_DELAY;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Voice playback settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechConfig {
    /// `false` when `MIRROR_CHAT_TTS=off`
    pub enabled: bool,
    /// Voice binary to use instead of auto-detection
    pub command: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub log_dir: PathBuf,
    pub soliloquy_delay: Duration,
    /// How long a session may go without an open event stream
    pub idle_timeout: Duration,
    pub speech: SpeechConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            soliloquy_delay: DEFAULT_SOLILOQUY_DELAY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            speech: SpeechConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or unparsable values
    /// fall back to defaults
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: var("MIRROR_CHAT_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_dir: var("MIRROR_CHAT_LOG_DIR")
                .filter(|d| !d.is_empty())
                .map_or(defaults.log_dir, PathBuf::from),
            soliloquy_delay: var("MIRROR_CHAT_SOLILOQUY_DELAY_MS")
                .and_then(|ms| ms.parse().ok())
                .map_or(defaults.soliloquy_delay, Duration::from_millis),
            idle_timeout: var("MIRROR_CHAT_IDLE_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .map_or(defaults.idle_timeout, Duration::from_secs),
            speech: SpeechConfig {
                enabled: !var("MIRROR_CHAT_TTS").is_some_and(|v| v.eq_ignore_ascii_case("off")),
                command: var("MIRROR_CHAT_TTS_COMMAND").filter(|c| !c.is_empty()),
            },
        }
    }
}
