//! Speech through a platform voice binary
//!
//! Supports `espeak-ng`, `espeak` and macOS `say`. All three default to
//! 175 words per minute; playback runs at 90% of that.

use super::{SpeechEngine, SpeechError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

const DEFAULT_WORDS_PER_MINUTE: u32 = 175;
const RATE_PERCENT: u32 = 90;

/// Candidate binaries, in preference order
const CANDIDATES: &[&str] = &["espeak-ng", "espeak", "say"];

/// Speech engine backed by an external voice command
#[derive(Debug)]
pub struct CommandSpeechEngine {
    program: PathBuf,
    name: String,
    words_per_minute: u32,
}

impl CommandSpeechEngine {
    /// Locate the first available voice binary on `PATH`
    pub fn detect() -> Result<Self, SpeechError> {
        CANDIDATES
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
            .map(Self::new)
            .ok_or_else(|| {
                SpeechError::Init(format!("none of {} found on PATH", CANDIDATES.join(", ")))
            })
    }

    /// Use a specific binary (name on `PATH` or an explicit path)
    pub fn from_command(command: &str) -> Result<Self, SpeechError> {
        which::which(command)
            .map(Self::new)
            .map_err(|e| SpeechError::Init(format!("{command}: {e}")))
    }

    fn new(program: PathBuf) -> Self {
        let name = program
            .file_name()
            .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            program,
            name,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE * RATE_PERCENT / 100,
        }
    }

    /// Arguments for one utterance; every supported binary takes the rate
    /// as a flag followed by the text
    fn args(&self, text: &str) -> Vec<String> {
        let rate_flag = if self.name == "say" { "-r" } else { "-s" };
        vec![
            rate_flag.to_string(),
            self.words_per_minute.to_string(),
            "--".to_string(),
            text.to_string(),
        ]
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    async fn say(&self, text: &str) -> Result<(), SpeechError> {
        let output = Command::new(&self.program)
            .args(self.args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SpeechError::Playback(format!("failed to spawn {}: {e}", self.name)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SpeechError::Playback(format!(
                "{} exited with {}: {}",
                self.name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
