//! Append-only per-session transcript on disk
//!
//! One plain-text file per session, named by the session start time.
//! Writes never fail from the caller's point of view.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Transcript writer owned by a single session runtime
pub struct SessionLog {
    path: PathBuf,
    file: Option<File>,
}

impl SessionLog {
    /// Prepare a log for a session started at `started_at`.
    ///
    /// Nothing is created until the first `append`.
    pub fn new(dir: &Path, started_at: DateTime<Local>) -> Self {
        let name = format!("session_{}.txt", started_at.format("%Y%m%d_%H%M%S"));
        Self {
            path: dir.join(name),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` plus a line terminator and flush.
    ///
    /// I/O failures are reported to tracing and otherwise dropped.
    pub fn append(&mut self, record: &str) {
        if let Err(e) = self.try_append(record) {
            tracing::warn!(path = %self.path.display(), error = %e, "Session log write failed");
        }
    }

    fn try_append(&mut self, record: &str) -> std::io::Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => self.open()?,
        };
        let file = self.file.insert(file);
        file.write_all(record.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()
    }

    fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

/// Record for a user turn and its answer
pub fn chat_record(user: &str, assistant: &str) -> String {
    format!("USER: {user}\nASSISTANT: {assistant}")
}

/// Record for an unprompted soliloquy turn
pub fn soliloquy_record(text: &str) -> String {
    format!("ASSISTANT(MONO): {text}")
}
