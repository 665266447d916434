use anyhow::{Context, Result};
use chrono::Utc;
use ptyshell_types::{Dimensions, PtyHandle};
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// JSON-lines transcript of one console session's PTY traffic
pub struct TranscriptLogger {
    session_id: String,
    path: PathBuf,
    log_file: File,
}

impl std::fmt::Debug for TranscriptLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptLogger")
            .field("session_id", &self.session_id)
            .field("path", &self.path)
            .finish()
    }
}

impl TranscriptLogger {
    /// Open (appending) `session-<id>.log` under `log_dir`
    pub fn new(session_id: &str, log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir).context("Failed to create transcript directory")?;

        let path = log_dir.join(format!("session-{}.log", sanitize(session_id)));
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open transcript {}", path.display()))?;

        Ok(Self {
            session_id: session_id.to_string(),
            path,
            log_file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log input to PTY
    pub fn log_input(&mut self, data: &[u8]) -> Result<()> {
        self.log_data("in", data)
    }

    /// Log output from PTY
    pub fn log_output(&mut self, data: &[u8]) -> Result<()> {
        self.log_data("out", data)
    }

    pub fn log_spawn(&mut self, handle: PtyHandle, command_line: &str) -> Result<()> {
        self.write_entry(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": self.session_id,
            "event": "spawn",
            "handle": handle.to_string(),
            "command": command_line,
        }))
    }

    pub fn log_resize(&mut self, dimensions: Dimensions) -> Result<()> {
        self.write_entry(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": self.session_id,
            "event": "resize",
            "cols": dimensions.cols,
            "rows": dimensions.rows,
        }))
    }

    pub fn log_exit(&mut self, code: i32) -> Result<()> {
        self.write_entry(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": self.session_id,
            "event": "exit",
            "code": code,
        }))
    }

    fn log_data(&mut self, direction: &str, data: &[u8]) -> Result<()> {
        self.write_entry(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "session_id": self.session_id,
            "direction": direction,
            "data": String::from_utf8_lossy(data),
        }))
    }

    fn write_entry(&mut self, entry: serde_json::Value) -> Result<()> {
        writeln!(self.log_file, "{}", entry).context("Failed to write to transcript")?;
        self.log_file.flush()?;
        Ok(())
    }
}

/// Keep caller-assigned ids from escaping the log directory
fn sanitize(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
