/// Terminal backend abstraction so the manager can run on a real PTY or a fake
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ptyshell_types::{Dimensions, PtyHandle, SpawnError, TerminalIoError};
use std::path::PathBuf;

use crate::stream::OutputStream;

/// Everything needed to (re)launch a process under a pseudo-terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment on top of the inherited one
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
    pub dimensions: Dimensions,
}

impl SpawnRequest {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: cwd.into(),
            dimensions: Dimensions::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Command and arguments as one display string
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Terminal session metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub handle: PtyHandle,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub dimensions: Dimensions,
    pub created_at: DateTime<Utc>,
    /// False once the process has exited, even before `close`
    pub alive: bool,
}

/// Owner of pseudo-terminal processes.
///
/// Handles are never reused. A handle whose process has exited stays listed
/// until `close` is called, but rejects writes and resizes as stale.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Launch a process attached to a new pseudo-terminal
    async fn spawn(&self, request: &SpawnRequest) -> Result<PtyHandle, SpawnError>;

    /// Queue bytes for the process's input without waiting for the write
    async fn write(&self, handle: PtyHandle, bytes: &[u8]) -> Result<(), TerminalIoError>;

    async fn resize(&self, handle: PtyHandle, dimensions: Dimensions) -> Result<(), TerminalIoError>;

    /// Take the output stream of a handle. Only one subscriber is allowed.
    fn subscribe(&self, handle: PtyHandle) -> Result<OutputStream, TerminalIoError>;

    /// Terminate the process and release the pty. Idempotent.
    async fn close(&self, handle: PtyHandle);

    fn list_sessions(&self) -> Vec<SessionInfo>;

    fn session_count(&self) -> usize {
        self.list_sessions().len()
    }

    /// Get backend name for debugging
    fn backend_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spawn_request_builder() {
        let request = SpawnRequest::new("bash", "/tmp")
            .with_args(["-l", "-i"])
            .with_env("TERM", "xterm-256color")
            .with_dimensions(Dimensions::new(40, 120));

        assert_eq!(request.command_line(), "bash -l -i");
        assert_eq!(request.env, vec![("TERM".to_string(), "xterm-256color".to_string())]);
        assert_eq!(request.dimensions, Dimensions::new(40, 120));
        assert_eq!(request.cwd, PathBuf::from("/tmp"));
    }
}
