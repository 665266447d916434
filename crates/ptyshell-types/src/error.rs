use std::path::PathBuf;
use thiserror::Error;

use crate::{JobId, JobStatus, PtyHandle};

/// Failure to start a process under a pseudo-terminal
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("working directory does not exist: {0}")]
    WorkingDirectory(PathBuf),
    #[error("failed to allocate pseudo-terminal: {0}")]
    PtyAllocation(String),
    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },
    #[error("maximum concurrent sessions ({0}) reached")]
    SessionLimit(usize),
}

/// Failure to talk to an existing pseudo-terminal.
///
/// These are expected while a session is exiting or restarting and are
/// logged rather than shown to the user.
#[derive(Debug, Error)]
pub enum TerminalIoError {
    #[error("{0} is not a live session")]
    StaleHandle(PtyHandle),
    #[error("output of {0} already has a subscriber")]
    AlreadySubscribed(PtyHandle),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to cancel a background job
#[derive(Debug, Error)]
pub enum CancelError {
    #[error("no job with id {0}")]
    NotFound(JobId),
    #[error("job {id} already {status}")]
    AlreadyTerminal { id: JobId, status: JobStatus },
}
