//! Core types and structures for ptyshell
//!
//! This crate provides the data model shared by the shell-session crates:
//! sessions, history records, jobs, suggestions and the output event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

mod error;

pub use error::{CancelError, SpawnError, TerminalIoError};

// ============================================================================
// Constants
// ============================================================================

/// Default terminal height when the caller does not supply one
pub const DEFAULT_ROWS: u16 = 24;

/// Default terminal width when the caller does not supply one
pub const DEFAULT_COLS: u16 = 80;

/// Maximum number of concurrently live PTY sessions
pub const MAX_CONCURRENT_SESSIONS: usize = 15;

/// Number of records returned by an empty-query history search
pub const RECENT_HISTORY_LIMIT: usize = 20;

/// Maximum number of records returned by a fuzzy history search
pub const SEARCH_RESULT_LIMIT: usize = 50;

/// Single-token lines longer than this are treated as possible secrets
pub const SUSPICIOUS_INPUT_LENGTH: usize = 50;

/// Number of suggestions shown before the remainder is only counted
pub const MAX_VISIBLE_SUGGESTIONS: usize = 10;

// ============================================================================
// Session Types
// ============================================================================

/// Opaque identifier of one spawned pseudo-terminal process.
///
/// A new handle is minted on every spawn; a restarted session never reuses
/// the handle of its previous process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PtyHandle(pub u64);

impl fmt::Display for PtyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pty-{}", self.0)
    }
}

/// Terminal geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub rows: u16,
    pub cols: u16,
}

impl Dimensions {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

/// Whether the shell is idle at its prompt or running a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptState {
    #[default]
    AtPrompt,
    Executing,
}

/// One PTY-backed shell session as seen by the console surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Caller-assigned identifier
    pub session_id: String,
    /// Handle of the live process, `None` before the first spawn or after a failed one
    pub pty_handle: Option<PtyHandle>,
    pub working_directory: PathBuf,
    pub dimensions: Dimensions,
    pub prompt_state: PromptState,
    /// Set once the process has exited and the next Enter would respawn it
    pub restartable: bool,
}

impl Session {
    pub fn new(session_id: impl Into<String>, working_directory: PathBuf, dimensions: Dimensions) -> Self {
        Self {
            session_id: session_id.into(),
            pty_handle: None,
            working_directory,
            dimensions,
            prompt_state: PromptState::AtPrompt,
            restartable: false,
        }
    }
}

/// Event delivered by a PTY output stream.
///
/// A stream yields any number of `Data` chunks, in the order the process
/// produced them, followed by exactly one `Exit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Data(Vec<u8>),
    Exit(i32),
}

// ============================================================================
// History Types
// ============================================================================

/// One committed command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// First whitespace-delimited token of the line
    pub command: String,
    /// Remaining tokens, in order
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "cwd")]
    pub working_directory: PathBuf,
}

impl HistoryRecord {
    /// Split a command line into a record. Returns `None` for blank lines.
    pub fn from_line(line: &str, working_directory: PathBuf, timestamp: DateTime<Utc>) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let command = parts.next()?.to_string();
        let args = parts.map(str::to_string).collect();
        Some(Self {
            command,
            args,
            timestamp,
            working_directory,
        })
    }

    /// The command line as it is matched and suggested
    pub fn line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// How a recorded command ended, when that is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    /// Commands typed into a live PTY; the engine cannot observe their exit status
    #[default]
    Unknown,
    Succeeded,
    Failed,
}

/// Per-command usage statistics aggregated by a history store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStats {
    pub command: String,
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_used: DateTime<Utc>,
    pub last_args: Vec<String>,
}

// ============================================================================
// Suggestion Types
// ============================================================================

/// Where a suggestion came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    History,
    System,
}

/// One completion candidate for the current partial input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub source: SuggestionSource,
}

impl Suggestion {
    pub fn history(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: SuggestionSource::History,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: SuggestionSource::System,
        }
    }
}

/// Ranked suggestions with the overflow counted rather than listed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuggestionList {
    pub visible: Vec<Suggestion>,
    pub hidden_count: usize,
}

impl SuggestionList {
    /// Cap an ordered candidate list to `max_visible` entries
    pub fn from_ranked(mut ranked: Vec<Suggestion>, max_visible: usize) -> Self {
        let hidden_count = ranked.len().saturating_sub(max_visible);
        ranked.truncate(max_visible);
        Self {
            visible: ranked,
            hidden_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn total(&self) -> usize {
        self.visible.len() + self.hidden_count
    }
}

// ============================================================================
// Job Types
// ============================================================================

/// Unique identifier of a background job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a job. Everything except `Running` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One backgrounded command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub args: Vec<String>,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl Job {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: JobId::new(),
            command: command.into(),
            args,
            status: JobStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            exit_code: None,
        }
    }

    /// Record a normal process exit. Zero is `Completed`, anything else `Failed`.
    ///
    /// Returns `false` without touching the job if it already left `Running`.
    pub fn finish_exited(&mut self, exit_code: i32) -> bool {
        let status = if exit_code == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.transition(status, Some(exit_code))
    }

    /// Record a confirmed cancellation. Cancelled jobs carry no exit code.
    pub fn finish_cancelled(&mut self) -> bool {
        self.transition(JobStatus::Cancelled, None)
    }

    fn transition(&mut self, status: JobStatus, exit_code: Option<i32>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.exit_code = exit_code;
        self.end_time = Some(Utc::now());
        true
    }

    /// Command line the job was started with
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

// ============================================================================
// Execution Types
// ============================================================================

/// Result of a one-shot command run outside the PTY
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecuteResult {
    /// The command ran to completion with a zero exit status
    Success { output: String, exit_code: i32 },
    /// The command could not be started or exited non-zero
    Failure { error: String, exit_code: Option<i32> },
    /// The line carried a background marker and was handed to the job controller
    Backgrounded { job_id: JobId },
}

impl ExecuteResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, ExecuteResult::Failure { .. })
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            ExecuteResult::Backgrounded { job_id } => Some(job_id),
            _ => None,
        }
    }
}
