// Terminal session management
//
// Pseudo-terminal processes behind a pluggable backend, idle-prompt detection
// from their output, JSON-lines transcripts, and the console-side session
// controller that ties keystrokes, history and restarts together.

pub mod backend;
mod logger;
mod manager;
mod prompt;
mod pty_backend;
mod pty_handler;
mod session;
mod stream;

// Re-export public API
pub use backend::{SessionInfo, SpawnRequest, TerminalBackend};
pub use logger::TranscriptLogger;
pub use manager::TerminalManager;
pub use prompt::PromptTracker;
pub use pty_backend::PtyBackend;
pub use session::{InputOutcome, InputSnapshot, SessionOptions, ShellSession};
pub use stream::OutputStream;
