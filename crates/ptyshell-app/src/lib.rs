//! ptyshell application library
//!
//! Configuration, logging setup, the command-line interface, and the
//! console driver that ties the terminal, history and job crates together.

// Re-export workspace crates
pub use ptyshell_history as history;
pub use ptyshell_input as input;
pub use ptyshell_jobs as jobs;
pub use ptyshell_terminal as terminal;
pub use ptyshell_types as types;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;

pub use cli::{Cli, Commands};
pub use config::ShellConfig;
