pub mod commands;
pub mod interactive;
pub mod setup;

pub use commands::{run_exec_mode, run_history_mode, run_tokenize_mode, wait_for_job};
pub use interactive::run_shell_mode;
pub use setup::{setup_from_cli, AppConfig, Components};
