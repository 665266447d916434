//! Background jobs and one-shot command execution outside the pty

pub mod controller;
pub mod executor;

pub use controller::{JobController, JobOptions, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_OUTPUT_BYTES};
pub use executor::CommandExecutor;
