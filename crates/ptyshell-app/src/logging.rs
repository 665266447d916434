// Diagnostic logging setup
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Name of the diagnostic log inside the log directory
pub const LOG_FILE_NAME: &str = "ptyshell.log";

/// Get or create the log directory
pub fn ensure_log_dir(log_dir: &Path) -> Result<PathBuf> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    }
    Ok(log_dir.to_path_buf())
}

/// Build the subscriber: `RUST_LOG` filtering (default `info`) into `log_file`.
///
/// Output never goes to the terminal, the shell owns it.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_ansi(false).with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}

/// Install the global subscriber, appending to `<log_dir>/ptyshell.log`
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    let dir = ensure_log_dir(log_dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    build_subscriber(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_events_land_in_the_file() {
        let dir = TempDir::new().unwrap();
        let path = ensure_log_dir(&dir.path().join("logs")).unwrap().join(LOG_FILE_NAME);
        let file = File::create(&path).unwrap();

        tracing::subscriber::with_default(build_subscriber(file), || {
            tracing::warn!(session = "s1", "spawn failed");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("spawn failed"));
        assert!(content.contains("s1"));
    }
}
