use anyhow::{Context, Result};
use ptyshell_types::{
    DEFAULT_COLS, DEFAULT_ROWS, MAX_CONCURRENT_SESSIONS, MAX_VISIBLE_SUGGESTIONS, SUSPICIOUS_INPUT_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "PTYSHELL_CONFIG";

/// Number of history records read back at startup by default
pub const DEFAULT_HISTORY_LOAD_LIMIT: usize = 10_000;

/// State directory, `~/.ptyshell`, falling back to the working directory
pub fn state_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ptyshell")
}

fn default_shell() -> String {
    if cfg!(windows) {
        return "cmd.exe".to_string();
    }
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "/bin/bash".to_string())
}

/// Settings loaded once at startup and passed to every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub shell: String,
    pub shell_args: Vec<String>,
    /// Extra environment for the shell process
    pub env: BTreeMap<String, String>,
    /// `None` means the directory ptyshell was started in
    pub working_dir: Option<PathBuf>,
    pub rows: u16,
    pub cols: u16,
    pub history_file: PathBuf,
    pub history_load_limit: usize,
    pub transcripts: bool,
    pub log_dir: PathBuf,
    pub max_sessions: usize,
    pub job_grace_period_ms: u64,
    pub job_poll_interval_ms: u64,
    pub max_visible_suggestions: usize,
    pub suspicious_length: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        let state = state_dir();
        Self {
            shell: default_shell(),
            shell_args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            history_file: state.join("history.jsonl"),
            history_load_limit: DEFAULT_HISTORY_LOAD_LIMIT,
            transcripts: false,
            log_dir: state.join("logs"),
            max_sessions: MAX_CONCURRENT_SESSIONS,
            job_grace_period_ms: 2000,
            job_poll_interval_ms: 1000,
            max_visible_suggestions: MAX_VISIBLE_SUGGESTIONS,
            suspicious_length: SUSPICIOUS_INPUT_LENGTH,
        }
    }
}

impl ShellConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        state_dir().join("config.toml")
    }

    /// Load from TOML. Missing keys take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ShellConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Resolve and load the config file.
    ///
    /// Precedence: explicit path > `$PTYSHELL_CONFIG` > `~/.ptyshell/config.toml`.
    /// An explicitly named file must exist; the default one may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::load_from_file(PathBuf::from(path));
        }
        let path = Self::default_path();
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn job_grace_period(&self) -> Duration {
        Duration::from_millis(self.job_grace_period_ms)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }
}
