use anyhow::{Context, Result};
use ptyshell_history::{CommandCatalog, HistoryEngine, HistoryStore, JsonlStore, PathCatalog};
use ptyshell_jobs::{CommandExecutor, JobController, JobOptions};
use ptyshell_terminal::{PtyBackend, SessionOptions, SpawnRequest, TerminalManager};
use ptyshell_types::Dimensions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::cli::Cli;
use crate::config::ShellConfig;

/// Application configuration derived from the config file, environment and CLI
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub shell: ShellConfig,
    pub work_dir: PathBuf,
}

/// Resolve the configuration.
///
/// Precedence: CLI flags (and their env fallbacks) > config file > defaults.
pub fn setup_from_cli(cli: &Cli) -> Result<AppConfig> {
    let mut shell = ShellConfig::load(cli.config.as_deref())?;

    if let Some(dir) = &cli.working_dir {
        shell.working_dir = Some(dir.clone());
    }
    if let Some(file) = &cli.history_file {
        shell.history_file = file.clone();
    }
    if let Some(dir) = &cli.log_dir {
        shell.log_dir = dir.clone();
    }
    if cli.transcripts {
        shell.transcripts = true;
    }

    let work_dir = match &shell.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine the current directory")?,
    };

    Ok(AppConfig { shell, work_dir })
}

impl AppConfig {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.shell.rows, self.shell.cols)
    }

    /// Spawn request for the configured shell, or for `shell_override`
    pub fn spawn_request(&self, shell_override: Option<&str>, args_override: &[String]) -> SpawnRequest {
        let (command, args) = match shell_override {
            Some(shell) => (shell.to_string(), args_override.to_vec()),
            None if !args_override.is_empty() => (self.shell.shell.clone(), args_override.to_vec()),
            None => (self.shell.shell.clone(), self.shell.shell_args.clone()),
        };

        self.shell
            .env
            .iter()
            .fold(SpawnRequest::new(command, &self.work_dir).with_args(args), |request, (k, v)| {
                request.with_env(k.clone(), v.clone())
            })
            .with_dimensions(self.dimensions())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            suspicious_length: self.shell.suspicious_length,
            max_visible_suggestions: self.shell.max_visible_suggestions,
            transcript_dir: self
                .shell
                .transcripts
                .then(|| self.shell.log_dir.join("transcripts")),
        }
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            working_dir: Some(self.work_dir.clone()),
            grace_period: self.shell.job_grace_period(),
            ..JobOptions::default()
        }
    }
}

/// The long-lived collaborators shared by every mode
pub struct Components {
    pub history: Arc<HistoryEngine>,
    pub catalog: Arc<dyn CommandCatalog>,
    pub terminals: Arc<TerminalManager>,
    pub jobs: Arc<JobController>,
    pub executor: CommandExecutor,
}

impl Components {
    pub fn build(config: &AppConfig) -> Self {
        let store: Arc<dyn HistoryStore> = Arc::new(JsonlStore::new(&config.shell.history_file));
        let history = Arc::new(HistoryEngine::with_store(store, config.shell.history_load_limit));
        debug!(
            file = %config.shell.history_file.display(),
            records = history.len(),
            "history loaded"
        );

        let terminals = Arc::new(TerminalManager::with_backend(
            Arc::new(PtyBackend::new()),
            config.shell.max_sessions,
        ));
        let jobs = Arc::new(JobController::new(config.job_options()));
        let executor = CommandExecutor::new(jobs.clone());

        Self {
            history,
            catalog: Arc::new(PathCatalog::scan()),
            terminals,
            jobs,
            executor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ptyshell").chain(args.iter().copied())).unwrap()
    }

    fn write_config(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_cli_flags_override_file() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            &dir,
            "working_dir = \"/nowhere\"\nhistory_file = \"/tmp/a.jsonl\"\ntranscripts = false\n",
        );
        let work = dir.path().to_string_lossy().into_owned();

        let app = setup_from_cli(&cli(&["--config", &config, "-C", &work, "--transcripts", "history"])).unwrap();
        assert_eq!(app.work_dir, dir.path());
        assert_eq!(app.shell.history_file, PathBuf::from("/tmp/a.jsonl"));
        assert!(app.shell.transcripts);
        assert_eq!(
            app.session_options().transcript_dir,
            Some(app.shell.log_dir.join("transcripts"))
        );
    }

    #[test]
    fn test_spawn_request_uses_config() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            &dir,
            "shell = \"/bin/sh\"\nshell_args = [\"-i\"]\nrows = 40\ncols = 120\n\n[env]\nLANG = \"C\"\n",
        );
        let work = dir.path().to_string_lossy().into_owned();
        let app = setup_from_cli(&cli(&["--config", &config, "-C", &work])).unwrap();

        let request = app.spawn_request(None, &[]);
        assert_eq!(request.command, "/bin/sh");
        assert_eq!(request.args, vec!["-i"]);
        assert_eq!(request.env, vec![("LANG".to_string(), "C".to_string())]);
        assert_eq!(request.cwd, dir.path());
        assert_eq!(request.dimensions, Dimensions::new(40, 120));

        let request = app.spawn_request(Some("zsh"), &[]);
        assert_eq!(request.command, "zsh");
        assert!(request.args.is_empty());
    }

    #[test]
    fn test_job_options_follow_config() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "job_grace_period_ms = 300\n");
        let work = dir.path().to_string_lossy().into_owned();
        let app = setup_from_cli(&cli(&["--config", &config, "-C", &work])).unwrap();

        let options = app.job_options();
        assert_eq!(options.grace_period, std::time::Duration::from_millis(300));
        assert_eq!(options.working_dir.as_deref(), Some(dir.path()));
    }
}
