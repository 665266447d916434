use ptyshell_input::strip_background_marker;
use ptyshell_types::ExecuteResult;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use crate::controller::JobController;

/// Runs one-shot command lines outside the pty.
///
/// Lines ending in a lone `&` go to the job controller instead of being
/// waited on.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    jobs: Arc<JobController>,
}

impl CommandExecutor {
    pub fn new(jobs: Arc<JobController>) -> Self {
        Self { jobs }
    }

    pub fn jobs(&self) -> &Arc<JobController> {
        &self.jobs
    }

    pub async fn execute(&self, line: &str) -> ExecuteResult {
        let line = line.trim();
        if line.is_empty() {
            return ExecuteResult::Failure {
                error: "empty command".to_string(),
                exit_code: None,
            };
        }

        if let Some(foreground) = strip_background_marker(line) {
            return match self.jobs.submit_line(foreground) {
                Ok(job_id) => ExecuteResult::Backgrounded { job_id },
                Err(e) => ExecuteResult::Failure {
                    error: e.to_string(),
                    exit_code: None,
                },
            };
        }

        let options = self.jobs.options();
        let mut cmd = Command::new(&options.shell);
        cmd.arg("-c")
            .arg(line)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }

        debug!(command = %line, "executing");
        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                return ExecuteResult::Failure {
                    error: format!("Failed to execute command: {}", e),
                    exit_code: None,
                }
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();

        match exit_code {
            Some(0) => ExecuteResult::Success {
                output: stdout,
                exit_code: 0,
            },
            _ => {
                let error = if stderr.trim().is_empty() {
                    match exit_code {
                        Some(code) => format!("command exited with status {}", code),
                        None => "command terminated by a signal".to_string(),
                    }
                } else {
                    stderr
                };
                ExecuteResult::Failure { error, exit_code }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::controller::JobOptions;
    use pretty_assertions::assert_eq;
    use ptyshell_types::JobStatus;

    fn executor() -> CommandExecutor {
        CommandExecutor::new(Arc::new(JobController::new(JobOptions::default())))
    }

    #[tokio::test]
    async fn test_success() {
        let result = executor().execute("echo hello | tr a-z A-Z").await;
        assert_eq!(
            result,
            ExecuteResult::Success {
                output: "HELLO\n".to_string(),
                exit_code: 0
            }
        );
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_failure_carries_stderr_and_code() {
        let result = executor().execute("echo broken >&2; exit 4").await;
        assert_eq!(
            result,
            ExecuteResult::Failure {
                error: "broken\n".to_string(),
                exit_code: Some(4)
            }
        );

        let result = executor().execute("exit 1").await;
        assert_eq!(
            result,
            ExecuteResult::Failure {
                error: "command exited with status 1".to_string(),
                exit_code: Some(1)
            }
        );
    }

    #[tokio::test]
    async fn test_empty_line() {
        assert!(!executor().execute("  ").await.is_success());
    }

    #[tokio::test]
    async fn test_trailing_ampersand_backgrounds() {
        let executor = executor();
        let result = executor.execute("sleep 0.1 &").await;
        let job_id = result.job_id().cloned().expect("backgrounded");

        let job = executor.jobs().wait(&job_id).await.unwrap();
        assert_eq!(job.command, "sleep");
        assert_eq!(job.args, vec!["0.1"]);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_double_ampersand_runs_in_foreground() {
        let result = executor().execute("true && echo ok").await;
        assert_eq!(result.job_id(), None);
        assert_eq!(
            result,
            ExecuteResult::Success {
                output: "ok\n".to_string(),
                exit_code: 0
            }
        );
    }
}
