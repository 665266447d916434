//! Background job controller
//!
//! Each job is a child process in its own process group, watched by one
//! tokio task. The task and `cancel` race to finish the job; `Job`'s guarded
//! transition makes sure only the first one counts.

use ptyshell_input::split_words;
use ptyshell_types::{CancelError, Job, JobId, JobStatus, SpawnError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default grace period between SIGTERM and SIGKILL
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Default cap on the captured output tail, per job
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 256 * 1024;

/// How long to let output readers drain after the process is gone
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Shell used by `submit_line`
    pub shell: String,
    pub working_dir: Option<PathBuf>,
    pub grace_period: Duration,
    pub max_output_bytes: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            working_dir: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Gracefully terminate a job's process group.
///
/// SIGTERM first, SIGKILL if it is still running after `grace`.
#[cfg(unix)]
async fn graceful_kill(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    if let Some(pid) = child.id() {
        let pgid = pid as libc::pid_t;
        // SAFETY: killpg only sends a signal; the group was created for this child
        unsafe {
            libc::killpg(pgid, libc::SIGTERM);
        }

        tokio::select! {
            result = child.wait() => return result.map(|_| ()),
            _ = tokio::time::sleep(grace) => {
                debug!(pid, "job ignored SIGTERM, sending SIGKILL");
                // SAFETY: as above
                unsafe {
                    libc::killpg(pgid, libc::SIGKILL);
                }
            }
        }
    }
    child.wait().await.map(|_| ())
}

#[cfg(not(unix))]
async fn graceful_kill(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
    child.kill().await
}

/// Append to a rolling output tail without splitting a UTF-8 sequence
fn append_with_truncation(buffer: &mut Vec<u8>, data: &[u8], max_bytes: usize) {
    buffer.extend_from_slice(data);

    // Let the buffer grow to twice the limit before trimming back
    if buffer.len() > max_bytes * 2 {
        let keep_from = buffer.len() - max_bytes;
        let safe_keep_from = (keep_from..buffer.len())
            .find(|&i| (buffer[i] as i8) >= -64)
            .unwrap_or(buffer.len());
        buffer.drain(0..safe_keep_from);
    }
}

async fn pump_output<R>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>, max_bytes: usize)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut buffer = lock(&sink);
                append_with_truncation(&mut buffer, &chunk[..n], max_bytes);
            }
            Err(e) => {
                debug!("job output read failed: {}", e);
                break;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exit code, with death-by-signal mapped to the shell's 128+N convention
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

struct JobEntry {
    job: Job,
    output: Arc<Mutex<Vec<u8>>>,
    cancel: CancellationToken,
    /// Cancelled once the job has reached a terminal state
    done: CancellationToken,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobEntry>>>;

/// Tracks commands run outside the foreground pty
pub struct JobController {
    jobs: JobTable,
    options: JobOptions,
    event_tx: Option<mpsc::Sender<Job>>,
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("jobs", &lock(&self.jobs).len())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for JobController {
    fn default() -> Self {
        Self::new(JobOptions::default())
    }
}

impl JobController {
    pub fn new(options: JobOptions) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            options,
            event_tx: None,
        }
    }

    /// Send every finished job through `tx`, after its final transition
    pub fn with_event_sender(mut self, tx: mpsc::Sender<Job>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Run `command` with `args` directly, without a shell.
    ///
    /// Returns as soon as the process is started.
    pub fn submit(&self, command: &str, args: &[String]) -> Result<JobId, SpawnError> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        self.launch(Job::new(command, args.to_vec()), cmd)
    }

    /// Run a full command line through the configured shell
    pub fn submit_line(&self, line: &str) -> Result<JobId, SpawnError> {
        let mut words = split_words(line).into_iter();
        let command = words
            .next()
            .ok_or_else(|| SpawnError::ExecutableNotFound(String::new()))?;

        let mut cmd = Command::new(&self.options.shell);
        cmd.arg("-c").arg(line);
        self.launch(Job::new(command, words.collect()), cmd)
    }

    fn launch(&self, job: Job, mut cmd: Command) -> Result<JobId, SpawnError> {
        if let Some(dir) = &self.options.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so cancellation reaches grandchildren too
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SpawnError::ExecutableNotFound(job.command.clone()),
            _ => SpawnError::Spawn {
                command: job.command_line(),
                reason: e.to_string(),
            },
        })?;

        let id = job.id.clone();
        let output = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        let readers: Vec<_> = [
            child.stdout.take().map(|out| {
                tokio::spawn(pump_output(out, Arc::clone(&output), self.options.max_output_bytes))
            }),
            child.stderr.take().map(|err| {
                tokio::spawn(pump_output(err, Arc::clone(&output), self.options.max_output_bytes))
            }),
        ]
        .into_iter()
        .flatten()
        .collect();

        info!(job = %id, command = %job.command_line(), pid = ?child.id(), "job started");
        lock(&self.jobs).insert(
            id.clone(),
            JobEntry {
                job,
                output,
                cancel: cancel.clone(),
                done: done.clone(),
            },
        );

        let jobs = Arc::clone(&self.jobs);
        let grace = self.options.grace_period;
        let event_tx = self.event_tx.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) => Some(exit_code(status)),
                        Err(e) => {
                            warn!(job = %job_id, "failed to wait for job: {}", e);
                            Some(-1)
                        }
                    }
                }
                _ = cancel.cancelled() => None,
            };

            if exited.is_none() {
                if let Err(e) = graceful_kill(&mut child, grace).await {
                    warn!(job = %job_id, "failed to terminate job: {}", e);
                }
            }

            for reader in readers {
                let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await;
            }

            let finished = {
                let mut table = lock(&jobs);
                table.get_mut(&job_id).and_then(|entry| {
                    let changed = match exited {
                        Some(code) => entry.job.finish_exited(code),
                        None => entry.job.finish_cancelled(),
                    };
                    entry.done.cancel();
                    changed.then(|| entry.job.clone())
                })
            };

            if let Some(job) = finished {
                info!(job = %job.id, status = %job.status, exit_code = ?job.exit_code, "job finished");
                if let Some(tx) = event_tx {
                    let _ = tx.send(job).await;
                }
            }
        });

        Ok(id)
    }

    /// Snapshot of every known job, oldest first
    pub fn poll(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = lock(&self.jobs).values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        lock(&self.jobs).get(id).map(|e| e.job.clone())
    }

    /// Captured stdout and stderr tail, interleaved as it arrived
    pub fn output(&self, id: &JobId) -> Option<String> {
        let output = lock(&self.jobs).get(id).map(|e| Arc::clone(&e.output))?;
        let bytes = lock(&output);
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn running_count(&self) -> usize {
        lock(&self.jobs)
            .values()
            .filter(|e| e.job.status == JobStatus::Running)
            .count()
    }

    /// Ask a running job to stop.
    ///
    /// The job becomes `Cancelled` once its process is gone; use `wait` to
    /// observe that.
    pub fn cancel(&self, id: &JobId) -> Result<(), CancelError> {
        let table = lock(&self.jobs);
        let entry = table.get(id).ok_or_else(|| CancelError::NotFound(id.clone()))?;
        if entry.job.status.is_terminal() {
            return Err(CancelError::AlreadyTerminal {
                id: id.clone(),
                status: entry.job.status,
            });
        }
        debug!(job = %id, "cancelling job");
        entry.cancel.cancel();
        Ok(())
    }

    /// Wait until a job reaches a terminal state
    pub async fn wait(&self, id: &JobId) -> Option<Job> {
        let done = lock(&self.jobs).get(id).map(|e| e.done.clone())?;
        done.cancelled().await;
        self.get(id)
    }

    /// Forget a finished job. Running jobs are left alone.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        let mut table = lock(&self.jobs);
        if table.get(id)?.job.status.is_terminal() {
            table.remove(id).map(|e| e.job)
        } else {
            None
        }
    }

    /// Forget every finished job, returning them oldest first
    pub fn remove_finished(&self) -> Vec<Job> {
        let mut table = lock(&self.jobs);
        let finished: Vec<JobId> = table
            .iter()
            .filter(|(_, e)| e.job.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        let mut removed: Vec<Job> = finished
            .iter()
            .filter_map(|id| table.remove(id).map(|e| e.job))
            .collect();
        removed.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        removed
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        for entry in lock(&self.jobs).values() {
            entry.cancel.cancel();
        }
    }
}
