/// PTY-based terminal backend built on portable-pty
use async_trait::async_trait;
use chrono::Utc;
use ptyshell_types::{Dimensions, OutputEvent, PtyHandle, SpawnError, TerminalIoError};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{SessionInfo, SpawnRequest, TerminalBackend};
use crate::pty_handler::{PtyHandler, PtyPipes};
use crate::stream::OutputStream;

const READ_BUFFER_SIZE: usize = 4096;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to wait for an exit status after the output side has closed
const EXIT_POLL_ATTEMPTS: u32 = 500;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PtySession {
    info: Mutex<SessionInfo>,
    handler: Arc<Mutex<PtyHandler>>,
    input: std_mpsc::Sender<Vec<u8>>,
    output: Mutex<Option<mpsc::UnboundedReceiver<OutputEvent>>>,
    alive: Arc<AtomicBool>,
}

impl PtySession {
    fn ensure_alive(&self, handle: PtyHandle) -> Result<(), TerminalIoError> {
        if self.alive.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TerminalIoError::StaleHandle(handle))
        }
    }
}

/// PTY backend: one reader thread and one writer thread per session
pub struct PtyBackend {
    sessions: Mutex<HashMap<PtyHandle, Arc<PtySession>>>,
    next_handle: AtomicU64,
}

impl std::fmt::Debug for PtyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyBackend")
            .field("sessions", &lock(&self.sessions).len())
            .finish()
    }
}

impl Default for PtyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PtyBackend {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn get_session(&self, handle: PtyHandle) -> Result<Arc<PtySession>, TerminalIoError> {
        lock(&self.sessions)
            .get(&handle)
            .cloned()
            .ok_or(TerminalIoError::StaleHandle(handle))
    }

    /// OS process id of a live session, mainly for diagnostics
    pub fn process_id(&self, handle: PtyHandle) -> Option<u32> {
        let session = self.get_session(handle).ok()?;
        let handler = lock(&session.handler);
        handler.process_id()
    }
}

/// Pump pty output into the channel, then report the exit status.
///
/// The sender is dropped when this thread ends, so the channel closes exactly
/// once, right after the single `Exit` event.
fn start_reader(
    handle: PtyHandle,
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::UnboundedSender<OutputEvent>,
    handler: Arc<Mutex<PtyHandler>>,
    alive: Arc<AtomicBool>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name(format!("{}-reader", handle))
        .spawn(move || {
            let mut buffer = [0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        // Keep draining even without a subscriber so the child never blocks
                        let _ = tx.send(OutputEvent::Data(buffer[..n].to_vec()));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO is how Linux reports the slave side closing
                        debug!(%handle, "pty read ended: {}", e);
                        break;
                    }
                }
            }

            let code = wait_for_exit(&handler);
            alive.store(false, Ordering::Release);
            info!(%handle, code, "pty process exited");
            let _ = tx.send(OutputEvent::Exit(code));
        })
        .map(|_| ())
}

fn wait_for_exit(handler: &Mutex<PtyHandler>) -> i32 {
    for _ in 0..EXIT_POLL_ATTEMPTS {
        if let Some(code) = lock(handler).try_wait() {
            return code;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }

    // Output closed but the process lingers: make it go away
    let mut handler = lock(handler);
    if let Err(e) = handler.kill() {
        debug!("failed to kill lingering pty process: {}", e);
    }
    handler.try_wait().unwrap_or(-1)
}

fn start_writer(
    handle: PtyHandle,
    mut writer: Box<dyn Write + Send>,
    rx: std_mpsc::Receiver<Vec<u8>>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name(format!("{}-writer", handle))
        .spawn(move || {
            for chunk in rx {
                if let Err(e) = writer.write_all(&chunk).and_then(|_| writer.flush()) {
                    debug!(%handle, "pty write failed: {}", e);
                    break;
                }
            }
        })
        .map(|_| ())
}

#[async_trait]
impl TerminalBackend for PtyBackend {
    async fn spawn(&self, request: &SpawnRequest) -> Result<PtyHandle, SpawnError> {
        let owned = request.clone();
        let (handler, PtyPipes { reader, writer }) =
            tokio::task::spawn_blocking(move || PtyHandler::spawn(&owned))
                .await
                .map_err(|e| SpawnError::Spawn {
                    command: request.command.clone(),
                    reason: e.to_string(),
                })??;

        let handle = PtyHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let handler = Arc::new(Mutex::new(handler));
        let alive = Arc::new(AtomicBool::new(true));
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = std_mpsc::channel();

        let threads = start_writer(handle, writer, in_rx).and_then(|_| {
            start_reader(handle, reader, out_tx, Arc::clone(&handler), Arc::clone(&alive))
        });
        if let Err(e) = threads {
            let _ = lock(&handler).kill();
            return Err(SpawnError::Spawn {
                command: request.command.clone(),
                reason: format!("failed to start I/O threads: {}", e),
            });
        }

        let info = SessionInfo {
            handle,
            command: request.command.clone(),
            args: request.args.clone(),
            working_dir: request.cwd.clone(),
            dimensions: request.dimensions,
            created_at: Utc::now(),
            alive: true,
        };
        let session = Arc::new(PtySession {
            info: Mutex::new(info),
            handler,
            input: in_tx,
            output: Mutex::new(Some(out_rx)),
            alive,
        });
        lock(&self.sessions).insert(handle, session);

        info!(%handle, command = %request.command_line(), cwd = %request.cwd.display(), "spawned pty process");
        Ok(handle)
    }

    async fn write(&self, handle: PtyHandle, bytes: &[u8]) -> Result<(), TerminalIoError> {
        let session = self.get_session(handle)?;
        session.ensure_alive(handle)?;
        session
            .input
            .send(bytes.to_vec())
            .map_err(|_| TerminalIoError::StaleHandle(handle))
    }

    async fn resize(&self, handle: PtyHandle, dimensions: Dimensions) -> Result<(), TerminalIoError> {
        let session = self.get_session(handle)?;
        session.ensure_alive(handle)?;
        lock(&session.handler).resize(dimensions)?;
        lock(&session.info).dimensions = dimensions;
        debug!(%handle, rows = dimensions.rows, cols = dimensions.cols, "resized pty");
        Ok(())
    }

    fn subscribe(&self, handle: PtyHandle) -> Result<OutputStream, TerminalIoError> {
        let session = self.get_session(handle)?;
        let rx = lock(&session.output)
            .take()
            .ok_or(TerminalIoError::AlreadySubscribed(handle))?;
        Ok(OutputStream::new(handle, rx))
    }

    async fn close(&self, handle: PtyHandle) {
        let Some(session) = lock(&self.sessions).remove(&handle) else {
            return;
        };
        if session.alive.swap(false, Ordering::AcqRel) {
            if let Err(e) = lock(&session.handler).kill() {
                warn!(%handle, "failed to kill pty process: {}", e);
            }
        }
        debug!(%handle, "closed pty session");
    }

    fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = lock(&self.sessions)
            .values()
            .map(|session| {
                let mut info = lock(&session.info).clone();
                info.alive = session.alive.load(Ordering::Acquire);
                info
            })
            .collect();
        sessions.sort_by_key(|info| info.handle);
        sessions
    }

    fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn backend_name(&self) -> &str {
        "pty"
    }
}

impl Drop for PtyBackend {
    fn drop(&mut self) {
        // Kill all sessions on drop
        for (_, session) in lock(&self.sessions).drain() {
            if session.alive.swap(false, Ordering::AcqRel) {
                let _ = lock(&session.handler).kill();
            }
        }
    }
}
