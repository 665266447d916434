use ptyshell_types::{Dimensions, PtyHandle, SpawnError, TerminalIoError, MAX_CONCURRENT_SESSIONS};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{SessionInfo, SpawnRequest, TerminalBackend};
use crate::pty_backend::PtyBackend;
use crate::stream::OutputStream;

/// Owns every pseudo-terminal session through a pluggable backend.
///
/// The manager is the only component allowed to write to or resize a pty.
pub struct TerminalManager {
    backend: Arc<dyn TerminalBackend>,
    max_sessions: usize,
    // Keeps the limit check and the spawn atomic
    spawn_lock: Mutex<()>,
}

impl std::fmt::Debug for TerminalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalManager")
            .field("backend", &self.backend.backend_name())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

impl Default for TerminalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalManager {
    /// Create a new terminal manager with the PTY backend
    pub fn new() -> Self {
        Self::with_backend(Arc::new(PtyBackend::new()), MAX_CONCURRENT_SESSIONS)
    }

    pub fn with_backend(backend: Arc<dyn TerminalBackend>, max_sessions: usize) -> Self {
        debug!(backend = backend.backend_name(), max_sessions, "terminal manager ready");
        Self {
            backend,
            max_sessions,
            spawn_lock: Mutex::new(()),
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    /// Launch a process under a new pty.
    ///
    /// Spawn failures are returned as-is and never retried here.
    pub async fn spawn(&self, request: &SpawnRequest) -> Result<PtyHandle, SpawnError> {
        let _guard = self.spawn_lock.lock().await;
        if self.backend.session_count() >= self.max_sessions {
            warn!(max = self.max_sessions, "refusing spawn: session limit reached");
            return Err(SpawnError::SessionLimit(self.max_sessions));
        }
        self.backend.spawn(request).await
    }

    pub async fn write(&self, handle: PtyHandle, bytes: &[u8]) -> Result<(), TerminalIoError> {
        self.backend.write(handle, bytes).await
    }

    pub async fn resize(&self, handle: PtyHandle, dimensions: Dimensions) -> Result<(), TerminalIoError> {
        self.backend.resize(handle, dimensions).await
    }

    pub fn subscribe(&self, handle: PtyHandle) -> Result<OutputStream, TerminalIoError> {
        self.backend.subscribe(handle)
    }

    pub async fn close(&self, handle: PtyHandle) {
        self.backend.close(handle).await
    }

    /// List all sessions, oldest handle first
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.backend.list_sessions()
    }

    pub fn session_exists(&self, handle: PtyHandle) -> bool {
        self.list_sessions().iter().any(|s| s.handle == handle)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-process backend that records traffic and lets tests drive output

    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use ptyshell_types::OutputEvent;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeSession {
        info: Option<SessionInfo>,
        writes: Vec<u8>,
        output_tx: Option<mpsc::UnboundedSender<OutputEvent>>,
        output_rx: Option<mpsc::UnboundedReceiver<OutputEvent>>,
        alive: bool,
    }

    #[derive(Default)]
    pub struct FakeBackend {
        sessions: StdMutex<HashMap<PtyHandle, FakeSession>>,
        next: StdMutex<u64>,
        pub spawned: StdMutex<Vec<SpawnRequest>>,
        pub fail_next_spawn: StdMutex<bool>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Everything written to `handle` so far
        pub fn written(&self, handle: PtyHandle) -> Vec<u8> {
            self.sessions
                .lock()
                .unwrap()
                .get(&handle)
                .map(|s| s.writes.clone())
                .unwrap_or_default()
        }

        /// Emit an output event from the fake process
        pub fn emit(&self, handle: PtyHandle, event: OutputEvent) {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions.get_mut(&handle).unwrap();
            if let OutputEvent::Exit(_) = event {
                session.alive = false;
                if let Some(tx) = session.output_tx.take() {
                    tx.send(event).unwrap();
                }
            } else if let Some(tx) = &session.output_tx {
                tx.send(event).unwrap();
            }
        }
    }

    #[async_trait]
    impl TerminalBackend for FakeBackend {
        async fn spawn(&self, request: &SpawnRequest) -> Result<PtyHandle, SpawnError> {
            self.spawned.lock().unwrap().push(request.clone());
            if std::mem::take(&mut *self.fail_next_spawn.lock().unwrap()) {
                return Err(SpawnError::ExecutableNotFound(request.command.clone()));
            }
            let mut next = self.next.lock().unwrap();
            *next += 1;
            let handle = PtyHandle(*next);
            let (tx, rx) = mpsc::unbounded_channel();
            self.sessions.lock().unwrap().insert(
                handle,
                FakeSession {
                    info: Some(SessionInfo {
                        handle,
                        command: request.command.clone(),
                        args: request.args.clone(),
                        working_dir: request.cwd.clone(),
                        dimensions: request.dimensions,
                        created_at: Utc::now(),
                        alive: true,
                    }),
                    writes: Vec::new(),
                    output_tx: Some(tx),
                    output_rx: Some(rx),
                    alive: true,
                },
            );
            Ok(handle)
        }

        async fn write(&self, handle: PtyHandle, bytes: &[u8]) -> Result<(), TerminalIoError> {
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get_mut(&handle) {
                Some(session) if session.alive => {
                    session.writes.extend_from_slice(bytes);
                    Ok(())
                }
                _ => Err(TerminalIoError::StaleHandle(handle)),
            }
        }

        async fn resize(&self, handle: PtyHandle, dimensions: Dimensions) -> Result<(), TerminalIoError> {
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get_mut(&handle) {
                Some(session) if session.alive => {
                    if let Some(info) = session.info.as_mut() {
                        info.dimensions = dimensions;
                    }
                    Ok(())
                }
                _ => Err(TerminalIoError::StaleHandle(handle)),
            }
        }

        fn subscribe(&self, handle: PtyHandle) -> Result<OutputStream, TerminalIoError> {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(&handle)
                .ok_or(TerminalIoError::StaleHandle(handle))?;
            let rx = session
                .output_rx
                .take()
                .ok_or(TerminalIoError::AlreadySubscribed(handle))?;
            Ok(OutputStream::new(handle, rx))
        }

        async fn close(&self, handle: PtyHandle) {
            self.sessions.lock().unwrap().remove(&handle);
        }

        fn list_sessions(&self) -> Vec<SessionInfo> {
            let sessions = self.sessions.lock().unwrap();
            let mut out: Vec<SessionInfo> = sessions
                .values()
                .filter_map(|s| {
                    s.info.clone().map(|mut info| {
                        info.alive = s.alive;
                        info
                    })
                })
                .collect();
            out.sort_by_key(|info| info.handle);
            out
        }

        fn backend_name(&self) -> &str {
            "fake"
        }
    }
}
