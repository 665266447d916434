use chrono::Utc;
use ptyshell_history::{should_record, CommandCatalog, HistoryEngine, RecordDecision};
use ptyshell_input::{first_diagnostic, Diagnostic, LineEvent, LineTracker};
use ptyshell_types::{
    Dimensions, OutputEvent, PromptState, PtyHandle, Session, SpawnError, SuggestionList,
    MAX_VISIBLE_SUGGESTIONS, SUSPICIOUS_INPUT_LENGTH,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::SpawnRequest;
use crate::logger::TranscriptLogger;
use crate::manager::TerminalManager;
use crate::prompt::PromptTracker;
use crate::stream::OutputStream;

/// Tunables for one console session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub suspicious_length: usize,
    pub max_visible_suggestions: usize,
    /// Directory for JSON-lines transcripts, `None` to disable them
    pub transcript_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            suspicious_length: SUSPICIOUS_INPUT_LENGTH,
            max_visible_suggestions: MAX_VISIBLE_SUGGESTIONS,
            transcript_dir: None,
        }
    }
}

/// What the console should show for the line being typed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    pub line: String,
    /// Remainder of the best history match beyond `line`
    pub ghost: Option<String>,
    pub suggestions: SuggestionList,
    pub diagnostic: Option<Diagnostic>,
}

/// Result of feeding one chunk of keystrokes to a session
#[derive(Debug)]
pub enum InputOutcome {
    /// Bytes went to the process; the snapshot reflects the new line
    Forwarded(InputSnapshot),
    /// The process had exited and Enter started a fresh one
    Restarted(OutputStream),
    /// Enter was pressed while waiting but the respawn failed; still waiting
    RestartFailed(SpawnError),
    /// Dropped: the process is gone and this was not a bare Enter
    Ignored,
}

/// Console-side controller for one shell session.
///
/// Feeds keystrokes to the pty, keeps a shadow of the line being typed,
/// records committed lines into history when it is safe to, and restarts
/// the shell on request after it exits. Designed to be driven by a single
/// task so every keystroke's effects land before the next one is applied.
pub struct ShellSession {
    session: Session,
    request: SpawnRequest,
    manager: Arc<TerminalManager>,
    history: Arc<HistoryEngine>,
    catalog: Arc<dyn CommandCatalog>,
    options: SessionOptions,
    prompt: PromptTracker,
    line: LineTracker,
    transcript: Option<TranscriptLogger>,
    last_exit: Option<i32>,
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("session", &self.session)
            .field("request", &self.request)
            .field("last_exit", &self.last_exit)
            .finish()
    }
}

fn is_bare_enter(bytes: &[u8]) -> bool {
    matches!(bytes, b"\r" | b"\n" | b"\r\n")
}

impl ShellSession {
    /// Prepare a session; nothing is spawned until `start`
    pub fn new(
        session_id: impl Into<String>,
        request: SpawnRequest,
        manager: Arc<TerminalManager>,
        history: Arc<HistoryEngine>,
        catalog: Arc<dyn CommandCatalog>,
        options: SessionOptions,
    ) -> Self {
        let session = Session::new(session_id, request.cwd.clone(), request.dimensions);
        let transcript = options.transcript_dir.as_deref().and_then(|dir| {
            TranscriptLogger::new(&session.session_id, dir)
                .map_err(|e| warn!(session = %session.session_id, "transcripts disabled: {:#}", e))
                .ok()
        });

        Self {
            session,
            request,
            manager,
            history,
            catalog,
            options,
            prompt: PromptTracker::new(),
            line: LineTracker::new(),
            transcript,
            last_exit: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn request(&self) -> &SpawnRequest {
        &self.request
    }

    pub fn prompt_state(&self) -> PromptState {
        self.prompt.state()
    }

    /// Waiting for Enter after the process exited or failed to spawn
    pub fn is_waiting_for_restart(&self) -> bool {
        self.session.restartable
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit
    }

    /// First spawn. Same as `restart`.
    pub async fn start(&mut self) -> Result<OutputStream, SpawnError> {
        self.restart().await
    }

    /// Spawn the last used command again with a fresh handle.
    ///
    /// On failure the session stays restart-eligible.
    pub async fn restart(&mut self) -> Result<OutputStream, SpawnError> {
        if let Some(old) = self.session.pty_handle.take() {
            self.manager.close(old).await;
        }
        self.prompt.reset();
        self.line.clear();
        self.session.prompt_state = PromptState::AtPrompt;

        let spawned = match self.manager.spawn(&self.request).await {
            Ok(handle) => self.manager.subscribe(handle).map_err(|e| SpawnError::Spawn {
                command: self.request.command.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(e),
        };

        match spawned {
            Ok(stream) => {
                let handle = stream.handle();
                self.session.pty_handle = Some(handle);
                self.session.restartable = false;
                self.last_exit = None;
                if let Some(transcript) = self.transcript.as_mut() {
                    if let Err(e) = transcript.log_spawn(handle, &self.request.command_line()) {
                        debug!("transcript write failed: {:#}", e);
                    }
                }
                info!(session = %self.session.session_id, %handle, "session started");
                Ok(stream)
            }
            Err(e) => {
                warn!(session = %self.session.session_id, "spawn failed: {}", e);
                self.session.restartable = true;
                Err(e)
            }
        }
    }

    /// Feed raw keystroke bytes from the console
    pub async fn handle_input(&mut self, bytes: &[u8]) -> InputOutcome {
        if self.session.restartable {
            if !is_bare_enter(bytes) {
                return InputOutcome::Ignored;
            }
            return match self.restart().await {
                Ok(stream) => InputOutcome::Restarted(stream),
                Err(e) => InputOutcome::RestartFailed(e),
            };
        }

        let Some(handle) = self.session.pty_handle else {
            return InputOutcome::Ignored;
        };

        if let Err(e) = self.manager.write(handle, bytes).await {
            debug!(%handle, "dropping input: {}", e);
        }
        if let Some(transcript) = self.transcript.as_mut() {
            if let Err(e) = transcript.log_input(bytes) {
                debug!("transcript write failed: {:#}", e);
            }
        }

        for event in self.line.feed(bytes) {
            if let LineEvent::Commit { line, in_sync } = event {
                self.commit(&line, in_sync);
            }
        }

        InputOutcome::Forwarded(self.snapshot())
    }

    fn commit(&self, line: &str, in_sync: bool) {
        if !in_sync {
            debug!("not recording a line edited by the shell itself");
            return;
        }
        match should_record(line, self.prompt.state(), self.options.suspicious_length) {
            RecordDecision::Record => {
                self.history.record(line, self.session.working_directory.clone(), Utc::now());
            }
            RecordDecision::Skip(reason) => debug!(?reason, "not recording line"),
        }
    }

    /// Feed one event from the output stream of `handle`.
    ///
    /// Events from a handle this session no longer owns (the tail of a
    /// stream that was replaced by a restart) are dropped.
    pub async fn handle_output(&mut self, handle: PtyHandle, event: &OutputEvent) {
        if self.session.pty_handle != Some(handle) {
            debug!(%handle, current = ?self.session.pty_handle, "ignoring output from a stale handle");
            return;
        }
        match event {
            OutputEvent::Data(bytes) => {
                self.session.prompt_state = self.prompt.feed(bytes);
                if let Some(transcript) = self.transcript.as_mut() {
                    if let Err(e) = transcript.log_output(bytes) {
                        debug!("transcript write failed: {:#}", e);
                    }
                }
            }
            OutputEvent::Exit(code) => {
                info!(session = %self.session.session_id, code, "shell exited; waiting for Enter to restart");
                if let Some(transcript) = self.transcript.as_mut() {
                    if let Err(e) = transcript.log_exit(*code) {
                        debug!("transcript write failed: {:#}", e);
                    }
                }
                if let Some(handle) = self.session.pty_handle.take() {
                    self.manager.close(handle).await;
                }
                self.last_exit = Some(*code);
                self.session.restartable = true;
                self.line.clear();
            }
        }
    }

    /// Current line, ghost text, suggestions and first diagnostic
    pub fn snapshot(&self) -> InputSnapshot {
        let line = self.line.line().to_string();
        if line.is_empty() {
            return InputSnapshot::default();
        }
        InputSnapshot {
            ghost: self.history.ghost_suggestion(&line),
            suggestions: self.history.live_suggestions(
                &line,
                self.catalog.as_ref(),
                self.options.max_visible_suggestions,
            ),
            diagnostic: first_diagnostic(&line),
            line,
        }
    }

    /// Type the ghost suggestion into the shell as if the user typed it.
    ///
    /// Only possible with the cursor at the end of the line.
    pub async fn accept_ghost(&mut self) -> Option<InputSnapshot> {
        if self.line.cursor() != self.line.line().chars().count() {
            return None;
        }
        let ghost = self.snapshot().ghost?;
        match self.handle_input(ghost.as_bytes()).await {
            InputOutcome::Forwarded(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Propagate a console geometry change; later restarts reuse it
    pub async fn resize(&mut self, dimensions: Dimensions) {
        self.session.dimensions = dimensions;
        self.request.dimensions = dimensions;
        if let Some(transcript) = self.transcript.as_mut() {
            if let Err(e) = transcript.log_resize(dimensions) {
                debug!("transcript write failed: {:#}", e);
            }
        }
        if let Some(handle) = self.session.pty_handle {
            if let Err(e) = self.manager.resize(handle, dimensions).await {
                debug!(%handle, "ignoring resize: {}", e);
            }
        }
    }

    /// Terminate the process for good; the session will not offer a restart
    pub async fn close(&mut self) {
        if let Some(handle) = self.session.pty_handle.take() {
            self.manager.close(handle).await;
        }
        self.session.restartable = false;
        self.line.clear();
    }
}
