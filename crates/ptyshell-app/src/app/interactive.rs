use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ptyshell_terminal::{InputOutcome, InputSnapshot, OutputStream, ShellSession};
use ptyshell_types::{Dimensions, OutputEvent, PromptState, PtyHandle, SpawnError};
use std::io::{self, Read, Write};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::setup::{AppConfig, Components};

/// Ctrl-\ on the console; pressed twice in a row it leaves ptyshell
pub const QUIT_KEY: u8 = 0x1c;

/// Right arrow at the end of the line accepts the ghost suggestion
const ACCEPT_GHOST_KEY: &[u8] = b"\x1b[C";

/// Restores cooked mode when dropped, including on early return
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("failed to restore terminal mode: {}", e);
        }
    }
}

/// Two consecutive presses of the quit key
#[derive(Debug, Default)]
pub struct QuitChord {
    armed: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChordAction {
    /// Not part of the chord; send the bytes on
    Pass,
    /// First press, swallowed
    Armed,
    Quit,
}

impl QuitChord {
    pub fn feed(&mut self, bytes: &[u8]) -> ChordAction {
        if bytes != [QUIT_KEY] {
            self.armed = false;
            return ChordAction::Pass;
        }
        if std::mem::replace(&mut self.armed, true) {
            ChordAction::Quit
        } else {
            ChordAction::Armed
        }
    }
}

/// Dimmed ghost text and the first diagnostic, drawn after the cursor,
/// then the cursor moved back to where typing continues
pub fn render_overlay(snapshot: &InputSnapshot) -> String {
    let ghost = snapshot.ghost.as_deref().unwrap_or("");
    let hint = snapshot
        .diagnostic
        .as_ref()
        .map(|d| format!("  ({})", d))
        .unwrap_or_default();

    let width = ghost.chars().count() + hint.chars().count();
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    if !ghost.is_empty() {
        out.push_str(&format!("\x1b[2m{}\x1b[0m", ghost));
    }
    if !hint.is_empty() {
        out.push_str(&format!("\x1b[2;33m{}\x1b[0m", hint));
    }
    out.push_str(&format!("\x1b[{}D", width));
    out
}

/// Erase from the cursor to the end of the line
const CLEAR_TO_EOL: &[u8] = b"\x1b[K";

fn console_dimensions(fallback: Dimensions) -> Dimensions {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => Dimensions::new(rows, cols),
        _ => fallback,
    }
}

fn exit_notice(code: i32) -> String {
    format!(
        "\r\n{}\r\n",
        format!("[process exited with code {}; press Enter to restart, Ctrl-\\ twice to quit]", code).yellow()
    )
}

fn spawn_failure_notice(error: &SpawnError) -> String {
    format!(
        "\r\n{}\r\n",
        format!("[failed to start: {}; press Enter to retry, Ctrl-\\ twice to quit]", error).red()
    )
}

/// Keystrokes from the console, read on a blocking thread
fn spawn_stdin_reader() -> Result<mpsc::UnboundedReceiver<Vec<u8>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            let mut stdin = io::stdin();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("console read failed: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to start console reader")?;
    Ok(rx)
}

/// Console geometry changes
struct ResizeEvents {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

impl ResizeEvents {
    fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let signal = signal(SignalKind::window_change()).context("Failed to listen for SIGWINCH")?;
            Ok(Self { signal })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn next(&mut self) -> Option<()> {
        #[cfg(unix)]
        {
            self.signal.recv().await
        }
        #[cfg(not(unix))]
        {
            std::future::pending().await
        }
    }
}

struct Console {
    stdout: io::Stdout,
    overlay_visible: bool,
    /// Overlay waiting for the shell's echo before it is drawn
    pending_overlay: Option<String>,
}

impl Console {
    fn new() -> Self {
        Self {
            stdout: io::stdout(),
            overlay_visible: false,
            pending_overlay: None,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut out = self.stdout.lock();
        out.write_all(bytes)?;
        out.flush()?;
        Ok(())
    }

    fn clear_overlay(&mut self) -> Result<()> {
        self.pending_overlay = None;
        if std::mem::take(&mut self.overlay_visible) {
            self.write(CLEAR_TO_EOL)?;
        }
        Ok(())
    }

    fn show_output(&mut self, bytes: &[u8], prompt: PromptState) -> Result<()> {
        self.write(bytes)?;
        if let Some(overlay) = self.pending_overlay.take() {
            if prompt == PromptState::AtPrompt {
                self.write(overlay.as_bytes())?;
                self.overlay_visible = true;
            }
        }
        Ok(())
    }

    fn expect_overlay(&mut self, snapshot: &InputSnapshot) {
        let overlay = render_overlay(snapshot);
        self.pending_overlay = (!overlay.is_empty()).then_some(overlay);
    }
}

/// Run the shell in the current terminal until the user quits.
///
/// Returns the last exit code of the shell.
pub async fn run_shell_mode(
    app: &AppConfig,
    components: &Components,
    shell: Option<&str>,
    args: &[String],
) -> Result<i32> {
    let mut request = app.spawn_request(shell, args);
    request.dimensions = console_dimensions(request.dimensions);

    let session_id = format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), std::process::id());
    let mut session = ShellSession::new(
        session_id,
        request,
        components.terminals.clone(),
        components.history.clone(),
        components.catalog.clone(),
        app.session_options(),
    );

    let _raw = RawModeGuard::enable()?;
    let mut input = spawn_stdin_reader()?;
    let mut resizes = ResizeEvents::new()?;
    let mut console = Console::new();

    // A failed first spawn waits for Enter like any later restart
    let (mut output, mut output_open) = match session.start().await {
        Ok(stream) => {
            info!(command = %session.request().command_line(), "interactive session started");
            (stream, true)
        }
        Err(e) => {
            console.write(spawn_failure_notice(&e).as_bytes())?;
            (OutputStream::channel(PtyHandle(0)).1, false)
        }
    };
    let mut chord = QuitChord::default();
    let mut resize_open = true;
    let mut last_snapshot = InputSnapshot::default();

    loop {
        tokio::select! {
            bytes = input.recv() => {
                let Some(bytes) = bytes else {
                    debug!("console input closed");
                    break;
                };
                match chord.feed(&bytes) {
                    ChordAction::Quit => break,
                    ChordAction::Armed => continue,
                    ChordAction::Pass => {}
                }
                console.clear_overlay()?;

                let outcome = if bytes == ACCEPT_GHOST_KEY && last_snapshot.ghost.is_some() {
                    // Away from the end of the line the arrow just moves the cursor
                    match session.accept_ghost().await {
                        Some(snapshot) => InputOutcome::Forwarded(snapshot),
                        None => session.handle_input(&bytes).await,
                    }
                } else {
                    session.handle_input(&bytes).await
                };

                match outcome {
                    InputOutcome::Forwarded(snapshot) => {
                        console.expect_overlay(&snapshot);
                        last_snapshot = snapshot;
                    }
                    InputOutcome::Restarted(stream) => {
                        output = stream;
                        output_open = true;
                        last_snapshot = InputSnapshot::default();
                        let dimensions = console_dimensions(session.request().dimensions);
                        session.resize(dimensions).await;
                    }
                    InputOutcome::RestartFailed(e) => {
                        console.write(spawn_failure_notice(&e).as_bytes())?;
                    }
                    InputOutcome::Ignored => {}
                }
            }
            event = output.recv(), if output_open => {
                let Some(event) = event else {
                    output_open = false;
                    continue;
                };
                session.handle_output(output.handle(), &event).await;
                match event {
                    OutputEvent::Data(bytes) => console.show_output(&bytes, session.prompt_state())?,
                    OutputEvent::Exit(code) => {
                        console.clear_overlay()?;
                        console.write(exit_notice(code).as_bytes())?;
                        last_snapshot = InputSnapshot::default();
                    }
                }
            }
            resized = resizes.next(), if resize_open => {
                if resized.is_none() {
                    resize_open = false;
                    continue;
                }
                let dimensions = console_dimensions(session.request().dimensions);
                debug!(rows = dimensions.rows, cols = dimensions.cols, "console resized");
                session.resize(dimensions).await;
            }
        }
    }

    let code = session.last_exit_code().unwrap_or(0);
    session.close().await;
    info!(code, "interactive session ended");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quit_needs_two_presses_in_a_row() {
        let mut chord = QuitChord::default();
        assert_eq!(chord.feed(&[QUIT_KEY]), ChordAction::Armed);
        assert_eq!(chord.feed(b"l"), ChordAction::Pass);
        assert_eq!(chord.feed(&[QUIT_KEY]), ChordAction::Armed);
        assert_eq!(chord.feed(&[QUIT_KEY]), ChordAction::Quit);
    }

    #[test]
    fn test_quit_key_inside_a_chunk_passes() {
        let mut chord = QuitChord::default();
        assert_eq!(chord.feed(&[b'a', QUIT_KEY]), ChordAction::Pass);
        assert_eq!(chord.feed(&[QUIT_KEY, QUIT_KEY]), ChordAction::Pass);
    }

    #[test]
    fn test_overlay_moves_cursor_back() {
        let snapshot = |ghost: Option<&str>, line: &str| InputSnapshot {
            line: line.to_string(),
            ghost: ghost.map(str::to_string),
            diagnostic: ptyshell_input::first_diagnostic(line),
            ..InputSnapshot::default()
        };

        assert_eq!(
            render_overlay(&snapshot(Some("tatus"), "git s")),
            "\x1b[2mtatus\x1b[0m\x1b[5D"
        );
        assert_eq!(render_overlay(&snapshot(Some("é!"), "x")), "\x1b[2mé!\x1b[0m\x1b[2D");
        assert_eq!(render_overlay(&snapshot(None, "ls")), "");

        let overlay = render_overlay(&snapshot(None, "echo 'foo"));
        assert!(overlay.contains("  (Unmatched single quote)"));
        assert!(overlay.ends_with("\x1b[26D"));
    }

    #[test]
    fn test_exit_notice_mentions_code() {
        colored::control::set_override(false);
        let notice = exit_notice(3);
        assert!(notice.starts_with("\r\n[process exited with code 3;"));
        assert!(notice.contains("press Enter to restart"));

        let notice = spawn_failure_notice(&SpawnError::ExecutableNotFound("nosuchsh".to_string()));
        assert!(notice.contains("nosuchsh"));
        assert!(notice.contains("press Enter to retry"));
    }
}
