use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use ptyshell_types::{Dimensions, SpawnError};
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::backend::SpawnRequest;

/// Handles PTY process management
pub(crate) struct PtyHandler {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
}

/// The byte pipes of a freshly spawned pty, handed to the I/O threads
pub(crate) struct PtyPipes {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

fn pty_size(dimensions: Dimensions) -> PtySize {
    PtySize {
        rows: dimensions.rows,
        cols: dimensions.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl PtyHandler {
    /// Allocate a pty and launch the requested command on it.
    ///
    /// Blocking; call from a blocking-friendly context.
    pub fn spawn(request: &SpawnRequest) -> Result<(Self, PtyPipes), SpawnError> {
        if !request.cwd.is_dir() {
            return Err(SpawnError::WorkingDirectory(request.cwd.clone()));
        }

        // Look the binary up first so a typo is not reported as a pty failure
        let path_var = request
            .env
            .iter()
            .rev()
            .find(|(key, _)| key == "PATH")
            .map(|(_, value)| OsString::from(value))
            .or_else(|| std::env::var_os("PATH"));
        let program = find_executable(&request.command, path_var.as_deref(), &request.cwd)
            .ok_or_else(|| SpawnError::ExecutableNotFound(request.command.clone()))?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(request.dimensions))
            .map_err(|e| SpawnError::PtyAllocation(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program.as_os_str());
        cmd.args(&request.args);
        cmd.cwd(&request.cwd);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        if std::env::var_os("TERM").is_none() && !request.env.iter().any(|(k, _)| k == "TERM") {
            cmd.env("TERM", "xterm-256color");
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| SpawnError::Spawn {
            command: request.command.clone(),
            reason: e.to_string(),
        })?;
        // Only the child may hold the slave side, otherwise the reader never sees EOF
        drop(pair.slave);

        let master = pair.master;
        let reader = master
            .try_clone_reader()
            .map_err(|e| SpawnError::PtyAllocation(format!("failed to clone PTY reader: {}", e)))?;
        let writer = master
            .take_writer()
            .map_err(|e| SpawnError::PtyAllocation(format!("failed to take PTY writer: {}", e)))?;

        Ok((Self { master, child }, PtyPipes { reader, writer }))
    }

    /// Resize the PTY
    pub fn resize(&self, dimensions: Dimensions) -> io::Result<()> {
        self.master
            .resize(pty_size(dimensions))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    /// Non-blocking exit check
    pub fn try_wait(&mut self) -> Option<i32> {
        self.child
            .try_wait()
            .ok()
            .flatten()
            .map(|status| status.exit_code() as i32)
    }

    /// Kill the child process
    pub fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }
}

/// Resolve `command` to an executable path.
///
/// Names containing a path separator are taken relative to `cwd`; bare names
/// are searched for in `path_var`.
pub(crate) fn find_executable(command: &str, path_var: Option<&OsStr>, cwd: &Path) -> Option<PathBuf> {
    if command.is_empty() {
        return None;
    }

    let as_path = Path::new(command);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        let candidate = if as_path.is_absolute() {
            as_path.to_path_buf()
        } else {
            cwd.join(as_path)
        };
        return is_executable(&candidate).then_some(candidate);
    }

    let path_var = path_var?;
    std::env::split_paths(path_var)
        .flat_map(|dir| candidates_in(&dir, command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn candidates_in(dir: &Path, command: &str) -> Vec<PathBuf> {
    vec![dir.join(command)]
}

#[cfg(not(unix))]
fn candidates_in(dir: &Path, command: &str) -> Vec<PathBuf> {
    let mut out = vec![dir.join(command)];
    for ext in ["exe", "cmd", "bat", "com"] {
        out.push(dir.join(format!("{}.{}", command, ext)));
    }
    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
