//! Command catalog collaborators: the system half of autocomplete

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fuzzy::match_kind;

/// Supplies command-name candidates for a partial input
#[cfg_attr(test, mockall::automock)]
pub trait CommandCatalog: Send + Sync {
    /// Candidates for `partial`, best first
    fn candidates(&self, partial: &str) -> Vec<String>;
}

/// Shell builtins offered even when nothing on `$PATH` matches
const BUILTINS: &[&str] = &[
    "alias", "bg", "cd", "echo", "exit", "export", "fg", "history", "jobs", "kill", "pwd", "set",
    "source", "type", "ulimit", "umask", "unalias", "unset", "wait",
];

/// A fixed set of command names, built once
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    names: BTreeSet<String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins(mut self) -> Self {
        self.names.extend(BUILTINS.iter().map(|s| s.to_string()));
        self
    }

    /// Add every executable found in the directories of `$PATH`
    pub fn with_path_executables(self) -> Self {
        let dirs: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        self.with_executables_in(&dirs)
    }

    pub fn with_executables_in(mut self, dirs: &[PathBuf]) -> Self {
        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %dir.display(), "skipping unreadable PATH entry: {}", e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if is_executable(&path) {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        self.names.insert(name.to_string());
                    }
                }
            }
        }
        self
    }

    /// Declare an extra command name
    pub fn declare(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl CommandCatalog for StaticCatalog {
    fn candidates(&self, partial: &str) -> Vec<String> {
        let partial = partial.trim_start();
        // Command names only complete the first word
        if partial.is_empty() || partial.contains(char::is_whitespace) {
            return Vec::new();
        }

        let mut prefixed = Vec::new();
        let mut ranked = Vec::new();
        for name in &self.names {
            if name.starts_with(partial) {
                prefixed.push(name.clone());
            } else if let Some(kind) = match_kind(name, partial) {
                ranked.push((kind, name.clone()));
            }
        }
        ranked.sort_by_key(|(kind, _)| *kind);

        prefixed.extend(ranked.into_iter().map(|(_, name)| name));
        prefixed
    }
}

/// Builtins plus every executable on `$PATH`, scanned once at construction
#[derive(Debug, Clone)]
pub struct PathCatalog {
    inner: StaticCatalog,
}

impl PathCatalog {
    pub fn scan() -> Self {
        let inner = StaticCatalog::new().with_builtins().with_path_executables();
        debug!(commands = inner.len(), "scanned PATH for commands");
        Self { inner }
    }

    pub fn from_dirs(dirs: &[PathBuf]) -> Self {
        Self {
            inner: StaticCatalog::new().with_builtins().with_executables_in(dirs),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl CommandCatalog for PathCatalog {
    fn candidates(&self, partial: &str) -> Vec<String> {
        self.inner.candidates(partial)
    }
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
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "exe" | "bat" | "cmd"))
}
