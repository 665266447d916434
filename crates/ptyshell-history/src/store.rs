//! History persistence collaborators
//!
//! The engine keeps its own in-memory log for searching; a store only has to
//! append records durably and answer usage-statistics queries.

use chrono::{DateTime, Utc};
use ptyshell_types::{CommandOutcome, CommandStats, HistoryRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg_attr(test, mockall::automock)]
pub trait HistoryStore: Send + Sync {
    /// Durably append one record
    fn append(&self, record: &HistoryRecord, outcome: CommandOutcome) -> Result<(), StoreError>;

    /// Most used commands first, ties broken by most recent use
    fn query_top_by_usage(&self, limit: usize) -> Result<Vec<CommandStats>, StoreError>;

    /// The newest `limit` records, oldest first
    fn load(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError>;
}

/// One persisted line of history
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreEntry {
    #[serde(flatten)]
    record: HistoryRecord,
    #[serde(default)]
    outcome: CommandOutcome,
}

/// Fold entries into per-command statistics
fn aggregate(entries: &[StoreEntry], limit: usize) -> Vec<CommandStats> {
    let mut by_command: HashMap<&str, CommandStats> = HashMap::new();

    for entry in entries {
        let record = &entry.record;
        let stats = by_command
            .entry(record.command.as_str())
            .or_insert_with(|| CommandStats {
                command: record.command.clone(),
                count: 0,
                success_count: 0,
                failure_count: 0,
                last_used: DateTime::<Utc>::MIN_UTC,
                last_args: Vec::new(),
            });

        stats.count += 1;
        match entry.outcome {
            CommandOutcome::Succeeded => stats.success_count += 1,
            CommandOutcome::Failed => stats.failure_count += 1,
            CommandOutcome::Unknown => {}
        }
        if record.timestamp >= stats.last_used {
            stats.last_used = record.timestamp;
            stats.last_args = record.args.clone();
        }
    }

    let mut stats: Vec<CommandStats> = by_command.into_values().collect();
    stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.last_used.cmp(&a.last_used))
            .then_with(|| a.command.cmp(&b.command))
    });
    stats.truncate(limit);
    stats
}

fn newest(entries: &[StoreEntry], limit: usize) -> Vec<HistoryRecord> {
    let skip = entries.len().saturating_sub(limit);
    entries[skip..].iter().map(|e| e.record.clone()).collect()
}

/// Store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<StoreEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryStore {
    fn append(&self, record: &HistoryRecord, outcome: CommandOutcome) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoreEntry {
                record: record.clone(),
                outcome,
            });
        Ok(())
    }

    fn query_top_by_usage(&self, limit: usize) -> Result<Vec<CommandStats>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(aggregate(&entries, limit))
    }

    fn load(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(newest(&entries, limit))
    }
}

/// Append-only JSON-lines file, one record per line
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    // Serializes appends from concurrent sessions in this process
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoreEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    "skipping unreadable history entry: {}",
                    e
                ),
            }
        }
        Ok(entries)
    }
}

impl HistoryStore for JsonlStore {
    fn append(&self, record: &HistoryRecord, outcome: CommandOutcome) -> Result<(), StoreError> {
        let entry = StoreEntry {
            record: record.clone(),
            outcome,
        };
        let line = serde_json::to_string(&entry)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    fn query_top_by_usage(&self, limit: usize) -> Result<Vec<CommandStats>, StoreError> {
        Ok(aggregate(&self.read_entries()?, limit))
    }

    fn load(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        Ok(newest(&self.read_entries()?, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(line: &str, secs: i64) -> HistoryRecord {
        let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        HistoryRecord::from_line(line, PathBuf::from("/work"), ts).unwrap()
    }

    #[test]
    fn test_memory_store_aggregates_usage() {
        let store = MemoryStore::new();
        store.append(&record("git status", 1), CommandOutcome::Succeeded).unwrap();
        store.append(&record("ls -la", 2), CommandOutcome::Unknown).unwrap();
        store.append(&record("git push origin", 3), CommandOutcome::Failed).unwrap();

        let top = store.query_top_by_usage(10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].command, "git");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[0].success_count, 1);
        assert_eq!(top[0].failure_count, 1);
        assert_eq!(top[0].last_args, vec!["push", "origin"]);
        assert_eq!(top[1].command, "ls");
        assert_eq!(top[1].success_count + top[1].failure_count, 0);
    }

    #[test]
    fn test_usage_limit() {
        let store = MemoryStore::new();
        for (i, cmd) in ["a", "b", "c"].iter().enumerate() {
            store.append(&record(cmd, i as i64), CommandOutcome::Unknown).unwrap();
        }
        let top = store.query_top_by_usage(2).unwrap();
        // Equal counts: most recently used first
        assert_eq!(top.iter().map(|s| s.command.as_str()).collect::<Vec<_>>(), vec!["c", "b"]);
    }

    #[test]
    fn test_jsonl_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path().join("nested").join("history.jsonl"));

        assert!(store.load(10).unwrap().is_empty());

        store.append(&record("cargo build", 1), CommandOutcome::Succeeded).unwrap();
        store.append(&record("cargo test", 2), CommandOutcome::Failed).unwrap();
        store.append(&record("make", 3), CommandOutcome::Unknown).unwrap();

        let loaded = store.load(2).unwrap();
        assert_eq!(loaded.iter().map(|r| r.line()).collect::<Vec<_>>(), vec!["cargo test", "make"]);

        let top = store.query_top_by_usage(1).unwrap();
        assert_eq!(top[0].command, "cargo");
        assert_eq!(top[0].count, 2);
    }

    #[test]
    fn test_jsonl_store_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = JsonlStore::new(&path);
        store.append(&record("ls", 1), CommandOutcome::Unknown).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{{not json").unwrap();
        }
        store.append(&record("pwd", 2), CommandOutcome::Unknown).unwrap();

        let loaded = store.load(10).unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
