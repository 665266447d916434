use chrono::{DateTime, Utc};
use ptyshell_types::{
    CommandOutcome, HistoryRecord, Suggestion, SuggestionList, RECENT_HISTORY_LIMIT,
    SEARCH_RESULT_LIMIT,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::catalog::CommandCatalog;
use crate::fuzzy::match_kind;
use crate::store::HistoryStore;

/// Append-only command log with fuzzy search and suggestions.
///
/// One writer appends through `record`; any number of readers may search
/// concurrently. Appended records are never modified.
pub struct HistoryEngine {
    records: RwLock<Vec<HistoryRecord>>,
    store: Option<Arc<dyn HistoryStore>>,
}

impl std::fmt::Debug for HistoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryEngine")
            .field("records", &self.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryEngine {
    /// In-memory engine with no persistence
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            store: None,
        }
    }

    /// Engine backed by a store, warmed with the newest `load_limit` records
    pub fn with_store(store: Arc<dyn HistoryStore>, load_limit: usize) -> Self {
        let records = match store.load(load_limit) {
            Ok(records) => records,
            Err(e) => {
                warn!("failed to load history, starting empty: {}", e);
                Vec::new()
            }
        };
        debug!(count = records.len(), "loaded history");
        Self {
            records: RwLock::new(records),
            store: Some(store),
        }
    }

    pub fn store(&self) -> Option<&Arc<dyn HistoryStore>> {
        self.store.as_ref()
    }

    /// Append a committed line. No-op for blank lines.
    pub fn record(&self, line: &str, cwd: PathBuf, timestamp: DateTime<Utc>) -> Option<HistoryRecord> {
        self.record_with_outcome(line, cwd, timestamp, CommandOutcome::Unknown)
    }

    /// Append a line whose exit status is known, as for one-shot executions
    pub fn record_with_outcome(
        &self,
        line: &str,
        cwd: PathBuf,
        timestamp: DateTime<Utc>,
        outcome: CommandOutcome,
    ) -> Option<HistoryRecord> {
        let record = HistoryRecord::from_line(line.trim(), cwd, timestamp)?;

        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());

        if let Some(store) = &self.store {
            if let Err(e) = store.append(&record, outcome) {
                warn!(command = %record.command, "failed to persist history record: {}", e);
            }
        }

        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the whole log, oldest first
    pub fn snapshot(&self) -> Vec<HistoryRecord> {
        self.records.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Search the log.
    ///
    /// An empty query returns the 20 most recent records, newest first. A
    /// non-empty query returns up to 50 fuzzy matches: substring matches
    /// before scattered ones, newest first within each group.
    pub fn search(&self, query: &str) -> Vec<HistoryRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);

        if query.is_empty() {
            return records.iter().rev().take(RECENT_HISTORY_LIMIT).cloned().collect();
        }

        // Walking newest-first keeps equal timestamps in recency order after the stable sort
        let mut matches: Vec<_> = records
            .iter()
            .rev()
            .filter_map(|record| match_kind(&record.line(), query).map(|kind| (kind, record)))
            .collect();
        matches.sort_by(|(ka, ra), (kb, rb)| ka.cmp(kb).then_with(|| rb.timestamp.cmp(&ra.timestamp)));

        matches
            .into_iter()
            .take(SEARCH_RESULT_LIMIT)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Remainder of the most recent line that extends `input`.
    ///
    /// Only the part after the typed prefix is returned, never the whole line.
    pub fn ghost_suggestion(&self, input: &str) -> Option<String> {
        if input.is_empty() {
            return None;
        }
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().rev().find_map(|record| {
            let line = record.line();
            if line.len() > input.len() && line.starts_with(input) {
                Some(line[input.len()..].to_string())
            } else {
                None
            }
        })
    }

    /// Ranked completions for `partial`: history matches first, then catalog
    /// candidates, de-duplicated, with everything past `max_visible` counted.
    pub fn live_suggestions(
        &self,
        partial: &str,
        catalog: &dyn CommandCatalog,
        max_visible: usize,
    ) -> SuggestionList {
        if partial.trim().is_empty() {
            return SuggestionList::default();
        }

        let mut seen = HashSet::new();
        let mut ranked = Vec::new();

        for record in self.search(partial) {
            let line = record.line();
            if seen.insert(line.clone()) {
                ranked.push(Suggestion::history(line));
            }
        }
        for name in catalog.candidates(partial) {
            if seen.insert(name.clone()) {
                ranked.push(Suggestion::system(name));
            }
        }

        SuggestionList::from_ranked(ranked, max_visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MockCommandCatalog, StaticCatalog};
    use crate::store::{MemoryStore, MockHistoryStore, StoreError};
    use chrono::TimeZone;
    use ptyshell_types::{SuggestionSource, MAX_VISIBLE_SUGGESTIONS};
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn engine_with(lines: &[&str]) -> HistoryEngine {
        let engine = HistoryEngine::new();
        for (i, line) in lines.iter().enumerate() {
            engine.record(line, PathBuf::from("/work"), at(i as i64));
        }
        engine
    }

    fn lines(records: &[HistoryRecord]) -> Vec<String> {
        records.iter().map(|r| r.line()).collect()
    }

    #[test]
    fn test_record_skips_blank_lines() {
        let engine = HistoryEngine::new();
        assert!(engine.record("   ", PathBuf::from("/"), at(0)).is_none());
        assert!(engine.is_empty());

        let record = engine.record(" make  test ", PathBuf::from("/src"), at(1)).unwrap();
        assert_eq!(record.command, "make");
        assert_eq!(record.args, vec!["test"]);
        assert_eq!(record.working_directory, PathBuf::from("/src"));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_recency_mode() {
        let all: Vec<String> = (0..25).map(|i| format!("echo {}", i)).collect();
        let refs: Vec<&str> = all.iter().map(String::as_str).collect();
        let engine = engine_with(&refs);

        let recent = engine.search("");
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].line(), "echo 24");
        assert_eq!(recent[19].line(), "echo 5");
    }

    #[test]
    fn test_fuzzy_mode_ranks_substring_first() {
        let engine = engine_with(&["git status", "grep -rn stat", "go test ./..."]);
        assert_eq!(lines(&engine.search("stat")), vec!["grep -rn stat", "git status"]);
        assert_eq!(lines(&engine.search("gt")), vec!["go test ./...", "grep -rn stat", "git status"]);

        // The scattered match is newer but the substring match still wins
        let engine = engine_with(&["git status", "go install stuff"]);
        assert_eq!(lines(&engine.search("stat")), vec!["git status", "go install stuff"]);

        let engine = engine_with(&["gist", "git status"]);
        assert_eq!(lines(&engine.search("gist")), vec!["gist", "git status"]);
    }

    #[test]
    fn test_fuzzy_mode_is_case_insensitive() {
        let engine = engine_with(&["Make Release"]);
        assert_eq!(lines(&engine.search("mr")), vec!["Make Release"]);
        assert!(engine.search("xyz").is_empty());
    }

    #[test]
    fn test_fuzzy_mode_caps_results() {
        let all: Vec<String> = (0..60).map(|i| format!("ls dir{}", i)).collect();
        let refs: Vec<&str> = all.iter().map(String::as_str).collect();
        let engine = engine_with(&refs);
        let found = engine.search("ls");
        assert_eq!(found.len(), 50);
        assert_eq!(found[0].line(), "ls dir59");
    }

    #[test]
    fn test_ghost_suggestion_returns_remainder() {
        let engine = engine_with(&["git status", "grep foo"]);
        assert_eq!(engine.ghost_suggestion("gi"), Some("t status".to_string()));
        assert_eq!(engine.ghost_suggestion("gr"), Some("ep foo".to_string()));
        assert_eq!(engine.ghost_suggestion("x"), None);
        assert_eq!(engine.ghost_suggestion(""), None);
    }

    #[test]
    fn test_ghost_suggestion_prefers_recent_and_longer() {
        let engine = engine_with(&["cargo build", "cargo test", "cargo"]);
        assert_eq!(engine.ghost_suggestion("cargo"), Some(" test".to_string()));
        assert_eq!(engine.ghost_suggestion("cargo test"), None);
    }

    #[test]
    fn test_live_suggestions_merge_and_dedupe() {
        let engine = engine_with(&["git status", "git push"]);
        let mut catalog = MockCommandCatalog::new();
        catalog
            .expect_candidates()
            .returning(|_| vec!["git".to_string(), "git push".to_string(), "gitk".to_string()]);

        let list = engine.live_suggestions("git", &catalog, MAX_VISIBLE_SUGGESTIONS);
        let texts: Vec<_> = list.visible.iter().map(|s| (s.text.as_str(), s.source)).collect();
        assert_eq!(
            texts,
            vec![
                ("git push", SuggestionSource::History),
                ("git status", SuggestionSource::History),
                ("git", SuggestionSource::System),
                ("gitk", SuggestionSource::System),
            ]
        );
        assert_eq!(list.hidden_count, 0);
    }

    #[test]
    fn test_live_suggestions_cap_visible() {
        let all: Vec<String> = (0..8).map(|i| format!("make target{}", i)).collect();
        let refs: Vec<&str> = all.iter().map(String::as_str).collect();
        let engine = engine_with(&refs);
        let catalog = StaticCatalog::new().declare("make").declare("makepkg").declare("makeinfo");

        let list = engine.live_suggestions("make", &catalog, MAX_VISIBLE_SUGGESTIONS);
        assert_eq!(list.visible.len(), 10);
        assert_eq!(list.hidden_count, 1);
        assert_eq!(list.visible[0].text, "make target7");
    }

    #[test]
    fn test_live_suggestions_empty_input() {
        let engine = engine_with(&["ls"]);
        let mut catalog = MockCommandCatalog::new();
        catalog.expect_candidates().never();
        assert!(engine.live_suggestions("  ", &catalog, 10).is_empty());
    }

    #[test]
    fn test_store_is_warmed_and_mirrored() {
        let store = Arc::new(MemoryStore::new());
        let first = HistoryEngine::with_store(store.clone(), 100);
        first.record("ls -la", PathBuf::from("/"), at(0));
        first.record_with_outcome("cargo test", PathBuf::from("/"), at(1), CommandOutcome::Failed);

        let second = HistoryEngine::with_store(store.clone(), 100);
        assert_eq!(lines(&second.snapshot()), vec!["ls -la", "cargo test"]);

        let top = store.query_top_by_usage(10).unwrap();
        let cargo = top.iter().find(|s| s.command == "cargo").unwrap();
        assert_eq!(cargo.failure_count, 1);
    }

    #[test]
    fn test_store_failures_do_not_lose_records() {
        let mut store = MockHistoryStore::new();
        store.expect_load().returning(|_| Ok(Vec::new()));
        store.expect_append().times(1).returning(|_, _| {
            Err(StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        });

        let engine = HistoryEngine::with_store(Arc::new(store), 10);
        assert!(engine.record("ls", PathBuf::from("/"), at(0)).is_some());
        assert_eq!(engine.len(), 1);
    }
}
