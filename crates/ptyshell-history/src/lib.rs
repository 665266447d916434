//! Command history: recording guard, fuzzy search, ghost text and
//! live suggestions, with pluggable persistence.

pub mod catalog;
pub mod engine;
pub mod fuzzy;
pub mod guard;
pub mod store;

pub use catalog::{CommandCatalog, PathCatalog, StaticCatalog};
pub use engine::HistoryEngine;
pub use fuzzy::{fuzzy_match, match_kind, MatchKind};
pub use guard::{is_suspicious, should_record, RecordDecision, SkipReason};
pub use store::{HistoryStore, JsonlStore, MemoryStore, StoreError};
