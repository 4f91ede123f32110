//! Memory stores.
//!
//! Two file-backed key/value stores share one snapshot engine:
//!
//! - [`ShortTermMemory`]: overwrite semantics, no history.
//! - [`LongTermMemory`]: versioned; every overwrite archives the previous
//!   value and metadata onto the entry's history, oldest first.
//!
//! Every mutation rewrites the whole snapshot file before returning, so a
//! value read back after a successful `put` always reflects that `put`, on
//! disk as well as in memory.

mod long_term;
mod short_term;
mod snapshot;

use serde::Serialize;
use serde_json::Value;

pub use long_term::{HistoryRecord, LongTermEntry};
pub use short_term::ShortTermEntry;
pub use snapshot::{SnapshotMetadata, SnapshotStore, StoreEntry, StoreLimits};

use crate::error::MemoryResult;

/// Free-form metadata attached to an entry.
pub type Metadata = serde_json::Map<String, Value>;

pub type ShortTermMemory = SnapshotStore<ShortTermEntry>;
pub type LongTermMemory = SnapshotStore<LongTermEntry>;

/// Which store an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    ShortTerm,
    LongTerm,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::ShortTerm => "short-term",
            MemoryKind::LongTerm => "long-term",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a mutation.
///
/// The in-memory change is always applied; `persisted` is `false` when the
/// snapshot write that followed it failed (the failure has been logged).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteReceipt<T> {
    pub entry: T,
    pub persisted: bool,
}

/// Operations shared by both store kinds.
pub trait MemoryStore: Send + Sync {
    type Entry: Clone + Serialize;

    fn kind(&self) -> MemoryKind;

    fn get(&self, key: &str) -> MemoryResult<Option<Self::Entry>>;

    /// Insert or overwrite `key`, then flush the snapshot.
    fn put(
        &self,
        key: &str,
        value: Value,
        metadata: Metadata,
    ) -> MemoryResult<WriteReceipt<Self::Entry>>;

    /// Case-insensitive substring match over the stringified key, value and
    /// metadata of every entry, in insertion order.
    fn search(&self, query: &str) -> MemoryResult<Vec<Self::Entry>>;

    /// Remove every entry, then flush. The receipt carries the number removed.
    fn clear(&self) -> MemoryResult<WriteReceipt<usize>>;

    /// Write the current contents to the backing file.
    fn flush(&self) -> MemoryResult<()>;

    fn entries(&self) -> MemoryResult<Vec<Self::Entry>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// String form used for searching: strings are matched without quotes,
/// everything else by its JSON text.
pub(crate) fn searchable_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
