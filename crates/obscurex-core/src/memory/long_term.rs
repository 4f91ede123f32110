use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::snapshot::{StoreEntry, StoreLimits};
use super::{MemoryKind, Metadata};

/// A superseded value of a long-term entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub value: Value,
    #[serde(default)]
    pub metadata: Metadata,
    pub archived_at: DateTime<Utc>,
}

/// An entry in long-term memory.
///
/// `metadata` always carries the insertion `timestamp`. Every overwrite
/// appends the previous value and metadata to `history`, oldest first, so
/// after `n` puts to one key the history holds the first `n - 1` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermEntry {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
}

impl LongTermEntry {
    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    fn stamp(mut metadata: Metadata, now: DateTime<Utc>) -> Metadata {
        metadata.insert("timestamp".to_string(), json!(now.to_rfc3339()));
        metadata
    }
}

impl StoreEntry for LongTermEntry {
    const KIND: MemoryKind = MemoryKind::LongTerm;

    fn create(key: &str, value: Value, metadata: Metadata, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            value,
            metadata: Self::stamp(metadata, now),
            history: Vec::new(),
        }
    }

    fn replace(&mut self, value: Value, metadata: Metadata, now: DateTime<Utc>, limits: &StoreLimits) {
        let previous = HistoryRecord {
            value: std::mem::replace(&mut self.value, value),
            metadata: std::mem::replace(&mut self.metadata, Self::stamp(metadata, now)),
            archived_at: now,
        };
        self.history.push(previous);

        if let Some(max) = limits.max_history {
            let excess = self.history.len().saturating_sub(max);
            if excess > 0 {
                self.history.drain(..excess);
            }
        }
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{LongTermMemory, MemoryStore};

    #[test]
    fn test_overwrite_archives_previous_value() {
        let store = LongTermMemory::ephemeral();
        store.put("a", json!(1), Metadata::new()).unwrap();
        store.put("a", json!(2), Metadata::new()).unwrap();

        let entry = store.get("a").unwrap().unwrap();
        assert_eq!(entry.value, json!(2));
        assert_eq!(entry.history.len(), 1);
        assert_eq!(entry.history[0].value, json!(1));
        assert!(entry.history[0].metadata.contains_key("timestamp"));
    }

    #[test]
    fn test_history_is_oldest_first() {
        let store = LongTermMemory::ephemeral();
        for i in 1..=4 {
            store.put("k", json!(i), Metadata::new()).unwrap();
        }
        let entry = store.get("k").unwrap().unwrap();
        let archived: Vec<_> = entry.history.iter().map(|h| h.value.clone()).collect();
        assert_eq!(archived, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(entry.history_count(), 3);
    }

    #[test]
    fn test_metadata_gets_timestamp() {
        let store = LongTermMemory::ephemeral();
        let mut meta = Metadata::new();
        meta.insert("iteration".into(), json!(3));
        let entry = store.put("k", json!("v"), meta).unwrap().entry;
        assert_eq!(entry.metadata["iteration"], json!(3));
        assert!(entry.metadata["timestamp"].is_string());
    }

    #[test]
    fn test_max_history_drops_oldest() {
        let store = LongTermMemory::ephemeral().with_max_history(Some(2));
        for i in 1..=5 {
            store.put("k", json!(i), Metadata::new()).unwrap();
        }
        let entry = store.get("k").unwrap().unwrap();
        let archived: Vec<_> = entry.history.iter().map(|h| h.value.clone()).collect();
        assert_eq!(archived, vec![json!(3), json!(4)]);
        assert_eq!(entry.value, json!(5));
    }

    #[test]
    fn test_history_serializes_archived_at_in_camel_case() {
        let store = LongTermMemory::ephemeral();
        store.put("k", json!(1), Metadata::new()).unwrap();
        let entry = store.put("k", json!(2), Metadata::new()).unwrap().entry;
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value["history"][0]["archivedAt"].is_string());
    }
}
