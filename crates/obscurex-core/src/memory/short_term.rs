use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::snapshot::{StoreEntry, StoreLimits};
use super::{MemoryKind, Metadata};

/// An entry in short-term memory. Overwriting a key replaces it outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermEntry {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
}

impl StoreEntry for ShortTermEntry {
    const KIND: MemoryKind = MemoryKind::ShortTerm;

    fn create(key: &str, value: Value, metadata: Metadata, now: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            value,
            metadata,
            timestamp: now,
        }
    }

    fn replace(&mut self, value: Value, metadata: Metadata, now: DateTime<Utc>, _limits: &StoreLimits) {
        self.value = value;
        self.metadata = metadata;
        self.timestamp = now;
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
