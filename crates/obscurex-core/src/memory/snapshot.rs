use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MemoryKind, MemoryStore, Metadata, WriteReceipt, searchable_text};
use crate::error::{MemoryError, MemoryResult};

/// An entry type a [`SnapshotStore`] can hold.
pub trait StoreEntry: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: MemoryKind;

    fn create(key: &str, value: Value, metadata: Metadata, now: DateTime<Utc>) -> Self;

    /// Overwrite in place with a new value and metadata.
    fn replace(&mut self, value: Value, metadata: Metadata, now: DateTime<Utc>, limits: &StoreLimits);

    fn key(&self) -> &str;

    fn value(&self) -> &Value;

    fn metadata(&self) -> &Metadata;

    fn matches(&self, needle: &str) -> bool {
        self.key().to_lowercase().contains(needle)
            || searchable_text(self.value()).to_lowercase().contains(needle)
            || Value::Object(self.metadata().clone())
                .to_string()
                .to_lowercase()
                .contains(needle)
    }
}

/// Store-wide limits. Only long-term history honors `max_history`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreLimits {
    /// Keep at most this many archived versions per key; `None` keeps all.
    pub max_history: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl SnapshotMetadata {
    fn fresh() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            last_updated: now,
        }
    }
}

#[derive(Deserialize)]
struct SnapshotDocument<E> {
    entries: Vec<E>,
    metadata: SnapshotMetadata,
}

#[derive(Serialize)]
struct SnapshotView<'a, E> {
    entries: &'a [E],
    metadata: &'a SnapshotMetadata,
}

struct StoreState<E> {
    entries: Vec<E>,
    index: HashMap<String, usize>,
    metadata: SnapshotMetadata,
}

impl<E: StoreEntry> StoreState<E> {
    fn new(entries: Vec<E>, metadata: SnapshotMetadata) -> Self {
        let mut state = Self {
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::new(),
            metadata,
        };
        // A hand-edited snapshot may repeat a key; the last occurrence wins.
        for entry in entries {
            match state.index.get(entry.key()).copied() {
                Some(i) => state.entries[i] = entry,
                None => {
                    state.index.insert(entry.key().to_string(), state.entries.len());
                    state.entries.push(entry);
                }
            }
        }
        state
    }
}

/// A key/value store materialized as a single JSON snapshot file.
///
/// The snapshot document is `{"entries": [...], "metadata": {"created",
/// "lastUpdated"}}`, pretty-printed so it stays readable by hand. It is
/// rewritten atomically (temp file + rename) after every mutation, while the
/// store's write lock is still held, so the file never lags behind a
/// returned `put`.
///
/// A missing snapshot starts an empty store. A corrupt one is logged, copied
/// aside to `<file>.corrupted.<unix-ts>`, and also starts an empty store.
///
/// # Concurrent File Access
///
/// Two stores opened on the same path will overwrite each other's snapshot.
/// Share one store through an `Arc` instead.
///
/// # Blocking
///
/// Every mutation serializes and writes the whole snapshot synchronously
/// under the write lock. Called from an async task, that blocks the executor
/// thread for the length of the write, and other writers wait on the lock.
pub struct SnapshotStore<E> {
    path: Option<PathBuf>,
    limits: StoreLimits,
    state: RwLock<StoreState<E>>,
}

impl<E: StoreEntry> SnapshotStore<E> {
    /// Open the store backed by `path`, loading any existing snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match Self::load_snapshot(&path) {
            Some(doc) => StoreState::new(doc.entries, doc.metadata),
            None => StoreState::new(Vec::new(), SnapshotMetadata::fresh()),
        };
        Self {
            path: Some(path),
            limits: StoreLimits::default(),
            state: RwLock::new(state),
        }
    }

    /// A store with no backing file. Flushing is a no-op.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            limits: StoreLimits::default(),
            state: RwLock::new(StoreState::new(Vec::new(), SnapshotMetadata::fresh())),
        }
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_history(self, max_history: Option<usize>) -> Self {
        self.with_limits(StoreLimits { max_history })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    pub fn snapshot_metadata(&self) -> MemoryResult<SnapshotMetadata> {
        Ok(self.read()?.metadata)
    }

    fn load_snapshot(path: &Path) -> Option<SnapshotDocument<E>> {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<SnapshotDocument<E>>(&contents) {
                Ok(doc) => {
                    tracing::debug!(
                        path = ?path,
                        store = %E::KIND,
                        entries = doc.entries.len(),
                        "Loaded memory snapshot"
                    );
                    Some(doc)
                }
                Err(e) => {
                    tracing::error!(
                        path = ?path,
                        store = %E::KIND,
                        error = %e,
                        "Failed to parse memory snapshot, starting fresh"
                    );
                    Self::backup_corrupted(path);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, store = %E::KIND, "Memory snapshot not found, starting fresh");
                None
            }
            Err(e) => {
                tracing::warn!(path = ?path, store = %E::KIND, error = %e, "Failed to read memory snapshot");
                None
            }
        }
    }

    fn backup_corrupted(path: &Path) {
        let Some(file_name) = path.file_name() else {
            return;
        };
        let backup = path.with_file_name(format!(
            "{}.corrupted.{}",
            file_name.to_string_lossy(),
            Utc::now().timestamp()
        ));
        match fs::copy(path, &backup) {
            Ok(_) => tracing::warn!(backup = ?backup, "Backed up corrupted memory snapshot"),
            Err(e) => tracing::warn!(backup = ?backup, error = %e, "Failed to back up corrupted memory snapshot"),
        }
    }

    fn read(&self) -> MemoryResult<RwLockReadGuard<'_, StoreState<E>>> {
        self.state.read().map_err(|_| MemoryError::LockPoisoned {
            store: E::KIND.to_string(),
        })
    }

    fn write(&self) -> MemoryResult<RwLockWriteGuard<'_, StoreState<E>>> {
        self.state.write().map_err(|_| MemoryError::LockPoisoned {
            store: E::KIND.to_string(),
        })
    }

    fn persist(&self, state: &StoreState<E>) -> MemoryResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let view = SnapshotView {
            entries: &state.entries,
            metadata: &state.metadata,
        };
        let json = serde_json::to_string_pretty(&view).map_err(|e| {
            tracing::error!(store = %E::KIND, error = %e, "Failed to serialize memory snapshot");
            MemoryError::Serialization {
                store: E::KIND.to_string(),
                message: e.to_string(),
            }
        })?;

        let persistence_error = |message: String| MemoryError::Persistence {
            store: E::KIND.to_string(),
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                tracing::error!(path = ?parent, error = %e, "Failed to create memory directory");
                persistence_error(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "memory".to_string());
        let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

        fs::write(&tmp_path, json).map_err(|e| {
            tracing::error!(
                path = ?tmp_path,
                error = %e,
                "Failed to write memory snapshot to temporary file"
            );
            persistence_error(format!("failed to write {}: {}", tmp_path.display(), e))
        })?;

        fs::rename(&tmp_path, path).map_err(|e| {
            tracing::error!(
                from = ?tmp_path,
                to = ?path,
                error = %e,
                "Failed to atomically rename memory snapshot"
            );
            persistence_error(format!(
                "failed to rename {} to {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = ?path, store = %E::KIND, entries = state.entries.len(), "Persisted memory snapshot");
        Ok(())
    }

    /// Flush after a mutation; failures are logged and reported as `false`.
    fn persist_after_mutation(&self, state: &StoreState<E>) -> bool {
        match self.persist(state) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    store = %E::KIND,
                    error = %e,
                    "Memory mutation applied but not persisted"
                );
                false
            }
        }
    }
}

impl<E: StoreEntry> MemoryStore for SnapshotStore<E> {
    type Entry = E;

    fn kind(&self) -> MemoryKind {
        E::KIND
    }

    fn get(&self, key: &str) -> MemoryResult<Option<E>> {
        let state = self.read()?;
        Ok(state.index.get(key).map(|&i| state.entries[i].clone()))
    }

    fn put(&self, key: &str, value: Value, metadata: Metadata) -> MemoryResult<WriteReceipt<E>> {
        let mut state = self.write()?;
        let now = Utc::now();

        let entry = match state.index.get(key).copied() {
            Some(i) => {
                let entry = &mut state.entries[i];
                entry.replace(value, metadata, now, &self.limits);
                entry.clone()
            }
            None => {
                let entry = E::create(key, value, metadata, now);
                let position = state.entries.len();
                state.index.insert(key.to_string(), position);
                state.entries.push(entry.clone());
                entry
            }
        };
        state.metadata.last_updated = now;

        let persisted = self.persist_after_mutation(&state);
        Ok(WriteReceipt { entry, persisted })
    }

    fn search(&self, query: &str) -> MemoryResult<Vec<E>> {
        let needle = query.to_lowercase();
        let state = self.read()?;
        Ok(state
            .entries
            .iter()
            .filter(|entry| entry.matches(&needle))
            .cloned()
            .collect())
    }

    fn clear(&self) -> MemoryResult<WriteReceipt<usize>> {
        let mut state = self.write()?;
        let removed = state.entries.len();
        state.entries.clear();
        state.index.clear();
        state.metadata.last_updated = Utc::now();

        let persisted = self.persist_after_mutation(&state);
        Ok(WriteReceipt {
            entry: removed,
            persisted,
        })
    }

    fn flush(&self) -> MemoryResult<()> {
        let state = self.read()?;
        self.persist(&state)
    }

    fn entries(&self) -> MemoryResult<Vec<E>> {
        Ok(self.read()?.entries.clone())
    }

    fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }
}

impl<E> std::fmt::Debug for SnapshotStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("path", &self.path)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
