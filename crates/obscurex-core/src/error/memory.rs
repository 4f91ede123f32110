//! Memory store errors.

use thiserror::Error;

use super::codes;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// A writer panicked while holding the store lock.
    #[error("{store} memory lock poisoned")]
    LockPoisoned { store: String },

    /// A value or snapshot could not be encoded as JSON.
    #[error("failed to serialize {store} memory: {message}")]
    Serialization { store: String, message: String },

    /// The snapshot file could not be written.
    #[error("failed to persist {store} memory to {path}: {message}")]
    Persistence {
        store: String,
        path: String,
        message: String,
    },
}

impl MemoryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            MemoryError::Persistence { .. } => codes::PERSISTENCE_ERROR,
            MemoryError::LockPoisoned { .. } | MemoryError::Serialization { .. } => {
                codes::MEMORY_ERROR
            }
        }
    }
}

pub type MemoryResult<T> = Result<T, MemoryError>;
