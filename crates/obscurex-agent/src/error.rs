//! Error types for sessions, the optimization loop and the agent facade.

use obscurex_core::error::codes;
use obscurex_core::{MemoryError, ModelError, ToolError};
use obscurex_tools::RegistryError;
use thiserror::Error;

use crate::config::ConfigError;

/// Session service failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session '{0}' not found")]
    NotFound(String),

    #[error("Session '{0}' already exists")]
    AlreadyExists(String),
}

impl SessionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "SESSION_NOT_FOUND",
            SessionError::AlreadyExists(_) => "SESSION_EXISTS",
        }
    }
}

/// Failures that end an optimization run.
///
/// Tool failures inside an iteration are not errors here; they are recorded
/// in the iteration outcome and the run continues.
#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("long-term memory unavailable: {0}")]
    Memory(#[from] MemoryError),

    #[error("invalid optimization configuration: {0}")]
    InvalidConfig(String),
}

impl OptimizationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            OptimizationError::Memory(e) => e.error_code(),
            OptimizationError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

/// Top-level error for the agent facade and runner.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Optimization(#[from] OptimizationError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl AgentError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "CONFIG_ERROR",
            AgentError::Registry(_) => "REGISTRY_ERROR",
            AgentError::Session(e) => e.error_code(),
            AgentError::Optimization(e) => e.error_code(),
            AgentError::Model(_) => codes::MODEL_ERROR,
            AgentError::Tool(e) => e.error_code(),
            AgentError::Memory(e) => e.error_code(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Model(e) => e.is_retryable(),
            AgentError::Tool(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::NotFound("session_x".to_string());
        assert_eq!(err.to_string(), "Session 'session_x' not found");
        assert_eq!(AgentError::from(err).error_code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn test_codes_pass_through() {
        let err = AgentError::from(ToolError::NotFound("x".to_string()));
        assert_eq!(err.error_code(), codes::TOOL_NOT_FOUND);

        let err = AgentError::from(ModelError::RateLimited);
        assert_eq!(err.error_code(), codes::MODEL_ERROR);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_persistence_failure_is_fatal_code() {
        let err = OptimizationError::from(MemoryError::Persistence {
            store: "long-term".to_string(),
            path: "/nope".into(),
            message: "denied".to_string(),
        });
        assert_eq!(err.error_code(), codes::PERSISTENCE_ERROR);
    }
}
