//! Error Types
//!
//! Domain-specific failures for the ObscureX harness. Every error carries a
//! human-readable message and a stable machine code so callers (the
//! dispatcher envelope, the CLI, log pipelines) can classify failures
//! without string matching.
//!
//! The error types are organized into focused submodules:
//! - `tool`: tool execution, capability and timeout errors
//! - `memory`: memory store and snapshot persistence errors
//! - `model`: language-model backend errors

mod memory;
mod model;
mod tool;

pub use memory::{MemoryError, MemoryResult};
pub use model::{ModelError, ModelResult};
pub use tool::{Capability, ToolError, ToolResult};

/// Stable error codes shared by every error type in the harness.
pub mod codes {
    pub const TOOL_NOT_FOUND: &str = "TOOL_NOT_FOUND";
    pub const TOOL_EXECUTION_ERROR: &str = "TOOL_EXECUTION_ERROR";
    pub const INVALID_PARAMETERS: &str = "INVALID_PARAMETERS";
    pub const CAPABILITY_UNAVAILABLE: &str = "CAPABILITY_UNAVAILABLE";
    pub const PERSISTENCE_ERROR: &str = "PERSISTENCE_ERROR";
    pub const MEMORY_ERROR: &str = "MEMORY_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const MODEL_ERROR: &str = "MODEL_ERROR";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tool_not_found_message() {
        let error = ToolError::NotFound("x".to_string());
        assert_eq!(error.to_string(), "Tool 'x' not found");
        assert_eq!(error.error_code(), codes::TOOL_NOT_FOUND);
    }

    #[test]
    fn test_timeout_error_code() {
        let error = ToolError::Timeout {
            tool: "testMLPipeline".to_string(),
            after: Duration::from_secs(300),
        };
        assert_eq!(error.error_code(), codes::TIMEOUT);
        assert!(error.to_string().contains("testMLPipeline"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_capability_unavailable_message() {
        let error = ToolError::capability_unavailable(
            Capability::LanguageModel,
            "no API key configured",
        );
        assert_eq!(error.error_code(), codes::CAPABILITY_UNAVAILABLE);
        assert_eq!(
            error.to_string(),
            "language model capability unavailable: no API key configured"
        );
    }

    #[test]
    fn test_memory_error_converts_into_tool_error() {
        let error: ToolError = MemoryError::LockPoisoned {
            store: "long-term".to_string(),
        }
        .into();
        assert_eq!(error.error_code(), codes::MEMORY_ERROR);
        assert!(error.to_string().contains("long-term"));
    }

    #[test]
    fn test_model_error_retryable() {
        assert!(ModelError::RateLimited.is_retryable());
        assert!(ModelError::Network("reset".into()).is_retryable());
        assert!(!ModelError::Authentication.is_retryable());
    }
}
