//! Tool execution errors.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::codes;
use super::memory::MemoryError;
use super::model::ModelError;

/// Backend capabilities a tool may require from its execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    LanguageModel,
    ShortTermMemory,
    LongTermMemory,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::LanguageModel => write!(f, "language model"),
            Capability::ShortTermMemory => write!(f, "short-term memory"),
            Capability::LongTermMemory => write!(f, "long-term memory"),
        }
    }
}

/// Failures a tool may report through its `execute` result.
///
/// The dispatcher converts every variant into a failed envelope; none of
/// them ever escape a dispatch call as a fault of the dispatcher itself.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool name did not resolve against the registry.
    #[error("Tool '{0}' not found")]
    NotFound(String),

    /// The parameters did not match the tool's schema.
    #[error("invalid parameters for '{tool}': {message}")]
    InvalidParameters { tool: String, message: String },

    /// The tool ran and failed.
    #[error("{0}")]
    ExecutionFailed(String),

    /// The tool required a capability its context does not carry.
    #[error("{capability} capability unavailable: {reason}")]
    CapabilityUnavailable {
        capability: Capability,
        reason: String,
    },

    /// The tool exceeded its wall-clock budget.
    #[error("tool '{tool}' timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn invalid_parameters(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::InvalidParameters {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        ToolError::ExecutionFailed(message.into())
    }

    pub fn capability_unavailable(capability: Capability, reason: impl Into<String>) -> Self {
        ToolError::CapabilityUnavailable {
            capability,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code, carried in the envelope as `error_kind`.
    pub fn error_code(&self) -> &'static str {
        match self {
            ToolError::NotFound(_) => codes::TOOL_NOT_FOUND,
            ToolError::InvalidParameters { .. } => codes::INVALID_PARAMETERS,
            ToolError::ExecutionFailed(_) | ToolError::Io(_) => codes::TOOL_EXECUTION_ERROR,
            ToolError::CapabilityUnavailable { .. } => codes::CAPABILITY_UNAVAILABLE,
            ToolError::Timeout { .. } => codes::TIMEOUT,
            ToolError::Memory(e) => e.error_code(),
            ToolError::Model(_) => codes::MODEL_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::Timeout { .. } => true,
            ToolError::Model(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
