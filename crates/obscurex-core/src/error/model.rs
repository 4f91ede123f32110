//! Language-model backend errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("language model not configured: {0}")]
    NotConfigured(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by model provider")]
    RateLimited,

    #[error("authentication with model provider failed")]
    Authentication,

    #[error("failed to parse model response: {0}")]
    Parse(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Network(_) | ModelError::RateLimited => true,
            ModelError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
