//! Language-model backends.

pub mod anthropic;

pub use anthropic::AnthropicModel;
