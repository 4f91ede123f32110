//! # ObscureX Core
//!
//! Core traits and types for the ObscureX agent harness.
//!
//! This crate provides the building blocks every other ObscureX crate sits on:
//!
//! - [`Tool`]: the uniform `execute(params, context)` contract, plus
//!   [`FunctionTool`] for wrapping plain or suspending closures
//! - [`ExecutionContext`]: the per-invocation capability bundle handed to tools
//! - [`memory`]: the short-term and versioned long-term file-backed stores
//! - [`llm`]: the language-model interface tools reach through their context
//! - [`error`]: the error taxonomy with stable machine codes

pub mod context;
pub mod error;
pub mod llm;
pub mod memory;
pub mod tool;

pub use context::{ExecutionContext, ModelAccess, SessionId};
pub use error::{Capability, MemoryError, ModelError, ToolError, ToolResult};
pub use llm::{
    ContentBlock, LanguageModel, LanguageModelExt, Message, ModelRequest, ModelResponse, Role,
    ToolSpec, Usage,
};
pub use memory::{
    LongTermEntry, LongTermMemory, MemoryKind, MemoryStore, Metadata, ShortTermEntry,
    ShortTermMemory, WriteReceipt,
};
pub use tool::{FunctionTool, Tool, ToolCategory, ToolDescriptor, ToolEnvelope};
