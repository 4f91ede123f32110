//! # ObscureX
//!
//! ObscureX is a tool-dispatching agent harness. Heterogeneous operations
//! (memory access, ML pipeline generation and evaluation, market analysis,
//! model-assisted decisions) are exposed as named tools behind one
//! `execute(params, context)` contract, and an optimization loop drives the
//! generation and evaluation tools toward a numeric objective, keeping the
//! best artifact in versioned long-term memory.
//!
//! ## Crates
//!
//! - [`core`]: tool contract, execution context, memory stores, model interface
//! - [`tools`]: registry and standard tool library
//! - [`agent`]: dispatcher, optimization loop, sessions, model backend
//!
//! ## Quick Start
//!
//! ```rust
//! use obscurex::{Dispatcher, LongTermMemory, ShortTermMemory, ToolRegistry};
//! use obscurex::core::FunctionTool;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry
//!     .register(Arc::new(FunctionTool::sync(
//!         "double",
//!         "Doubles a number",
//!         json!({"type": "object"}),
//!         |params, _ctx| Ok(json!(params["n"].as_i64().unwrap_or(0) * 2)),
//!     )))
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(
//!     Arc::new(registry),
//!     Arc::new(ShortTermMemory::ephemeral()),
//!     Arc::new(LongTermMemory::ephemeral()),
//! );
//! let envelope = dispatcher.invoke("double", json!({"n": 21})).await;
//! assert_eq!(envelope.result, Some(json!(42)));
//! # });
//! ```

pub use obscurex_agent as agent;
pub use obscurex_core as core;
pub use obscurex_tools as tools;

pub use obscurex_agent::{
    Agent, AgentConfig, AgentConfigBuilder, AgentError, CancellationFlag, Dispatcher,
    OptimizationConfig, OptimizationLoop, RunReport, Runner, Termination,
};
pub use obscurex_core::{
    ExecutionContext, LongTermMemory, MemoryStore, SessionId, ShortTermMemory, Tool, ToolEnvelope,
    ToolError,
};
pub use obscurex_tools::{ToolRegistry, standard_manifest};
