//! # ObscureX Agent
//!
//! Orchestration on top of [`obscurex_core`] and [`obscurex_tools`]:
//!
//! - [`Dispatcher`]: name-based tool invocation with timeouts, panic
//!   isolation and model gating, always answering with a `ToolEnvelope`
//! - [`OptimizationLoop`]: the generate/evaluate/keep-if-better cycle over
//!   the pipeline tools, persisting the best artifact in long-term memory
//! - [`LlmAgent`] and [`Runner`]: a tool-using conversational agent and its
//!   session-aware request/response boundary
//! - [`Agent`]: everything above assembled from an [`AgentConfig`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use obscurex_agent::{Agent, AgentConfigBuilder, OptimizationConfig};
//!
//! # async fn run() -> Result<(), obscurex_agent::AgentError> {
//! let agent = Agent::from_config(AgentConfigBuilder::from_env()?.build()?)?;
//! let report = agent.run_optimization_loop(OptimizationConfig::default()).await?;
//! println!("best objective: {}", report.best_objective);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod llm_agent;
pub mod optimizer;
pub mod provider;
pub mod runner;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::Agent;
pub use config::{AgentConfig, AgentConfigBuilder, ConfigError, OptimizationConfig};
pub use dispatcher::{Dispatcher, ToolCall};
pub use error::{AgentError, AgentResult, OptimizationError, SessionError};
pub use llm_agent::{AgentResponse, LlmAgent, ToolCallRecord};
pub use optimizer::{
    BestState, CancellationFlag, IterationOutcome, IterationRecord, OptimizationLoop, RunReport,
    Termination,
};
pub use provider::AnthropicModel;
pub use runner::{QueryMetadata, QueryRequest, QueryResponse, Runner};
pub use session::{InMemorySessionService, MessageRole, Session, SessionMessage};
