//! The assembled agent: persistent stores, the standard tool registry, an
//! optional language model and the dispatcher binding them together.

use std::sync::Arc;

use obscurex_core::{
    LanguageModel, LongTermMemory, ModelError, SessionId, ShortTermMemory, ToolDescriptor,
    ToolEnvelope,
};
use obscurex_tools::{PopulationReport, ToolRegistry, standard_manifest};
use serde_json::Value;

use crate::config::{AgentConfig, OptimizationConfig};
use crate::dispatcher::Dispatcher;
use crate::error::AgentResult;
use crate::llm_agent::LlmAgent;
use crate::optimizer::{CancellationFlag, OptimizationLoop, RunReport};
use crate::runner::Runner;
use crate::session::InMemorySessionService;

pub const DEFAULT_AGENT_NAME: &str = "obscurex";

pub struct Agent {
    config: AgentConfig,
    dispatcher: Dispatcher,
    population: PopulationReport,
    sessions: Arc<InMemorySessionService>,
}

impl Agent {
    /// Open the stores, load the standard tools and connect the configured
    /// model backend, if any.
    pub fn from_config(config: AgentConfig) -> AgentResult<Self> {
        let model = crate::provider::AnthropicModel::from_config(&config)?
            .map(|backend| Arc::new(backend) as Arc<dyn LanguageModel>);
        Ok(Self::with_model(config, model))
    }

    /// Like [`Agent::from_config`] with an explicit model backend.
    pub fn with_model(config: AgentConfig, model: Option<Arc<dyn LanguageModel>>) -> Self {
        let short_term = Arc::new(ShortTermMemory::open(&config.short_term_path));
        let long_term = Arc::new(
            LongTermMemory::open(&config.long_term_path).with_max_history(config.max_history),
        );

        let mut registry = ToolRegistry::new();
        let population = registry.populate(standard_manifest(&config.standard_tools()));
        for skipped in &population.skipped {
            tracing::warn!(tool = %skipped.name, reason = %skipped.reason, "Tool not loaded");
        }
        tracing::info!(
            loaded = population.loaded.len(),
            skipped = population.skipped.len(),
            model = model.as_ref().map(|m| m.model_name()).unwrap_or("none"),
            "Agent initialized"
        );

        let dispatcher = Dispatcher::new(Arc::new(registry), short_term, long_term)
            .with_session(SessionId::generate())
            .with_model(model)
            .with_default_timeout(config.tool_timeout);

        Self {
            config,
            dispatcher,
            population,
            sessions: Arc::new(InMemorySessionService::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn population_report(&self) -> &PopulationReport {
        &self.population
    }

    pub fn has_model(&self) -> bool {
        self.dispatcher.model().is_some()
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.dispatcher.list_tools()
    }

    pub async fn execute_tool(&self, name: &str, params: Value) -> ToolEnvelope {
        self.dispatcher.invoke(name, params).await
    }

    pub async fn run_optimization_loop(&self, config: OptimizationConfig) -> AgentResult<RunReport> {
        self.run_optimization_loop_until(config, CancellationFlag::new())
            .await
    }

    /// Run the loop, stopping between iterations once `cancel` is set.
    pub async fn run_optimization_loop_until(
        &self,
        config: OptimizationConfig,
        cancel: CancellationFlag,
    ) -> AgentResult<RunReport> {
        let report = OptimizationLoop::new(&self.dispatcher, config)
            .with_cancellation(cancel)
            .run()
            .await?;
        Ok(report)
    }

    /// A conversational runner over this agent's tools. Sessions are shared
    /// between runners created from the same agent.
    pub fn runner(&self) -> AgentResult<Runner> {
        let model = self
            .dispatcher
            .model()
            .cloned()
            .ok_or_else(|| ModelError::NotConfigured("no API key configured".to_string()))?;
        let agent = LlmAgent::new(DEFAULT_AGENT_NAME, model, self.dispatcher.clone());
        Ok(Runner::with_sessions(agent, Arc::clone(&self.sessions)))
    }
}
