//! # Dispatcher
//!
//! Resolves a tool by name, builds its [`ExecutionContext`], runs it under a
//! timeout and normalizes every outcome into a [`ToolEnvelope`]. Unknown
//! tools, tool errors, timeouts and panics inside a handler all come back as
//! `success: false` envelopes; nothing a tool does escapes as a fault of the
//! dispatcher itself.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use obscurex_core::{
    ExecutionContext, LanguageModel, LongTermMemory, ModelAccess, SessionId, ShortTermMemory,
    ToolDescriptor, ToolEnvelope, ToolError,
};
use obscurex_tools::{MODEL_ALLOW_LIST, ToolRegistry};
use serde_json::Value;
use tracing::Instrument;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// One entry of a batch invocation.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: String,
    pub params: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, params: Value) -> Self {
        Self {
            tool: tool.into(),
            params,
        }
    }
}

/// Executes tools from a registry against shared process state.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    short_term: Arc<ShortTermMemory>,
    long_term: Arc<LongTermMemory>,
    session_id: SessionId,
    model: Option<Arc<dyn LanguageModel>>,
    model_allow_list: HashSet<String>,
    default_timeout: Duration,
}

impl Dispatcher {
    /// A dispatcher with a fresh session id, no model and the standard
    /// model allow-list.
    pub fn new(
        registry: Arc<ToolRegistry>,
        short_term: Arc<ShortTermMemory>,
        long_term: Arc<LongTermMemory>,
    ) -> Self {
        Self {
            registry,
            short_term,
            long_term,
            session_id: SessionId::generate(),
            model: None,
            model_allow_list: MODEL_ALLOW_LIST.iter().map(|s| s.to_string()).collect(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_model(mut self, model: Option<Arc<dyn LanguageModel>>) -> Self {
        self.model = model;
        self
    }

    /// Replace the set of tools that may reach the language model.
    pub fn with_model_allow_list<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model_allow_list = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Budget for tools that do not declare their own timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn short_term(&self) -> &Arc<ShortTermMemory> {
        &self.short_term
    }

    pub fn long_term(&self) -> &Arc<LongTermMemory> {
        &self.long_term
    }

    pub fn model(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.model.as_ref()
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list()
    }

    fn model_access(&self, tool: &str) -> ModelAccess {
        if !self.model_allow_list.contains(tool) {
            return ModelAccess::Denied;
        }
        match &self.model {
            Some(model) => ModelAccess::Granted(Arc::clone(model)),
            None => ModelAccess::NotConfigured,
        }
    }

    /// The capability bundle for one invocation of `tool`.
    pub fn context_for(&self, tool: &str, session_id: &SessionId) -> ExecutionContext {
        ExecutionContext::new(
            tool,
            session_id.clone(),
            Arc::clone(&self.short_term),
            Arc::clone(&self.long_term),
            self.model_access(tool),
        )
    }

    /// Invoke a tool in the dispatcher's own session.
    pub async fn invoke(&self, tool_name: &str, params: Value) -> ToolEnvelope {
        self.invoke_in_session(tool_name, params, &self.session_id)
            .await
    }

    /// Invoke a tool on behalf of a specific session.
    pub async fn invoke_in_session(
        &self,
        tool_name: &str,
        params: Value,
        session_id: &SessionId,
    ) -> ToolEnvelope {
        let span = tracing::info_span!(
            "tool_execution",
            tool.name = %tool_name,
            session.id = %session_id,
        );
        self.run(tool_name, params, session_id)
            .instrument(span)
            .await
    }

    async fn run(&self, tool_name: &str, params: Value, session_id: &SessionId) -> ToolEnvelope {
        let Some(tool) = self.registry.resolve(tool_name) else {
            let error = ToolError::NotFound(tool_name.to_string());
            tracing::warn!(error = %error, "Dispatch to unknown tool");
            return ToolEnvelope::failure(tool_name, &error);
        };

        let ctx = self.context_for(tool_name, session_id);
        let budget = tool.timeout().unwrap_or(self.default_timeout);
        let started = Instant::now();

        let execution = AssertUnwindSafe(tool.execute(params, &ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(budget, execution).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ToolError::execution(format!(
                "tool '{tool_name}' panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(ToolError::Timeout {
                tool: tool_name.to_string(),
                after: budget,
            }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                tracing::debug!(elapsed_ms, "Tool succeeded");
                ToolEnvelope::success(tool_name, result)
            }
            Err(error) => {
                tracing::warn!(
                    elapsed_ms,
                    error = %error,
                    error_kind = error.error_code(),
                    "Tool failed"
                );
                ToolEnvelope::failure(tool_name, &error)
            }
        }
    }

    /// Invoke several tools concurrently; envelopes come back in call order.
    pub async fn invoke_batch(&self, calls: Vec<ToolCall>) -> Vec<ToolEnvelope> {
        join_all(
            calls
                .into_iter()
                .map(|call| async move { self.invoke(&call.tool, call.params).await }),
        )
        .await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
