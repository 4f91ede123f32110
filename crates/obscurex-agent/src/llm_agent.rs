//! Tool-using conversational agent.
//!
//! The registered tools are offered to the model as tool specs. Every
//! `tool_use` block the model emits is executed through the [`Dispatcher`]
//! and answered with a `tool_result` block, for at most `max_tool_rounds`
//! rounds.

use std::sync::Arc;

use obscurex_core::error::ModelResult;
use obscurex_core::{
    ContentBlock, LanguageModel, Message, ModelRequest, Role, SessionId, ToolEnvelope, ToolSpec,
    Usage,
};
use serde::Serialize;
use serde_json::Value;

use crate::dispatcher::Dispatcher;

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 4;

/// One tool call made while answering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub input: Value,
    #[serde(flatten)]
    pub envelope: ToolEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub model: String,
    pub usage: Usage,
}

pub struct LlmAgent {
    name: String,
    instruction: String,
    model: Arc<dyn LanguageModel>,
    dispatcher: Dispatcher,
    tools: Vec<ToolSpec>,
    max_tool_rounds: usize,
    max_tokens: u32,
}

impl LlmAgent {
    /// An agent offering every tool registered with `dispatcher`.
    pub fn new(name: impl Into<String>, model: Arc<dyn LanguageModel>, dispatcher: Dispatcher) -> Self {
        let name = name.into();
        let tools = dispatcher
            .list_tools()
            .into_iter()
            .map(|d| ToolSpec {
                name: d.name,
                description: d.description,
                input_schema: d.parameters,
            })
            .collect();
        Self {
            instruction: format!("You are {name}, a helpful AI assistant."),
            name,
            model,
            dispatcher,
            tools,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_tokens: ModelRequest::DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Offer only the named tools.
    pub fn with_tools(mut self, names: &[&str]) -> Self {
        self.tools.retain(|spec| names.contains(&spec.name.as_str()));
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn tool_specs(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// Answer `prompt`, running requested tools in `session_id`.
    pub async fn generate(&self, prompt: &str, session_id: &SessionId) -> ModelResult<AgentResponse> {
        let mut messages = vec![Message::user(prompt)];
        let mut usage = Usage::default();
        let mut tool_calls = Vec::new();
        let mut round = 0;

        loop {
            let request = ModelRequest {
                system: Some(self.instruction.clone()),
                messages: messages.clone(),
                tools: self.tools.clone(),
                max_tokens: self.max_tokens,
            };
            let response = self.model.complete(request).await?;
            usage.add(response.usage);

            let uses: Vec<(String, String, Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            if uses.is_empty() || round >= self.max_tool_rounds {
                if !uses.is_empty() {
                    tracing::warn!(
                        agent = %self.name,
                        rounds = round,
                        "Tool round limit reached; returning partial answer"
                    );
                }
                return Ok(AgentResponse {
                    text: response.text(),
                    tool_calls,
                    model: response.model,
                    usage,
                });
            }
            round += 1;

            messages.push(Message::assistant(response.content));
            let mut results = Vec::with_capacity(uses.len());
            for (id, name, input) in uses {
                let envelope = self
                    .dispatcher
                    .invoke_in_session(&name, input.clone(), session_id)
                    .await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: tool_result_text(&envelope),
                    is_error: !envelope.success,
                });
                tool_calls.push(ToolCallRecord {
                    tool_name: name,
                    input,
                    envelope,
                });
            }
            messages.push(Message {
                role: Role::User,
                content: results,
            });
        }
    }
}

fn tool_result_text(envelope: &ToolEnvelope) -> String {
    if envelope.success {
        match &envelope.result {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    } else {
        envelope.error.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedModel, ScriptedTool};
    use obscurex_core::{LongTermMemory, ShortTermMemory};
    use obscurex_tools::ToolRegistry;
    use serde_json::json;

    fn dispatcher(tools: Vec<Arc<ScriptedTool>>) -> Dispatcher {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        Dispatcher::new(
            Arc::new(registry),
            Arc::new(ShortTermMemory::ephemeral()),
            Arc::new(LongTermMemory::ephemeral()),
        )
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let model = Arc::new(ScriptedModel::new().reply_text("Hello there"));
        let agent = LlmAgent::new("helper", model.clone(), dispatcher(vec![]));
        let response = agent.generate("hi", &SessionId::new("s")).await.unwrap();

        assert_eq!(response.text, "Hello there");
        assert!(response.tool_calls.is_empty());
        let request = &model.requests()[0];
        assert_eq!(request.system.as_deref(), Some("You are helper, a helpful AI assistant."));
        assert!(request.tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let tool = Arc::new(ScriptedTool::new("lookup").returning(json!({"price": 42})));
        let model = Arc::new(
            ScriptedModel::new()
                .reply_tool_use("tu_1", "lookup", json!({"symbol": "BTC"}))
                .reply_text("BTC is 42"),
        );
        let agent = LlmAgent::new("helper", model.clone(), dispatcher(vec![tool.clone()]));
        let response = agent.generate("price?", &SessionId::new("s")).await.unwrap();

        assert_eq!(response.text, "BTC is 42");
        assert_eq!(response.tool_calls.len(), 1);
        assert!(response.tool_calls[0].envelope.success);
        assert_eq!(tool.calls(), vec![json!({"symbol": "BTC"})]);
        assert_eq!(response.usage.input_tokens, 20);

        let second = &model.requests()[1];
        assert_eq!(second.tools[0].name, "lookup");
        assert_eq!(second.messages.len(), 3);
        assert_eq!(
            second.messages[2].content[0],
            ContentBlock::ToolResult {
                tool_use_id: "tu_1".to_string(),
                content: "{\"price\":42}".to_string(),
                is_error: false,
            }
        );
    }

    #[tokio::test]
    async fn test_tool_errors_are_returned_to_the_model() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply_tool_use("tu_1", "missing", json!({}))
                .reply_text("Sorry"),
        );
        let agent = LlmAgent::new("helper", model.clone(), dispatcher(vec![]));
        let response = agent.generate("x", &SessionId::new("s")).await.unwrap();

        assert_eq!(response.text, "Sorry");
        assert!(!response.tool_calls[0].envelope.success);
        match &model.requests()[1].messages[2].content[0] {
            ContentBlock::ToolResult { content, is_error, .. } => {
                assert!(*is_error);
                assert_eq!(content, "Tool 'missing' not found");
            }
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_round_limit() {
        let tool = Arc::new(ScriptedTool::new("loop"));
        let mut script = ScriptedModel::new();
        for i in 0..5 {
            script = script.reply_tool_use(&format!("tu_{i}"), "loop", json!({}));
        }
        let model = Arc::new(script);
        let agent = LlmAgent::new("helper", model.clone(), dispatcher(vec![tool.clone()]))
            .with_max_tool_rounds(2);
        let response = agent.generate("x", &SessionId::new("s")).await.unwrap();

        assert_eq!(tool.call_count(), 2);
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_tool_filter() {
        let agent = LlmAgent::new(
            "helper",
            Arc::new(ScriptedModel::new()),
            dispatcher(vec![Arc::new(ScriptedTool::new("a")), Arc::new(ScriptedTool::new("b"))]),
        )
        .with_tools(&["b"]);
        let names: Vec<&str> = agent.tool_specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }
}
