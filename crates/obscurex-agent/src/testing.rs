//! Scripted test doubles for the model backend and for tools.
//!
//! Enabled with the `testing` feature (and always in this crate's own tests).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use obscurex_core::error::ModelResult;
use obscurex_core::{
    ContentBlock, ExecutionContext, LanguageModel, ModelError, ModelRequest, ModelResponse, Tool,
    ToolCategory, ToolError, ToolResult, Usage,
};
use serde_json::{Value, json};

/// A language model that replays queued replies in order.
///
/// Once the script runs out every call fails with
/// [`ModelError::NotConfigured`].
pub struct ScriptedModel {
    name: String,
    replies: Mutex<VecDeque<ModelResult<ModelResponse>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            name: "scripted-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push(self, reply: ModelResult<ModelResponse>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    fn response(&self, content: Vec<ContentBlock>, stop_reason: &str) -> ModelResponse {
        ModelResponse {
            model: self.name.clone(),
            content,
            stop_reason: Some(stop_reason.to_string()),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    pub fn reply_text(self, text: impl Into<String>) -> Self {
        let response = self.response(vec![ContentBlock::text(text)], "end_turn");
        self.push(Ok(response))
    }

    /// A reply asking for one tool call.
    pub fn reply_tool_use(self, id: &str, tool: &str, input: Value) -> Self {
        let response = self.response(
            vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: tool.to_string(),
                input,
            }],
            "tool_use",
        );
        self.push(Ok(response))
    }

    pub fn fail(self, error: ModelError) -> Self {
        self.push(Err(error))
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ModelRequest) -> ModelResult<ModelResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| Err(ModelError::NotConfigured("script exhausted".to_string())))
    }
}

/// A tool that replays queued results and records the parameters it saw.
///
/// With an empty script it echoes `{"echo": params}`.
pub struct ScriptedTool {
    name: String,
    category: ToolCategory,
    results: Mutex<VecDeque<ToolResult<Value>>>,
    calls: Mutex<Vec<Value>>,
}

impl ScriptedTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: ToolCategory::General,
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    pub fn returning(self, value: Value) -> Self {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(Ok(value));
        }
        self
    }

    pub fn failing(self, message: impl Into<String>) -> Self {
        if let Ok(mut results) = self.results.lock() {
            results.push_back(Err(ToolError::execution(message)));
        }
        self
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Scripted test tool"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(params.clone());
        }
        let next = self
            .results
            .lock()
            .ok()
            .and_then(|mut results| results.pop_front());
        next.unwrap_or_else(|| Ok(json!({"echo": params})))
    }
}
