//! Language-model interface.
//!
//! Tools never talk to a provider directly: they receive an
//! `Arc<dyn LanguageModel>` through their [`ExecutionContext`] when they are
//! allowed to, and use the [`LanguageModelExt`] helpers for the common
//! single-prompt shapes (code, free text, JSON decision).
//!
//! [`ExecutionContext`]: crate::ExecutionContext

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ModelResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

impl ModelRequest {
    pub const DEFAULT_MAX_TOKENS: u32 = 1024;

    /// A single user prompt with an optional system prompt.
    pub fn prompt(prompt: impl Into<String>, system: Option<&str>) -> Self {
        Self {
            system: system.map(str::to_string),
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

impl ModelResponse {
    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// The `tool_use` blocks as `(id, name, input)`.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: ModelRequest) -> ModelResult<ModelResponse>;
}

/// Single-prompt helpers available on every [`LanguageModel`].
#[async_trait]
pub trait LanguageModelExt: LanguageModel {
    /// Generate source code; markdown fences are stripped from the reply.
    async fn generate_code(&self, prompt: &str, system: &str, max_tokens: u32) -> ModelResult<String> {
        let request = ModelRequest::prompt(prompt, Some(system)).with_max_tokens(max_tokens);
        let response = self.complete(request).await?;
        Ok(strip_code_fences(&response.text()))
    }

    async fn generate_text(&self, prompt: &str, system: &str, max_tokens: u32) -> ModelResult<String> {
        let request = ModelRequest::prompt(prompt, Some(system)).with_max_tokens(max_tokens);
        let response = self.complete(request).await?;
        Ok(response.text().trim().to_string())
    }

    /// Ask for a JSON decision. Falls back to `{"response", "parsed": false}`
    /// when the reply holds no parseable JSON.
    async fn analyze_and_decide(&self, prompt: &str, system: &str, max_tokens: u32) -> ModelResult<Value> {
        let request = ModelRequest::prompt(prompt, Some(system)).with_max_tokens(max_tokens);
        let response = self.complete(request).await?;
        Ok(parse_decision(&response.text()))
    }
}

impl<T: LanguageModel + ?Sized> LanguageModelExt for T {}

/// Remove markdown code fences (with or without a language tag).
pub fn strip_code_fences(text: &str) -> String {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    match FENCE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_+-]*\n?").ok()) {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Extract a JSON decision from a model reply.
pub fn parse_decision(text: &str) -> Value {
    static JSON_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
    static ANY_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();

    let json_block = JSON_BLOCK.get_or_init(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").ok());
    let any_block = ANY_BLOCK.get_or_init(|| Regex::new(r"```\s*([\s\S]*?)\s*```").ok());

    let fenced = [json_block, any_block]
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str()));

    let candidate = fenced.unwrap_or(text);
    serde_json::from_str(candidate.trim()).unwrap_or_else(|_| {
        json!({
            "response": text,
            "parsed": false,
        })
    })
}
