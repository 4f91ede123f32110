//! Session-aware request/response boundary over an [`LlmAgent`].
//!
//! This is the shape a host (the CLI, an HTTP endpoint) binds to:
//! `create_session(user)` and `query(request) -> response`.

use std::sync::Arc;

use obscurex_core::{Metadata, SessionId, Usage};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AgentResult;
use crate::llm_agent::{LlmAgent, ToolCallRecord};
use crate::session::{InMemorySessionService, MessageRole, SessionMessage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub prompt: String,
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            user_id: user_id.into(),
            session_id: None,
        }
    }

    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetadata {
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub session_id: SessionId,
    pub response: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub metadata: QueryMetadata,
}

pub struct Runner {
    agent: LlmAgent,
    sessions: Arc<InMemorySessionService>,
}

impl Runner {
    pub fn new(agent: LlmAgent) -> Self {
        Self::with_sessions(agent, Arc::new(InMemorySessionService::new()))
    }

    pub fn with_sessions(agent: LlmAgent, sessions: Arc<InMemorySessionService>) -> Self {
        Self { agent, sessions }
    }

    pub fn agent(&self) -> &LlmAgent {
        &self.agent
    }

    pub fn sessions(&self) -> &InMemorySessionService {
        &self.sessions
    }

    pub async fn create_session(&self, user_id: &str) -> AgentResult<SessionId> {
        Ok(self.sessions.create_session(user_id, None).await?)
    }

    /// Answer a prompt within a session, creating (or adopting a caller-chosen
    /// id for) the session when needed.
    pub async fn query(&self, request: QueryRequest) -> AgentResult<QueryResponse> {
        let session_id = match request.session_id {
            Some(id) if self.sessions.contains(&id).await => id,
            Some(id) => self.sessions.create_session(&request.user_id, Some(id)).await?,
            None => self.sessions.create_session(&request.user_id, None).await?,
        };

        self.sessions
            .add_message(&session_id, MessageRole::User, request.prompt.as_str())
            .await?;

        let answer = self.agent.generate(&request.prompt, &session_id).await?;

        self.sessions
            .add_message(&session_id, MessageRole::Assistant, answer.text.as_str())
            .await?;

        let mut metadata = Metadata::new();
        metadata.insert("last_prompt".to_string(), json!(request.prompt));
        metadata.insert(
            "last_response".to_string(),
            serde_json::to_value(&answer).unwrap_or_else(|_| json!(answer.text)),
        );
        self.sessions.update_session(&session_id, metadata).await?;

        tracing::info!(
            session.id = %session_id,
            tool_calls = answer.tool_calls.len(),
            "Query answered"
        );
        Ok(QueryResponse {
            session_id,
            response: answer.text,
            tool_calls: answer.tool_calls,
            metadata: QueryMetadata {
                model: answer.model,
                usage: answer.usage,
            },
        })
    }

    pub async fn session_history(&self, session_id: &SessionId) -> Vec<SessionMessage> {
        self.sessions.get_messages(session_id).await
    }

    /// Returns whether the session exists.
    pub async fn clear_session(&self, session_id: &SessionId) -> bool {
        self.sessions.clear_messages(session_id).await
    }
}
