//! Per-invocation capability bundle.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Capability, ToolError, ToolResult};
use crate::llm::LanguageModel;
use crate::memory::{LongTermMemory, MemoryKind, MemoryStore, ShortTermMemory};

/// Identifier of the session a tool call runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `session_<unix-millis>_<8 hex>`
    pub fn generate() -> Self {
        Self(format!(
            "session_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            random_suffix()
        ))
    }

    /// `session_<user>_<unix-millis>_<8 hex>`
    pub fn generate_for_user(user_id: &str) -> Self {
        Self(format!(
            "session_{}_{}_{}",
            user_id,
            chrono::Utc::now().timestamp_millis(),
            random_suffix()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn random_suffix() -> String {
    format!("{:08x}", rand::random::<u32>())
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Whether a tool may reach the language model.
#[derive(Clone)]
pub enum ModelAccess {
    Granted(Arc<dyn LanguageModel>),
    /// The tool is allowed, but no backend is configured.
    NotConfigured,
    /// The tool is not on the model allow-list.
    Denied,
}

impl fmt::Debug for ModelAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelAccess::Granted(model) => write!(f, "Granted({})", model.model_name()),
            ModelAccess::NotConfigured => write!(f, "NotConfigured"),
            ModelAccess::Denied => write!(f, "Denied"),
        }
    }
}

/// The capabilities handed to one tool invocation.
///
/// Built fresh by the dispatcher for every call. Tools reach memory, the
/// session id, persistence and (when allowed) the language model only
/// through this value. Cloning is cheap; the stores are shared.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    tool: String,
    session_id: SessionId,
    short_term: Arc<ShortTermMemory>,
    long_term: Arc<LongTermMemory>,
    model: ModelAccess,
}

impl ExecutionContext {
    pub fn new(
        tool: impl Into<String>,
        session_id: SessionId,
        short_term: Arc<ShortTermMemory>,
        long_term: Arc<LongTermMemory>,
        model: ModelAccess,
    ) -> Self {
        Self {
            tool: tool.into(),
            session_id,
            short_term,
            long_term,
            model,
        }
    }

    /// A context over fresh in-memory stores with no model access.
    pub fn ephemeral(tool: impl Into<String>) -> Self {
        Self::new(
            tool,
            SessionId::generate(),
            Arc::new(ShortTermMemory::ephemeral()),
            Arc::new(LongTermMemory::ephemeral()),
            ModelAccess::NotConfigured,
        )
    }

    pub fn with_model(mut self, model: ModelAccess) -> Self {
        self.model = model;
        self
    }

    pub fn tool_name(&self) -> &str {
        &self.tool
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }

    pub fn long_term(&self) -> &LongTermMemory {
        &self.long_term
    }

    /// The language model, if this tool may use it and one is configured.
    pub fn model(&self) -> ToolResult<Arc<dyn LanguageModel>> {
        match &self.model {
            ModelAccess::Granted(model) => Ok(Arc::clone(model)),
            ModelAccess::NotConfigured => Err(ToolError::capability_unavailable(
                Capability::LanguageModel,
                "AI (Anthropic Claude API) is required. Please provide an API key.",
            )),
            ModelAccess::Denied => Err(ToolError::capability_unavailable(
                Capability::LanguageModel,
                format!("tool '{}' is not permitted to use the language model", self.tool),
            )),
        }
    }

    pub fn has_model(&self) -> bool {
        matches!(self.model, ModelAccess::Granted(_))
    }

    /// Flush one store to its backing file.
    pub fn save(&self, kind: MemoryKind) -> ToolResult<()> {
        match kind {
            MemoryKind::ShortTerm => self.short_term.flush()?,
            MemoryKind::LongTerm => self.long_term.flush()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::llm::{ModelRequest, ModelResponse};
    use crate::memory::Metadata;
    use async_trait::async_trait;
    use serde_json::json;

    struct NullModel;

    #[async_trait]
    impl LanguageModel for NullModel {
        fn model_name(&self) -> &str {
            "null"
        }

        async fn complete(&self, _request: ModelRequest) -> crate::error::ModelResult<ModelResponse> {
            Err(crate::ModelError::NotConfigured("null".into()))
        }
    }

    #[test]
    fn test_session_id_formats() {
        let id = SessionId::generate();
        let parts: Vec<_> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);

        let user = SessionId::generate_for_user("alice");
        assert!(user.as_str().starts_with("session_alice_"));
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_denied_model_access() {
        let ctx = ExecutionContext::ephemeral("storeMemory").with_model(ModelAccess::Denied);
        let err = ctx.model().err().unwrap();
        assert_eq!(err.error_code(), codes::CAPABILITY_UNAVAILABLE);
        assert!(err.to_string().contains("storeMemory"));
        assert!(!ctx.has_model());
    }

    #[test]
    fn test_unconfigured_model_access() {
        let ctx = ExecutionContext::ephemeral("generateMLPipeline");
        let err = ctx.model().err().unwrap();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_granted_model_access() {
        let ctx = ExecutionContext::ephemeral("analyzeContext")
            .with_model(ModelAccess::Granted(Arc::new(NullModel)));
        assert!(ctx.has_model());
        assert_eq!(ctx.model().unwrap().model_name(), "null");
    }

    #[test]
    fn test_clones_share_stores() {
        let ctx = ExecutionContext::ephemeral("t");
        let other = ctx.clone();
        ctx.short_term().put("k", json!(1), Metadata::new()).unwrap();
        assert!(other.short_term().get("k").unwrap().is_some());
        assert!(other.save(MemoryKind::ShortTerm).is_ok());
    }
}
