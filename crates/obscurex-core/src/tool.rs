//! Tool contract and adapters.
//!
//! A [`Tool`] is a named, schema-described unit of work. Every tool presents
//! the same suspending `execute(params, context)` calling convention, whether
//! its body is synchronous or not; [`FunctionTool`] adapts both kinds of
//! closure to that convention.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::context::ExecutionContext;
use crate::error::{ToolError, ToolResult};

/// Grouping used when listing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Memory,
    Csv,
    Ml,
    Market,
    Analysis,
    Autonomy,
    General,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Memory => "memory",
            ToolCategory::Csv => "csv",
            ToolCategory::Ml => "ml",
            ToolCategory::Market => "market",
            ToolCategory::Analysis => "analysis",
            ToolCategory::Autonomy => "autonomy",
            ToolCategory::General => "general",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The externally visible description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub category: ToolCategory,
}

/// A named unit of work invoked through the dispatcher.
///
/// Implementations receive their parameters as JSON and reach shared state
/// only through the [`ExecutionContext`]. Failures are reported as
/// [`ToolError`]s; the dispatcher turns them into a failed [`ToolEnvelope`].
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use obscurex_core::{ExecutionContext, Tool, ToolResult};
/// use serde_json::{Value, json};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Tool for Echo {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Returns its parameters unchanged" }
///     fn parameters_schema(&self) -> Value { json!({"type": "object"}) }
///
///     async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
///         Ok(params)
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used for registration and dispatch.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema (an object schema) describing the accepted parameters.
    fn parameters_schema(&self) -> Value;

    fn category(&self) -> ToolCategory {
        ToolCategory::General
    }

    /// Wall-clock budget for one call. `None` defers to the dispatcher default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            category: self.category(),
        }
    }
}

/// Uniform success/failure wrapper returned by every dispatch.
///
/// Serializes as `{success, tool, result}` on success and
/// `{success, tool, error, error_kind}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub success: bool,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ToolEnvelope {
    pub fn success(tool: impl Into<String>, result: Value) -> Self {
        Self {
            success: true,
            tool: tool.into(),
            result: Some(result),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(tool: impl Into<String>, error: &ToolError) -> Self {
        let mut message = error.to_string();
        if message.is_empty() {
            message = "tool execution failed".to_string();
        }
        Self {
            success: false,
            tool: tool.into(),
            result: None,
            error: Some(message),
            error_kind: Some(error.error_code().to_string()),
        }
    }

    /// The result payload, or the error message as a `ToolError`.
    pub fn into_result(self) -> ToolResult<Value> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(ToolError::ExecutionFailed(
                self.error.unwrap_or_else(|| "tool execution failed".to_string()),
            ))
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"success": self.success, "tool": self.tool}))
    }
}

type SyncHandler = dyn Fn(Value, &ExecutionContext) -> ToolResult<Value> + Send + Sync;
type SuspendingHandler =
    dyn Fn(Value, ExecutionContext) -> BoxFuture<'static, ToolResult<Value>> + Send + Sync;

#[derive(Clone)]
enum Handler {
    Sync(Arc<SyncHandler>),
    Suspending(Arc<SuspendingHandler>),
}

/// A tool backed by a closure.
///
/// ```rust
/// use obscurex_core::{FunctionTool, ToolError};
/// use serde_json::json;
///
/// let upper = FunctionTool::sync(
///     "uppercase",
///     "Uppercases the `text` parameter",
///     FunctionTool::infer_schema(&["text"]),
///     |params, _ctx| {
///         let text = params["text"]
///             .as_str()
///             .ok_or_else(|| ToolError::invalid_parameters("uppercase", "text is required"))?;
///         Ok(json!(text.to_uppercase()))
///     },
/// );
/// ```
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    schema: Value,
    category: ToolCategory,
    timeout: Option<Duration>,
    handler: Handler,
}

impl FunctionTool {
    /// Wrap a synchronous closure.
    pub fn sync<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, &ExecutionContext) -> ToolResult<Value> + Send + Sync + 'static,
    {
        Self::with_handler(name, description, schema, Handler::Sync(Arc::new(handler)))
    }

    /// Wrap a closure returning a future. The closure receives its own copy
    /// of the context so the future can own it.
    pub fn suspending<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        let boxed: Arc<SuspendingHandler> = Arc::new(move |params, ctx| Box::pin(handler(params, ctx)));
        Self::with_handler(name, description, schema, Handler::Suspending(boxed))
    }

    fn with_handler(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: Handler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            category: ToolCategory::General,
            timeout: None,
            handler,
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Object schema whose properties are all required strings.
    pub fn infer_schema(params: &[&str]) -> Value {
        let properties: Map<String, Value> = params
            .iter()
            .map(|name| (name.to_string(), json!({"type": "string"})))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": params,
        })
    }

    pub fn is_suspending(&self) -> bool {
        matches!(self.handler, Handler::Suspending(_))
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("suspending", &self.is_suspending())
            .finish()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        match &self.handler {
            Handler::Sync(f) => f(params, ctx),
            Handler::Suspending(f) => f(params, ctx.clone()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper_tool() -> FunctionTool {
        FunctionTool::sync(
            "uppercase",
            "Uppercases text",
            FunctionTool::infer_schema(&["text"]),
            |params, _ctx| {
                let text = params["text"]
                    .as_str()
                    .ok_or_else(|| ToolError::invalid_parameters("uppercase", "text is required"))?;
                Ok(json!(text.to_uppercase()))
            },
        )
    }

    #[tokio::test]
    async fn test_sync_handler_executes() {
        let ctx = ExecutionContext::ephemeral("uppercase");
        let result = upper_tool().execute(json!({"text": "abc"}), &ctx).await.unwrap();
        assert_eq!(result, json!("ABC"));
    }

    #[tokio::test]
    async fn test_suspending_handler_can_use_context() {
        let tool = FunctionTool::suspending(
            "whoami",
            "Returns the session id",
            json!({"type": "object"}),
            |_params, ctx| async move {
                tokio::task::yield_now().await;
                Ok(json!(ctx.session_id().as_str()))
            },
        );
        let ctx = ExecutionContext::ephemeral("whoami");
        let result = tool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(result, json!(ctx.session_id().as_str()));
        assert!(tool.is_suspending());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let ctx = ExecutionContext::ephemeral("uppercase");
        let err = upper_tool().execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters { .. }));
    }

    #[test]
    fn test_infer_schema() {
        let schema = FunctionTool::infer_schema(&["a", "b"]);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["a"]["type"], "string");
        assert_eq!(schema["required"], json!(["a", "b"]));
    }

    #[test]
    fn test_descriptor_carries_category() {
        let tool = upper_tool().with_category(ToolCategory::Analysis);
        let descriptor = tool.descriptor();
        assert_eq!(descriptor.name, "uppercase");
        assert_eq!(descriptor.category, ToolCategory::Analysis);
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["category"], "analysis");
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = ToolEnvelope::success("t", json!({"x": 1})).to_value();
        assert_eq!(ok, json!({"success": true, "tool": "t", "result": {"x": 1}}));

        let failed = ToolEnvelope::failure("x", &ToolError::NotFound("x".into())).to_value();
        assert_eq!(
            failed,
            json!({
                "success": false,
                "tool": "x",
                "error": "Tool 'x' not found",
                "error_kind": "TOOL_NOT_FOUND"
            })
        );
    }

    #[test]
    fn test_failure_envelope_never_has_empty_error() {
        let envelope = ToolEnvelope::failure("t", &ToolError::execution(""));
        assert_eq!(envelope.error.as_deref(), Some("tool execution failed"));
    }
}
