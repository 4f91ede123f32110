use obscurex_core::{ToolError, ToolResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode tool parameters into a typed struct. `null` decodes like `{}`.
pub fn decode<T: DeserializeOwned>(tool: &str, params: Value) -> ToolResult<T> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| ToolError::invalid_parameters(tool, e.to_string()))
}

/// Reject an empty or whitespace-only required string.
pub fn non_empty<'a>(tool: &str, field: &str, value: &'a str) -> ToolResult<&'a str> {
    if value.trim().is_empty() {
        Err(ToolError::invalid_parameters(
            tool,
            format!("'{field}' must not be empty"),
        ))
    } else {
        Ok(value)
    }
}

/// Render a JSON value the way prompts show it: strings bare, the rest as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}
