//! # Memory Tools
//!
//! Store, retrieve and search the short-term and long-term stores carried by
//! the execution context. Retrieving a missing key is not a tool failure: the
//! result reports `success: false` with a message, and the envelope stays
//! successful.

use async_trait::async_trait;
use obscurex_core::memory::{LongTermEntry, MemoryStore, Metadata};
use obscurex_core::{ExecutionContext, Tool, ToolCategory, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

use super::object_schema;
use crate::params::{decode, non_empty};

#[derive(Debug, Deserialize)]
struct StoreParams {
    key: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct KeyParams {
    key: String,
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    #[serde(default)]
    query: String,
}

fn store_schema() -> Value {
    object_schema(
        json!({
            "key": {"type": "string"},
            "value": {"description": "Any JSON value"},
            "metadata": {"type": "object"}
        }),
        &["key", "value"],
    )
}

fn key_schema() -> Value {
    object_schema(json!({"key": {"type": "string"}}), &["key"])
}

fn query_schema() -> Value {
    object_schema(json!({"query": {"type": "string"}}), &["query"])
}

fn not_found(key: &str, store: &str) -> Value {
    json!({
        "success": false,
        "message": format!("Key '{key}' not found in {store} memory"),
        "value": null,
    })
}

fn long_term_summary(entry: &LongTermEntry) -> Value {
    json!({
        "key": entry.key,
        "value": entry.value,
        "metadata": entry.metadata,
        "historyCount": entry.history_count(),
    })
}

/// Store a value in short-term (session) memory.
pub struct StoreMemoryTool;

#[async_trait]
impl Tool for StoreMemoryTool {
    fn name(&self) -> &str {
        "storeMemory"
    }

    fn description(&self) -> &str {
        "Store information in short-term memory (session-based)"
    }

    fn parameters_schema(&self) -> Value {
        store_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Memory
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: StoreParams = decode(self.name(), params)?;
        let key = non_empty(self.name(), "key", &p.key)?;

        let mut metadata = p.metadata.unwrap_or_default();
        metadata.insert("sessionId".to_string(), json!(ctx.session_id().as_str()));

        let receipt = ctx.short_term().put(key, p.value, metadata)?;
        Ok(json!({
            "success": true,
            "message": format!("Stored '{key}' in short-term memory"),
            "entry": receipt.entry,
            "persisted": receipt.persisted,
        }))
    }
}

pub struct RetrieveMemoryTool;

#[async_trait]
impl Tool for RetrieveMemoryTool {
    fn name(&self) -> &str {
        "retrieveMemory"
    }

    fn description(&self) -> &str {
        "Retrieve information from short-term memory"
    }

    fn parameters_schema(&self) -> Value {
        key_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Memory
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: KeyParams = decode(self.name(), params)?;
        Ok(match ctx.short_term().get(&p.key)? {
            Some(entry) => json!({
                "success": true,
                "key": entry.key,
                "value": entry.value,
                "metadata": entry.metadata,
                "timestamp": entry.timestamp,
            }),
            None => not_found(&p.key, "short-term"),
        })
    }
}

pub struct SearchMemoryTool;

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "searchMemory"
    }

    fn description(&self) -> &str {
        "Search through short-term memory"
    }

    fn parameters_schema(&self) -> Value {
        query_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Memory
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: QueryParams = decode(self.name(), params)?;
        let results = ctx.short_term().search(&p.query)?;
        Ok(json!({
            "success": true,
            "query": p.query.to_lowercase(),
            "count": results.len(),
            "results": results,
        }))
    }
}

/// Store a value in long-term memory, archiving any previous value.
pub struct StoreLongTermMemoryTool;

#[async_trait]
impl Tool for StoreLongTermMemoryTool {
    fn name(&self) -> &str {
        "storeLongTermMemory"
    }

    fn description(&self) -> &str {
        "Store information in long-term memory (persistent across sessions)"
    }

    fn parameters_schema(&self) -> Value {
        store_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Memory
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: StoreParams = decode(self.name(), params)?;
        let key = non_empty(self.name(), "key", &p.key)?;

        let receipt = ctx
            .long_term()
            .put(key, p.value, p.metadata.unwrap_or_default())?;
        Ok(json!({
            "success": true,
            "message": format!("Stored '{key}' in long-term memory"),
            "entry": receipt.entry,
            "persisted": receipt.persisted,
        }))
    }
}

pub struct RetrieveLongTermMemoryTool;

#[async_trait]
impl Tool for RetrieveLongTermMemoryTool {
    fn name(&self) -> &str {
        "retrieveLongTermMemory"
    }

    fn description(&self) -> &str {
        "Retrieve information from long-term memory"
    }

    fn parameters_schema(&self) -> Value {
        key_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Memory
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: KeyParams = decode(self.name(), params)?;
        Ok(match ctx.long_term().get(&p.key)? {
            Some(entry) => {
                let mut summary = long_term_summary(&entry);
                summary["success"] = json!(true);
                summary
            }
            None => not_found(&p.key, "long-term"),
        })
    }
}

pub struct SearchLongTermMemoryTool;

#[async_trait]
impl Tool for SearchLongTermMemoryTool {
    fn name(&self) -> &str {
        "searchLongTermMemory"
    }

    fn description(&self) -> &str {
        "Search through long-term memory"
    }

    fn parameters_schema(&self) -> Value {
        query_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Memory
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: QueryParams = decode(self.name(), params)?;
        let results: Vec<Value> = ctx
            .long_term()
            .search(&p.query)?
            .iter()
            .map(long_term_summary)
            .collect();
        Ok(json!({
            "success": true,
            "query": p.query.to_lowercase(),
            "count": results.len(),
            "results": results,
        }))
    }
}
