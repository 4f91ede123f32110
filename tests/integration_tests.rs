//! Integration Tests for End-to-End Scenarios
//!
//! These tests drive the assembled crates together: the standard tool library
//! through the dispatcher, the optimization loop against file-backed memory,
//! and the conversational runner over scripted model replies.

use obscurex::agent::testing::{ScriptedModel, ScriptedTool};
use obscurex::core::{FunctionTool, LanguageModel, Metadata, ToolError};
use obscurex::{
    Agent, AgentConfig, Dispatcher, LongTermMemory, MemoryStore, OptimizationConfig,
    OptimizationLoop, ShortTermMemory, Termination, ToolRegistry,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn agent_config(dir: &Path) -> AgentConfig {
    AgentConfig::builder()
        .short_term_path(dir.join("agent_memory.json"))
        .long_term_path(dir.join("agent_longterm_memory.json"))
        .artifact_dir(dir)
        .build()
        .expect("valid config")
}

/// Registry with a generation tool that numbers its candidates and an
/// evaluation tool that replays `objectives`.
fn pipeline_registry(objectives: Vec<f64>) -> ToolRegistry {
    let counter = Arc::new(Mutex::new(0u32));
    let generate = FunctionTool::sync(
        "generateMLPipeline",
        "Numbered candidates",
        json!({"type": "object"}),
        move |_, _| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            Ok(json!({"code": format!("pipeline v{n}"), "filename": "pipeline.py"}))
        },
    );

    let queue = Arc::new(Mutex::new(VecDeque::from(objectives)));
    let evaluate = FunctionTool::sync(
        "testMLPipeline",
        "Replayed objectives",
        json!({"type": "object"}),
        move |_, _| match queue.lock().unwrap().pop_front() {
            Some(objective) => Ok(json!({"objective": objective, "mse": objective})),
            None => Err(ToolError::execution("no more objectives")),
        },
    );

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(generate)).unwrap();
    registry.register(Arc::new(evaluate)).unwrap();
    registry
}

fn loop_config(threshold: f64, max_iterations: u32) -> OptimizationConfig {
    OptimizationConfig {
        threshold,
        max_iterations,
        verbose: false,
        ..OptimizationConfig::default()
    }
}

/// Store `a = 1` then `a = 2` in long-term memory through the tools and read it back.
#[tokio::test]
async fn test_long_term_overwrite_keeps_history() {
    let dir = TempDir::new().unwrap();
    let agent = Agent::with_model(agent_config(dir.path()), None);

    for value in [1, 2] {
        let envelope = agent
            .execute_tool("storeLongTermMemory", json!({"key": "a", "value": value}))
            .await;
        assert!(envelope.success, "store failed: {:?}", envelope.error);
    }

    let entry = agent.dispatcher().long_term().get("a").unwrap().unwrap();
    assert_eq!(entry.value, json!(2));
    assert_eq!(entry.history.len(), 1);
    assert_eq!(entry.history[0].value, json!(1));

    let fetched = agent
        .execute_tool("retrieveLongTermMemory", json!({"key": "a"}))
        .await;
    let result = fetched.result.unwrap();
    assert_eq!(result["value"], 2);
    assert_eq!(result["historyCount"], 1);
}

#[tokio::test]
async fn test_loop_reaches_threshold_on_third_iteration() {
    let dispatcher = Dispatcher::new(
        Arc::new(pipeline_registry(vec![0.2, 0.08, 0.03])),
        Arc::new(ShortTermMemory::ephemeral()),
        Arc::new(LongTermMemory::ephemeral()),
    );

    let report = OptimizationLoop::new(&dispatcher, loop_config(0.05, 10))
        .run()
        .await
        .unwrap();

    assert_eq!(report.iterations_run, 3);
    assert!(report.threshold_met);
    assert_eq!(report.termination, Termination::ThresholdMet);
    assert_eq!(report.best_objective, 0.03);
    assert_eq!(report.best_artifact.as_deref(), Some("pipeline v3"));
}

#[tokio::test]
async fn test_unregistered_tool_envelope() {
    let dir = TempDir::new().unwrap();
    let agent = Agent::with_model(agent_config(dir.path()), None);

    let envelope = agent.execute_tool("x", json!({})).await;
    let wire = envelope.to_value();
    assert_eq!(wire["success"], false);
    assert_eq!(wire["tool"], "x");
    assert_eq!(wire["error"], "Tool 'x' not found");
    assert_eq!(wire["error_kind"], "TOOL_NOT_FOUND");
}

#[tokio::test]
async fn test_optimization_resumes_after_restart() {
    let dir = TempDir::new().unwrap();
    let long_term_path = dir.path().join("agent_longterm_memory.json");

    {
        let dispatcher = Dispatcher::new(
            Arc::new(pipeline_registry(vec![0.4, 0.25])),
            Arc::new(ShortTermMemory::ephemeral()),
            Arc::new(LongTermMemory::open(&long_term_path)),
        );
        let report = OptimizationLoop::new(&dispatcher, loop_config(0.01, 2))
            .run()
            .await
            .unwrap();
        assert_eq!(report.best_objective, 0.25);
    }

    // A fresh process: only the snapshot file carries the best state over.
    let long_term = Arc::new(LongTermMemory::open(&long_term_path));
    let dispatcher = Dispatcher::new(
        Arc::new(pipeline_registry(vec![0.3, 0.1])),
        Arc::new(ShortTermMemory::ephemeral()),
        Arc::clone(&long_term),
    );
    let report = OptimizationLoop::new(&dispatcher, loop_config(0.01, 2))
        .run()
        .await
        .unwrap();

    assert_eq!(report.iterations[0].best_objective, 0.25);
    assert_eq!(report.best_objective, 0.1);
    let entry = long_term.get("best_pipeline").unwrap().unwrap();
    assert_eq!(entry.value["code"], "pipeline v2");
    assert_eq!(entry.history.len(), 2);
}

#[test]
fn test_corrupt_snapshot_starts_empty_and_is_backed_up() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent_memory.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    let store = ShortTermMemory::open(&path);
    assert!(store.is_empty());

    let backups: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("agent_memory.json.corrupted."))
        .collect();
    assert_eq!(backups.len(), 1);

    // The store is usable and rewrites a valid snapshot.
    let receipt = store.put("k", json!("v"), Metadata::new()).unwrap();
    assert!(receipt.persisted);
    let reopened = ShortTermMemory::open(&path);
    assert_eq!(reopened.get("k").unwrap().unwrap().value, json!("v"));
}

#[test]
fn test_snapshot_document_shape() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("long.json");
    let store = LongTermMemory::open(&path);
    store.put("a", json!(1), Metadata::new()).unwrap();
    store.put("a", json!(2), Metadata::new()).unwrap();

    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["entries"][0]["key"], "a");
    assert_eq!(doc["entries"][0]["value"], 2);
    assert_eq!(doc["entries"][0]["history"][0]["value"], 1);
    assert!(doc["metadata"]["created"].is_string());
    assert!(doc["metadata"]["lastUpdated"].is_string());
}

#[tokio::test]
async fn test_failing_tool_does_not_escape_dispatcher() {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(ScriptedTool::new("flaky").failing("upstream unavailable")))
        .unwrap();
    registry
        .register(Arc::new(FunctionTool::sync(
            "explodes",
            "Panics",
            json!({"type": "object"}),
            |_, _| panic!("boom"),
        )))
        .unwrap();
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        Arc::new(ShortTermMemory::ephemeral()),
        Arc::new(LongTermMemory::ephemeral()),
    );

    for tool in ["flaky", "explodes"] {
        let envelope = dispatcher.invoke(tool, json!({})).await;
        assert!(!envelope.success);
        assert!(!envelope.error.unwrap_or_default().is_empty());
    }
}

#[tokio::test]
async fn test_query_uses_standard_memory_tools() {
    let dir = TempDir::new().unwrap();
    let model: Arc<dyn LanguageModel> = Arc::new(
        ScriptedModel::new()
            .reply_tool_use(
                "tu_1",
                "storeMemory",
                json!({"key": "favorite", "value": "ETHUSDT"}),
            )
            .reply_text("Noted."),
    );
    let agent = Agent::with_model(agent_config(dir.path()), Some(model));
    let runner = agent.runner().unwrap();

    let response = runner
        .query(obscurex::agent::QueryRequest::new("Remember ETHUSDT", "trader"))
        .await
        .unwrap();

    assert_eq!(response.response, "Noted.");
    assert_eq!(response.tool_calls.len(), 1);
    assert!(response.tool_calls[0].envelope.success);

    let stored = agent
        .dispatcher()
        .short_term()
        .get("favorite")
        .unwrap()
        .unwrap();
    assert_eq!(stored.value, json!("ETHUSDT"));
    assert_eq!(stored.metadata["sessionId"], response.session_id.as_str());
}
