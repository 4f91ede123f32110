//! # Autonomy Tools
//!
//! Model-assisted decisions for driving an optimization run. All four tools
//! are on the model allow-list; `getExecutionOptions` and
//! `recommendOptimizationStrategy` still work without a model and only use
//! it to refine their answer.

use async_trait::async_trait;
use obscurex_core::memory::{MemoryStore, Metadata};
use obscurex_core::{ExecutionContext, LanguageModelExt, Tool, ToolCategory, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

use super::object_schema;
use crate::params::{decode, display_value};

const ORCHESTRATOR_SYSTEM_PROMPT: &str = "You are an AI orchestrator for cryptocurrency ML pipeline optimization.
Analyze the current state and context to decide the best next action.
Return your decision as JSON with keys: action, reasoning, details, confidence.";

const AUTONOMOUS_SYSTEM_PROMPT: &str = "You are an autonomous AI agent for ML optimization.";

/// Average successive improvement below this magnitude counts as stagnant.
pub const STAGNATION_THRESHOLD: f64 = 0.001;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateParams {
    #[serde(default)]
    current_state: Value,
    #[serde(default)]
    objective: String,
}

fn state_schema() -> Value {
    object_schema(
        json!({
            "currentState": {"type": "object"},
            "objective": {"type": "string"}
        }),
        &["objective"],
    )
}

/// Ask the model for the next action given the current state.
pub struct AnalyzeContextTool;

#[async_trait]
impl Tool for AnalyzeContextTool {
    fn name(&self) -> &str {
        "analyzeContext"
    }

    fn description(&self) -> &str {
        "Use AI to analyze current context (memory, results) and decide the best next action"
    }

    fn parameters_schema(&self) -> Value {
        state_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Autonomy
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: StateParams = decode(self.name(), params)?;
        let model = ctx.model()?;

        let prompt = format!(
            "Current State: {}\nObjective: {}\n\nAnalyze the state and recommend the best next action to achieve the objective.\nReturn JSON format.",
            display_value(&p.current_state),
            p.objective
        );
        let decision = model
            .analyze_and_decide(&prompt, ORCHESTRATOR_SYSTEM_PROMPT, 1024)
            .await?;

        Ok(json!({
            "decision": decision,
            "contextUsed": {
                "shortTermEntries": ctx.short_term().len(),
                "longTermEntries": ctx.long_term().len(),
            }
        }))
    }
}

/// Actions available in each phase of a run.
pub fn phase_options(phase: &str) -> Value {
    match phase {
        "initialization" => json!([
            {"action": "prepare_data", "description": "Prepare and validate data"},
            {"action": "add_indicators", "description": "Add technical indicators"}
        ]),
        "optimization" => json!([
            {"action": "continue_optimization", "description": "Continue with current optimization strategy"},
            {"action": "hyperparameter_tuning", "description": "Apply hyperparameter tuning"},
            {"action": "feature_engineering", "description": "Improve feature engineering"}
        ]),
        "evaluation" => json!([
            {"action": "analyze_results", "description": "Analyze optimization results"},
            {"action": "finalize", "description": "Finalize best pipeline"}
        ]),
        _ => json!([]),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionsParams {
    #[serde(default = "default_phase")]
    current_phase: String,
    #[serde(default)]
    current_state: Value,
}

fn default_phase() -> String {
    "initialization".to_string()
}

pub struct GetExecutionOptionsTool;

#[async_trait]
impl Tool for GetExecutionOptionsTool {
    fn name(&self) -> &str {
        "getExecutionOptions"
    }

    fn description(&self) -> &str {
        "Get available execution flow options and next possible actions based on current state"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({
                "currentPhase": {"type": "string", "enum": ["initialization", "optimization", "evaluation"]},
                "currentState": {"type": "object"}
            }),
            &[],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Autonomy
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: OptionsParams = decode(self.name(), params)?;

        let mut recommendations = Vec::new();
        if let Ok(model) = ctx.model() {
            let prompt = format!(
                "Current phase: {}, State: {}. Recommend top action.",
                p.current_phase,
                display_value(&p.current_state)
            );
            match model.generate_text(&prompt, "Recommend one action briefly.", 256).await {
                Ok(text) => recommendations.push(json!({"recommendation": text, "priority": 1})),
                Err(e) => tracing::debug!(error = %e, "Ignoring failed model recommendation"),
            }
        }

        Ok(json!({
            "phase": p.current_phase,
            "options": phase_options(&p.current_phase),
            "aiRecommendations": recommendations,
        }))
    }
}

/// Trend over an objective history (lower is better).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveTrend {
    pub avg_improvement: f64,
    pub known: bool,
}

impl ObjectiveTrend {
    pub fn from_history(history: &[f64]) -> Self {
        if history.len() < 2 {
            return Self {
                avg_improvement: 0.0,
                known: false,
            };
        }
        let improvements: Vec<f64> = history.windows(2).map(|w| w[0] - w[1]).collect();
        Self {
            avg_improvement: improvements.iter().sum::<f64>() / improvements.len() as f64,
            known: true,
        }
    }

    pub fn is_improving(&self) -> bool {
        self.known && self.avg_improvement > 0.0
    }

    pub fn is_stagnant(&self) -> bool {
        self.known && self.avg_improvement.abs() < STAGNATION_THRESHOLD
    }

    pub fn label(&self) -> &'static str {
        match (self.known, self.avg_improvement > 0.0) {
            (false, _) => "unknown",
            (true, true) => "improving",
            (true, false) => "declining",
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "trend": self.label(),
            "improvement": self.is_improving(),
            "stagnant": self.is_stagnant(),
            "avgImprovement": self.avg_improvement,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrategyParams {
    #[serde(default, rename = "mseHistory", alias = "objectiveHistory")]
    history: Vec<f64>,
    #[serde(default, rename = "currentMSE", alias = "currentObjective")]
    current: Option<f64>,
    #[serde(default, rename = "targetMSE", alias = "targetObjective")]
    target: Option<f64>,
    #[serde(default)]
    iteration_number: u64,
}

pub struct RecommendOptimizationStrategyTool;

#[async_trait]
impl Tool for RecommendOptimizationStrategyTool {
    fn name(&self) -> &str {
        "recommendOptimizationStrategy"
    }

    fn description(&self) -> &str {
        "Analyze MSE trends and execution history to recommend the best optimization strategy"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({
                "mseHistory": {"type": "array", "items": {"type": "number"}},
                "currentMSE": {"type": "number"},
                "targetMSE": {"type": "number"},
                "iterationNumber": {"type": "integer"}
            }),
            &["mseHistory"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Autonomy
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: StrategyParams = decode(self.name(), params)?;
        let trend = ObjectiveTrend::from_history(&p.history);

        let mut recommendation = json!({
            "strategy": "Continue current approach",
            "technique": "Keep optimizing with current methods",
            "expectedImpact": "Moderate improvement expected",
            "tryDifferentApproach": trend.is_stagnant(),
        });

        if let Ok(model) = ctx.model() {
            let prompt = format!(
                "MSE History: {:?}\nCurrent MSE: {}\nTarget MSE: {}\nIteration: {}\n\nRecommend an optimization strategy as JSON with keys: strategy, technique, expectedImpact, tryDifferentApproach.",
                p.history,
                p.current.map_or("unknown".to_string(), |v| v.to_string()),
                p.target.map_or("unknown".to_string(), |v| v.to_string()),
                p.iteration_number
            );
            match model
                .analyze_and_decide(&prompt, "You are an ML optimization expert.", 512)
                .await
            {
                Ok(reply) if reply.get("strategy").is_some() => recommendation = reply,
                Ok(_) => tracing::debug!("Model reply had no strategy, keeping heuristic"),
                Err(e) => tracing::debug!(error = %e, "Ignoring failed model recommendation"),
            }
        }

        Ok(json!({
            "recommendation": recommendation,
            "trends": trend.to_value(),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionParams {
    #[serde(default)]
    current_state: Value,
    #[serde(default)]
    objective: String,
    #[serde(default)]
    data_file: Option<String>,
}

/// One decision cycle: ask the model, then record the decision in
/// short-term memory as `decision_<iteration>`.
pub struct ExecuteAutonomousDecisionTool;

#[async_trait]
impl Tool for ExecuteAutonomousDecisionTool {
    fn name(&self) -> &str {
        "executeAutonomousDecision"
    }

    fn description(&self) -> &str {
        "Execute one autonomous decision cycle: analyze context, decide action, execute"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({
                "currentState": {"type": "object"},
                "objective": {"type": "string"},
                "dataFile": {"type": "string"}
            }),
            &["objective"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Autonomy
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: DecisionParams = decode(self.name(), params)?;
        let model = ctx.model()?;

        let mut prompt = format!(
            "Current State: {}\nObjective: {}\n",
            display_value(&p.current_state),
            p.objective
        );
        if let Some(data_file) = &p.data_file {
            prompt.push_str(&format!("Data file: {data_file}\n"));
        }
        prompt.push_str("\nAnalyze and decide the next action. Return JSON with: action, reasoning, parameters.");

        let decision = model
            .analyze_and_decide(&prompt, AUTONOMOUS_SYSTEM_PROMPT, 1024)
            .await?;
        let action = decision
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let iteration = p
            .current_state
            .get("iteration")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let mut result = json!({
            "decision": decision,
            "executed": true,
            "nextState": p.current_state,
            "message": format!("Would execute action: {action}"),
        });

        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), json!("autonomous_decision"));
        metadata.insert("sessionId".to_string(), json!(ctx.session_id().as_str()));
        let key = format!("decision_{iteration}");
        let receipt = ctx.short_term().put(&key, result.clone(), metadata)?;
        result["recordedAs"] = json!(key);
        result["persisted"] = json!(receipt.persisted);

        Ok(result)
    }
}
