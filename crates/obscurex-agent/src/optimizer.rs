//! # Optimization Loop
//!
//! Drives repeated generate → evaluate → keep-if-better cycles through the
//! [`Dispatcher`] until the best objective reaches the threshold, the
//! iteration budget runs out, or the run is cancelled.
//!
//! The best result is mirrored into long-term memory under
//! [`OptimizationConfig::best_state_key`] on every improvement, so the next
//! run (in this process or after a restart) starts from it. Generation is
//! always conditioned on the best-ever artifact, never on the previous
//! iteration's.
//!
//! Tool failures abandon the current iteration only. Failing to reach
//! long-term memory at all ends the run with an [`OptimizationError`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use obscurex_core::memory::{LongTermMemory, MemoryStore, Metadata};
use obscurex_core::{MemoryError, ToolEnvelope};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::Instrument;

use crate::config::OptimizationConfig;
use crate::dispatcher::Dispatcher;
use crate::error::OptimizationError;

/// Short-term key the run configuration is recorded under.
pub const ORCHESTRATOR_CONFIG_KEY: &str = "orchestrator_config";

/// Cooperative cancellation, checked at the top of every iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Termination {
    ThresholdMet,
    MaxIterations,
    Cancelled,
}

/// What happened in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum IterationOutcome {
    Improved { objective: f64 },
    /// Evaluated, but not strictly better; `None` when no objective was found.
    NotImproved { objective: Option<f64> },
    GenerationFailed { error: String },
    EvaluationFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iteration: u32,
    #[serde(flatten)]
    pub outcome: IterationOutcome,
    /// Best objective after this iteration.
    pub best_objective: f64,
}

/// Best-known result.
#[derive(Debug, Clone, PartialEq)]
pub struct BestState {
    pub objective: f64,
    pub artifact: Option<String>,
}

impl Default for BestState {
    fn default() -> Self {
        Self {
            objective: f64::INFINITY,
            artifact: None,
        }
    }
}

impl BestState {
    /// Read the mirrored best state; `objective` and the legacy `mse` key
    /// are both accepted.
    pub fn load(store: &LongTermMemory, key: &str) -> Result<Self, MemoryError> {
        let Some(entry) = store.get(key)? else {
            return Ok(Self::default());
        };
        let objective = entry
            .value
            .get("objective")
            .and_then(Value::as_f64)
            .or_else(|| entry.value.get("mse").and_then(Value::as_f64))
            .unwrap_or(f64::INFINITY);
        let artifact = entry
            .value
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            objective,
            artifact,
        })
    }

    fn to_value(&self) -> Value {
        json!({
            "mse": self.objective,
            "objective": self.objective,
            "code": self.artifact,
        })
    }
}

/// Result of one run.
///
/// `threshold_met` is judged on the final best, which may be a best loaded at
/// resume. A run whose evaluations all fail can therefore end with
/// [`Termination::MaxIterations`] and `threshold_met` both set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub best_objective: f64,
    pub best_artifact: Option<String>,
    pub iterations_run: u32,
    pub threshold_met: bool,
    pub improvements: u32,
    pub termination: Termination,
    pub iterations: Vec<IterationRecord>,
}

type IterationObserver = Box<dyn Fn(&IterationRecord) + Send + Sync>;

/// One optimization run over a dispatcher.
pub struct OptimizationLoop<'a> {
    dispatcher: &'a Dispatcher,
    config: OptimizationConfig,
    cancel: CancellationFlag,
    observer: Option<IterationObserver>,
}

impl<'a> OptimizationLoop<'a> {
    pub fn new(dispatcher: &'a Dispatcher, config: OptimizationConfig) -> Self {
        Self {
            dispatcher,
            config,
            cancel: CancellationFlag::new(),
            observer: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called after every completed iteration.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&IterationRecord) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub async fn run(self) -> Result<RunReport, OptimizationError> {
        self.config
            .validate()
            .map_err(|e| OptimizationError::InvalidConfig(e.to_string()))?;

        let span = tracing::info_span!(
            "optimization_run",
            session.id = %self.dispatcher.session_id(),
            threshold = self.config.threshold,
            max_iterations = self.config.max_iterations,
        );
        self.drive().instrument(span).await
    }

    async fn drive(&self) -> Result<RunReport, OptimizationError> {
        self.record_config();

        let mut best = BestState::load(self.dispatcher.long_term(), &self.config.best_state_key)?;
        if best.artifact.is_some() {
            tracing::info!(best_objective = best.objective, "Loaded previous best");
        }

        let mut report = RunReport {
            best_objective: best.objective,
            best_artifact: best.artifact.clone(),
            iterations_run: 0,
            threshold_met: false,
            improvements: 0,
            termination: Termination::MaxIterations,
            iterations: Vec::new(),
        };

        for iteration in 1..=self.config.max_iterations {
            if self.cancel.is_cancelled() {
                tracing::info!(iteration, "Optimization cancelled");
                report.termination = Termination::Cancelled;
                break;
            }
            report.iterations_run = iteration;

            let (outcome, evaluated) = self.iterate(iteration, &mut best).await?;
            if matches!(outcome, IterationOutcome::Improved { .. }) {
                report.improvements += 1;
            }
            self.log_outcome(iteration, &outcome, best.objective);

            let record = IterationRecord {
                iteration,
                outcome,
                best_objective: best.objective,
            };
            if let Some(observer) = &self.observer {
                observer(&record);
            }
            report.iterations.push(record);

            if evaluated && best.objective <= self.config.threshold {
                tracing::info!(iteration, best_objective = best.objective, "Threshold met");
                report.termination = Termination::ThresholdMet;
                break;
            }
        }

        report.best_objective = best.objective;
        report.best_artifact = best.artifact;
        report.threshold_met = report.best_objective <= self.config.threshold;
        tracing::info!(
            best_objective = report.best_objective,
            iterations = report.iterations_run,
            improvements = report.improvements,
            termination = ?report.termination,
            "Optimization finished"
        );
        Ok(report)
    }

    /// One generate/evaluate cycle. The flag is `true` when the evaluation
    /// tool returned.
    async fn iterate(
        &self,
        iteration: u32,
        best: &mut BestState,
    ) -> Result<(IterationOutcome, bool), OptimizationError> {
        let params = match &best.artifact {
            Some(code) => json!({
                "existingArtifact": code,
                "objectivePrompt": format!(
                    "Optimize this pipeline to improve MSE. Current MSE: {}",
                    best.objective
                ),
            }),
            None => json!({
                "existingArtifact": null,
                "objectivePrompt": self.config.seed_prompt(),
            }),
        };

        let generated = self
            .dispatcher
            .invoke(&self.config.generation_tool, params)
            .await;
        let code = match generated_code(generated) {
            Ok(code) => code,
            Err(error) => return Ok((IterationOutcome::GenerationFailed { error }, false)),
        };

        let evaluated = self
            .dispatcher
            .invoke(&self.config.evaluation_tool, json!({"candidate": code}))
            .await;
        let objective = match evaluated_objective(evaluated) {
            Ok(objective) => objective,
            Err(error) => return Ok((IterationOutcome::EvaluationFailed { error }, false)),
        };

        match objective {
            Some(value) if value < best.objective => {
                best.objective = value;
                best.artifact = Some(code);
                self.persist_best(iteration, best)?;
                Ok((IterationOutcome::Improved { objective: value }, true))
            }
            other => Ok((IterationOutcome::NotImproved { objective: other }, true)),
        }
    }

    fn persist_best(&self, iteration: u32, best: &BestState) -> Result<(), OptimizationError> {
        let mut metadata = Metadata::new();
        metadata.insert("iteration".to_string(), json!(iteration));
        metadata.insert(
            "sessionId".to_string(),
            json!(self.dispatcher.session_id().as_str()),
        );

        let receipt = self.dispatcher.long_term().put(
            &self.config.best_state_key,
            best.to_value(),
            metadata,
        )?;
        if !receipt.persisted {
            tracing::warn!(
                iteration,
                key = %self.config.best_state_key,
                "Best result kept in memory but not written to disk"
            );
        }
        Ok(())
    }

    fn record_config(&self) {
        let value = match serde_json::to_value(&self.config) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode optimization config");
                return;
            }
        };
        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), json!("config"));
        match self
            .dispatcher
            .short_term()
            .put(ORCHESTRATOR_CONFIG_KEY, value, metadata)
        {
            Ok(receipt) if !receipt.persisted => {
                tracing::warn!("Optimization config recorded but not written to disk");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Could not record optimization config"),
        }
    }

    fn log_outcome(&self, iteration: u32, outcome: &IterationOutcome, best_objective: f64) {
        match outcome {
            IterationOutcome::Improved { objective } => {
                tracing::info!(iteration, objective, "New best objective");
            }
            IterationOutcome::NotImproved { objective } => {
                tracing::info!(iteration, objective = ?objective, best_objective, "No improvement");
            }
            IterationOutcome::GenerationFailed { error }
            | IterationOutcome::EvaluationFailed { error } => {
                if self.config.verbose {
                    tracing::warn!(iteration, error = %error, outcome = ?outcome, "Iteration failed");
                } else {
                    tracing::debug!(iteration, error = %error, "Iteration failed");
                }
            }
        }
    }
}

fn envelope_error(envelope: &ToolEnvelope) -> String {
    envelope
        .error
        .clone()
        .unwrap_or_else(|| format!("{} failed", envelope.tool))
}

fn generated_code(envelope: ToolEnvelope) -> Result<String, String> {
    if !envelope.success {
        return Err(envelope_error(&envelope));
    }
    envelope
        .result
        .as_ref()
        .and_then(|r| r.get("code"))
        .and_then(Value::as_str)
        .filter(|code| !code.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("{} returned no code", envelope.tool))
}

fn evaluated_objective(envelope: ToolEnvelope) -> Result<Option<f64>, String> {
    if !envelope.success {
        return Err(envelope_error(&envelope));
    }
    let result = envelope.result.unwrap_or(Value::Null);
    Ok(result
        .get("objective")
        .and_then(Value::as_f64)
        .or_else(|| result.get("mse").and_then(Value::as_f64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use obscurex_core::{FunctionTool, ShortTermMemory, ToolError};
    use obscurex_tools::ToolRegistry;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Generation echoes an incrementing candidate; evaluation pops scripted
    /// objectives (`None` = unparseable output, `Err` = tool failure).
    fn scripted(
        objectives: Vec<Result<Option<f64>, &'static str>>,
        long_term: Arc<LongTermMemory>,
    ) -> (Dispatcher, Arc<Mutex<Vec<Value>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&prompts);
        let counter = Arc::new(Mutex::new(0u32));
        let generate = FunctionTool::sync(
            "generateMLPipeline",
            "Scripted generation",
            json!({"type": "object"}),
            move |params, _| {
                seen.lock().unwrap().push(params);
                let mut n = counter.lock().unwrap();
                *n += 1;
                Ok(json!({"code": format!("candidate {n}"), "filename": "x.py"}))
            },
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(objectives)));
        let evaluate = FunctionTool::sync(
            "testMLPipeline",
            "Scripted evaluation",
            json!({"type": "object"}),
            move |_, _| match queue.lock().unwrap().pop_front() {
                Some(Ok(objective)) => Ok(json!({"objective": objective, "rawOutput": ""})),
                Some(Err(message)) => Err(ToolError::execution(message)),
                None => Ok(json!({"objective": null})),
            },
        );

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(generate)).unwrap();
        registry.register(Arc::new(evaluate)).unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::new(ShortTermMemory::ephemeral()),
            long_term,
        );
        (dispatcher, prompts)
    }

    fn config(threshold: f64, max_iterations: u32) -> OptimizationConfig {
        OptimizationConfig {
            threshold,
            max_iterations,
            verbose: false,
            ..OptimizationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_threshold_met() {
        let (dispatcher, _) = scripted(
            vec![Ok(Some(0.2)), Ok(Some(0.08)), Ok(Some(0.03))],
            Arc::new(LongTermMemory::ephemeral()),
        );
        let report = OptimizationLoop::new(&dispatcher, config(0.05, 10))
            .run()
            .await
            .unwrap();

        assert_eq!(report.iterations_run, 3);
        assert!(report.threshold_met);
        assert_eq!(report.termination, Termination::ThresholdMet);
        assert_eq!(report.best_objective, 0.03);
        assert_eq!(report.improvements, 3);
        assert_eq!(report.best_artifact.as_deref(), Some("candidate 3"));
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let (dispatcher, _) = scripted(
            vec![Ok(Some(0.5)); 4],
            Arc::new(LongTermMemory::ephemeral()),
        );
        let report = OptimizationLoop::new(&dispatcher, config(0.05, 4))
            .run()
            .await
            .unwrap();

        assert_eq!(report.iterations_run, 4);
        assert!(!report.threshold_met);
        assert_eq!(report.termination, Termination::MaxIterations);
        assert_eq!(report.improvements, 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_end_the_run() {
        let (dispatcher, _) = scripted(
            vec![Err("crashed"), Ok(None), Ok(Some(0.3)), Ok(Some(0.4))],
            Arc::new(LongTermMemory::ephemeral()),
        );
        let report = OptimizationLoop::new(&dispatcher, config(0.01, 4))
            .run()
            .await
            .unwrap();

        assert_eq!(report.iterations_run, 4);
        assert!(matches!(
            report.iterations[0].outcome,
            IterationOutcome::EvaluationFailed { ref error } if error == "crashed"
        ));
        assert_eq!(
            report.iterations[1].outcome,
            IterationOutcome::NotImproved { objective: None }
        );
        assert_eq!(report.best_objective, 0.3);
        let bests: Vec<f64> = report.iterations.iter().map(|r| r.best_objective).collect();
        assert!(bests.windows(2).all(|w| w[1] <= w[0]));
    }

    #[tokio::test]
    async fn test_generation_conditions_on_best_artifact() {
        let (dispatcher, prompts) = scripted(
            vec![Ok(Some(0.3)), Ok(Some(0.9)), Ok(Some(0.8))],
            Arc::new(LongTermMemory::ephemeral()),
        );
        OptimizationLoop::new(&dispatcher, config(0.01, 3))
            .run()
            .await
            .unwrap();

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts[0]["existingArtifact"], Value::Null);
        assert_eq!(prompts[1]["existingArtifact"], "candidate 1");
        // Iteration 2 regressed; iteration 3 still builds on candidate 1.
        assert_eq!(prompts[2]["existingArtifact"], "candidate 1");
    }

    #[tokio::test]
    async fn test_best_state_is_mirrored_and_versioned() {
        let long_term = Arc::new(LongTermMemory::ephemeral());
        let (dispatcher, _) = scripted(vec![Ok(Some(0.4)), Ok(Some(0.2))], Arc::clone(&long_term));
        OptimizationLoop::new(&dispatcher, config(0.01, 2))
            .run()
            .await
            .unwrap();

        let entry = long_term.get("best_pipeline").unwrap().unwrap();
        assert_eq!(entry.value["objective"], 0.2);
        assert_eq!(entry.value["mse"], 0.2);
        assert_eq!(entry.value["code"], "candidate 2");
        assert_eq!(entry.metadata["iteration"], 2);
        assert_eq!(entry.history.len(), 1);
        assert_eq!(entry.history[0].value["objective"], 0.4);

        let config_entry = dispatcher.short_term().get(ORCHESTRATOR_CONFIG_KEY).unwrap().unwrap();
        assert_eq!(config_entry.value["bestStateKey"], "best_pipeline");
    }

    #[tokio::test]
    async fn test_resumes_from_stored_best() {
        let long_term = Arc::new(LongTermMemory::ephemeral());
        long_term
            .put(
                "best_pipeline",
                json!({"mse": 0.05, "code": "previous"}),
                Metadata::new(),
            )
            .unwrap();
        let (dispatcher, prompts) = scripted(vec![Ok(Some(0.5))], Arc::clone(&long_term));
        let report = OptimizationLoop::new(&dispatcher, config(0.1, 5))
            .run()
            .await
            .unwrap();

        // The stored best already meets the threshold, but one iteration still runs.
        assert_eq!(report.iterations_run, 1);
        assert!(report.threshold_met);
        assert_eq!(report.best_objective, 0.05);
        assert_eq!(prompts.lock().unwrap()[0]["existingArtifact"], "previous");
    }

    #[tokio::test]
    async fn test_resumed_best_meets_threshold_when_every_evaluation_fails() {
        let long_term = Arc::new(LongTermMemory::ephemeral());
        long_term
            .put(
                "best_pipeline",
                json!({"mse": 0.05, "code": "previous"}),
                Metadata::new(),
            )
            .unwrap();
        let (dispatcher, _) = scripted(
            vec![Err("evaluation crashed"), Err("evaluation crashed")],
            Arc::clone(&long_term),
        );
        let report = OptimizationLoop::new(&dispatcher, config(0.1, 2))
            .run()
            .await
            .unwrap();

        assert_eq!(report.iterations_run, 2);
        assert_eq!(report.termination, Termination::MaxIterations);
        assert!(report.threshold_met);
        assert_eq!(report.best_objective, 0.05);
        assert_eq!(report.best_artifact.as_deref(), Some("previous"));
        assert_eq!(report.improvements, 0);
    }

    #[tokio::test]
    async fn test_cancellation_before_first_iteration() {
        let (dispatcher, prompts) = scripted(vec![Ok(Some(0.01))], Arc::new(LongTermMemory::ephemeral()));
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let report = OptimizationLoop::new(&dispatcher, config(0.05, 5))
            .with_cancellation(cancel)
            .run()
            .await
            .unwrap();

        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.iterations_run, 0);
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_takes_effect_between_iterations() {
        let (dispatcher, _) = scripted(vec![Ok(Some(0.5)); 5], Arc::new(LongTermMemory::ephemeral()));
        let cancel = CancellationFlag::new();
        let trigger = cancel.clone();
        let report = OptimizationLoop::new(&dispatcher, config(0.05, 5))
            .with_cancellation(cancel)
            .with_observer(move |record| {
                if record.iteration == 2 {
                    trigger.cancel();
                }
            })
            .run()
            .await
            .unwrap();

        assert_eq!(report.iterations_run, 2);
        assert_eq!(report.termination, Termination::Cancelled);
    }

    #[tokio::test]
    async fn test_missing_generation_tool() {
        let dispatcher = Dispatcher::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(ShortTermMemory::ephemeral()),
            Arc::new(LongTermMemory::ephemeral()),
        );
        let report = OptimizationLoop::new(&dispatcher, config(0.05, 2))
            .run()
            .await
            .unwrap();
        assert_eq!(report.iterations_run, 2);
        assert!(matches!(
            &report.iterations[0].outcome,
            IterationOutcome::GenerationFailed { error } if error.contains("not found")
        ));
        assert_eq!(report.best_objective, f64::INFINITY);
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let (dispatcher, _) = scripted(vec![], Arc::new(LongTermMemory::ephemeral()));
        let err = OptimizationLoop::new(&dispatcher, config(0.05, 0))
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_report_serialization() {
        let record = IterationRecord {
            iteration: 1,
            outcome: IterationOutcome::Improved { objective: 0.2 },
            best_objective: 0.2,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"iteration": 1, "status": "improved", "objective": 0.2, "bestObjective": 0.2}));
    }
}
