//! # ML Pipeline Tools
//!
//! Generate candidate pipelines with the language model, evaluate them by
//! running the configured interpreter, and manage the interpreter's
//! packages. Every subprocess runs under a hard timeout and is killed when
//! the timeout fires.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use obscurex_core::{ExecutionContext, LanguageModelExt, Tool, ToolCategory, ToolError, ToolResult};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;

use super::object_schema;
use crate::params::{decode, non_empty};

const INITIAL_SYSTEM_PROMPT: &str = "You are an expert Python ML engineer specializing in cryptocurrency price prediction pipelines using Binance data.
Generate complete, production-ready Python code for machine learning pipelines.
The code should:
- Be complete and runnable
- Include proper imports
- Use scikit-learn for preprocessing
- Include CatBoost and/or Neural Networks as requested
- Calculate and print MSE as the final output
- Handle data loading from Binance CSV files (timestamp, open, high, low, close, volume format)
- Include proper error handling";

const OPTIMIZE_SYSTEM_PROMPT: &str = "You are an expert Python ML engineer specializing in optimizing cryptocurrency price prediction pipelines.
Improve existing ML pipeline code based on the optimization prompt.
The optimized code should:
- Maintain the core structure of the original
- Implement the requested improvements
- Be complete and runnable
- Calculate and print MSE as the final output";

const CODE_MAX_TOKENS: u32 = 4096;

fn initial_prompt(objective: &str) -> String {
    format!(
        "Generate a complete Python ML pipeline for: {objective}

Requirements:
- Complete, executable Python code
- Use pandas for data handling
- Work with Binance CSV format (timestamp, open, high, low, close, volume)
- Include train/test split
- Scale features appropriately
- Calculate MSE and print it as \"MSE: <value>\"
- Add comments for clarity

Return ONLY the Python code, no explanations."
    )
}

fn optimize_prompt(objective: &str, existing: &str) -> String {
    format!(
        "Optimize this ML pipeline: {objective}

Current code:
```python
{existing}
```

Requirements:
- Implement the requested optimization
- Maintain complete, executable Python code
- Keep MSE calculation and printing
- Add comments for changes

Return ONLY the improved Python code, no explanations."
    )
}

/// Extract the objective from pipeline output.
///
/// Looks for `MSE: <n>` (also `MSE = <n>`, any case) and otherwise takes the
/// first number on the last non-empty line.
pub fn parse_objective(output: &str) -> Option<f64> {
    static MSE: OnceLock<Option<Regex>> = OnceLock::new();
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();

    let number = |re: &Regex, text: &str| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    if let Some(re) = MSE.get_or_init(|| Regex::new(r"(?i)MSE[:\s=]+([0-9.]+)").ok()) {
        if re.is_match(output) {
            return number(re, output);
        }
    }

    let last_line = output.trim().lines().last()?;
    let re = NUMBER.get_or_init(|| Regex::new(r"([0-9.]+)").ok()).as_ref()?;
    number(re, last_line)
}

/// Run a command with a hard timeout; the child is killed on expiry.
async fn run_with_timeout(
    tool: &str,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> ToolResult<Output> {
    let child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ToolError::execution(format!("failed to run {program}: {e}"))),
        Err(_) => {
            tracing::warn!(tool = %tool, program = %program, timeout = ?timeout, "Subprocess timed out");
            Err(ToolError::Timeout {
                tool: tool.to_string(),
                after: timeout,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateParams {
    #[serde(default, alias = "existingCode")]
    existing_artifact: Option<String>,
    #[serde(alias = "prompt")]
    objective_prompt: String,
}

/// Generate (or optimize) pipeline code with the language model and save it
/// as `ml_pipeline_<unix-ts>.py` in the artifact directory.
pub struct GenerateMlPipelineTool {
    artifact_dir: PathBuf,
}

impl GenerateMlPipelineTool {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for GenerateMlPipelineTool {
    fn name(&self) -> &str {
        "generateMLPipeline"
    }

    fn description(&self) -> &str {
        "Generate ML pipeline code using CatBoost and/or Neural Networks (works with Binance price data)"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({
                "existingArtifact": {"type": ["string", "null"], "description": "Pipeline to optimize"},
                "objectivePrompt": {"type": "string"}
            }),
            &["objectivePrompt"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Ml
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: GenerateParams = decode(self.name(), params)?;
        let model = ctx.model()?;

        let existing = p.existing_artifact.as_deref().filter(|c| !c.trim().is_empty());
        let generated = match existing {
            Some(code) => {
                model
                    .generate_code(&optimize_prompt(&p.objective_prompt, code), OPTIMIZE_SYSTEM_PROMPT, CODE_MAX_TOKENS)
                    .await
            }
            None => {
                model
                    .generate_code(&initial_prompt(&p.objective_prompt), INITIAL_SYSTEM_PROMPT, CODE_MAX_TOKENS)
                    .await
            }
        };
        let code = generated.map_err(|e| {
            ToolError::execution(format!("Failed to generate ML pipeline with AI: {e}"))
        })?;

        tokio::fs::create_dir_all(&self.artifact_dir).await?;
        let filename = self
            .artifact_dir
            .join(format!("ml_pipeline_{}.py", chrono::Utc::now().timestamp()));
        tokio::fs::write(&filename, &code).await?;

        tracing::info!(file = ?filename, optimized = existing.is_some(), "Generated ML pipeline");
        Ok(json!({
            "success": true,
            "code": code,
            "filename": filename,
            "message": format!("ML pipeline generated and saved to {}", filename.display()),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct EvaluateParams {
    #[serde(alias = "pythonCode")]
    candidate: String,
}

/// Run a candidate pipeline and parse its objective from stdout.
pub struct TestMlPipelineTool {
    interpreter: String,
    timeout: Duration,
}

impl TestMlPipelineTool {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    async fn run_candidate(&self, script: &Path) -> ToolResult<Output> {
        let script = script.to_string_lossy();
        run_with_timeout(self.name(), &self.interpreter, &[script.as_ref()], self.timeout).await
    }
}

#[async_trait]
impl Tool for TestMlPipelineTool {
    fn name(&self) -> &str {
        "testMLPipeline"
    }

    fn description(&self) -> &str {
        "Execute a Python ML pipeline for price prediction and return MSE value (works with Binance data)"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"candidate": {"type": "string"}}), &["candidate"])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Ml
    }

    fn timeout(&self) -> Option<Duration> {
        // Leave room for the subprocess timeout to fire first.
        Some(self.timeout + Duration::from_secs(5))
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: EvaluateParams = decode(self.name(), params)?;

        // Removed when `script` drops, whatever the outcome.
        let script = tempfile::Builder::new()
            .prefix("ml_pipeline_")
            .suffix(".py")
            .tempfile()?;
        tokio::fs::write(script.path(), &p.candidate).await?;

        let output = self.run_candidate(script.path()).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let objective = parse_objective(&stdout);

        if !output.status.success() {
            tracing::warn!(status = ?output.status.code(), "Pipeline exited with failure status");
        }

        let message = match objective {
            Some(value) => format!("Pipeline executed successfully. MSE: {value}"),
            None => "Pipeline executed but MSE not found in output".to_string(),
        };
        Ok(json!({
            "success": true,
            "objective": objective,
            "mse": objective,
            "rawOutput": stdout,
            "stderr": stderr,
            "exitCode": output.status.code(),
            "message": message,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallParams {
    module_name: String,
}

/// `pip install <module>`.
pub struct InstallPythonModuleTool {
    pip: String,
    timeout: Duration,
}

impl InstallPythonModuleTool {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(pip: impl Into<String>) -> Self {
        Self {
            pip: pip.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Tool for InstallPythonModuleTool {
    fn name(&self) -> &str {
        "installPythonModule"
    }

    fn description(&self) -> &str {
        "Install a Python package using pip"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"moduleName": {"type": "string"}}), &["moduleName"])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Ml
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout + Duration::from_secs(5))
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: InstallParams = decode(self.name(), params)?;
        let module = non_empty(self.name(), "moduleName", &p.module_name)?;

        let output = run_with_timeout(self.name(), &self.pip, &["install", module], self.timeout).await?;
        if !output.status.success() {
            return Err(ToolError::execution(format!(
                "Failed to install '{}': {}",
                module,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(json!({
            "success": true,
            "message": format!("Successfully installed '{module}'"),
            "output": String::from_utf8_lossy(&output.stdout),
        }))
    }
}

/// Package names from `pip list --format=freeze` output.
pub fn parse_freeze(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split("==").next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// `pip list --format=freeze`, names only.
pub struct ListPythonModulesTool {
    pip: String,
    timeout: Duration,
}

impl ListPythonModulesTool {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(pip: impl Into<String>) -> Self {
        Self {
            pip: pip.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Tool for ListPythonModulesTool {
    fn name(&self) -> &str {
        "listPythonModules"
    }

    fn description(&self) -> &str {
        "List all installed Python packages"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({}), &[])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Ml
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout + Duration::from_secs(5))
    }

    async fn execute(&self, _params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let output = run_with_timeout(self.name(), &self.pip, &["list", "--format=freeze"], self.timeout)
            .await
            .map_err(|e| match e {
                ToolError::Timeout { .. } => e,
                other => ToolError::execution(format!("Failed to list Python modules: {other}")),
            })?;
        if !output.status.success() {
            return Err(ToolError::execution(format!(
                "Failed to list Python modules: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(json!(parse_freeze(&String::from_utf8_lossy(&output.stdout))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_params_accept_both_field_names() {
        let p: GenerateParams = decode(
            "generateMLPipeline",
            json!({"existingArtifact": "print(1)", "objectivePrompt": "lower MSE"}),
        )
        .unwrap();
        assert_eq!(p.existing_artifact.as_deref(), Some("print(1)"));
        assert_eq!(p.objective_prompt, "lower MSE");

        let p: GenerateParams =
            decode("generateMLPipeline", json!({"existingCode": null, "prompt": "start"})).unwrap();
        assert!(p.existing_artifact.is_none());
        assert_eq!(p.objective_prompt, "start");
    }

    #[test]
    fn objective_from_mse_line() {
        assert_eq!(parse_objective("training...\nMSE: 0.0421\n"), Some(0.0421));
        assert_eq!(parse_objective("mse = 12.5"), Some(12.5));
        assert_eq!(parse_objective("Test MSE:0.3\ndone"), Some(0.3));
    }

    #[test]
    fn objective_falls_back_to_last_line() {
        assert_eq!(parse_objective("epoch 1\nloss 7\nfinal 0.25\n"), Some(0.25));
        assert_eq!(parse_objective("no numbers"), None);
        assert_eq!(parse_objective(""), None);
    }

    #[test]
    fn freeze_output_names() {
        let names = parse_freeze("numpy==1.26.0\npandas==2.2.1\n\ncatboost==1.2\n");
        assert_eq!(names, vec!["numpy", "pandas", "catboost"]);
    }

    #[tokio::test]
    async fn generation_requires_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = GenerateMlPipelineTool::new(dir.path());
        let ctx = ExecutionContext::ephemeral("generateMLPipeline");
        let err = tool
            .execute(json!({"prompt": "predict BTC"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CAPABILITY_UNAVAILABLE");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn evaluates_candidate_with_interpreter() {
        let tool = TestMlPipelineTool::new("sh", Duration::from_secs(10));
        let ctx = ExecutionContext::ephemeral("testMLPipeline");
        let result = tool
            .execute(json!({"pythonCode": "echo 'fitting'\necho 'MSE: 0.042'"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["objective"], json!(0.042));
        assert_eq!(result["mse"], json!(0.042));
        assert!(result["rawOutput"].as_str().unwrap().contains("fitting"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unparseable_output_has_no_objective() {
        let tool = TestMlPipelineTool::new("sh", Duration::from_secs(10));
        let ctx = ExecutionContext::ephemeral("testMLPipeline");
        let result = tool
            .execute(json!({"candidate": "echo done"}), &ctx)
            .await
            .unwrap();
        assert!(result["objective"].is_null());
        assert_eq!(result["message"], "Pipeline executed but MSE not found in output");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn evaluation_times_out() {
        let tool = TestMlPipelineTool::new("sh", Duration::from_millis(200));
        let ctx = ExecutionContext::ephemeral("testMLPipeline");
        let err = tool
            .execute(json!({"candidate": "sleep 5"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn install_reports_failure_status() {
        let tool = InstallPythonModuleTool::new("false");
        let ctx = ExecutionContext::ephemeral("installPythonModule");
        let err = tool
            .execute(json!({"moduleName": "catboost"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to install 'catboost'"));
    }
}
