//! # Environment-Based Configuration
//!
//! Agent settings are loaded from environment variables through
//! [`AgentConfigBuilder::from_env`] and validated by
//! [`AgentConfigBuilder::build`].
//!
//! ## Environment Variables
//!
//! ### Memory
//! - `OBSCUREX_MEMORY_PATH` - Short-term snapshot file (default: `./agent_memory.json`)
//! - `OBSCUREX_LONG_TERM_MEMORY_PATH` - Long-term snapshot file (default: `./agent_longterm_memory.json`)
//! - `OBSCUREX_MAX_HISTORY` - Cap on archived versions per long-term key (default: unbounded)
//!
//! ### Language Model
//! - `OBSCUREX_MODEL` - Model name (default: `claude-3-5-sonnet-20241022`)
//! - `ANTHROPIC_API_KEY`, then `CLAUDE_API_KEY` - API key; no key disables the model
//! - `OBSCUREX_API_BASE_URL` - Messages API base URL (default: `https://api.anthropic.com`)
//! - `OBSCUREX_MODEL_TIMEOUT_SECS` - Per-request timeout (default: 120)
//!
//! ### Tools
//! - `OBSCUREX_TOOL_TIMEOUT_SECS` - Default per-invocation timeout (default: 300)
//! - `OBSCUREX_ARTIFACT_DIR` - Where generated pipelines are saved (default: `.`)
//! - `OBSCUREX_PYTHON` - Interpreter used to evaluate pipelines (default: `python3`)
//! - `OBSCUREX_PIP` - Package manager command (default: `pip3`)
//! - `OBSCUREX_BINANCE_BASE_URL` - Market data base URL (default: `https://api.binance.com`)

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use obscurex_tools::StandardToolsConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Error type for configuration loading
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Validated agent settings.
#[derive(Clone)]
pub struct AgentConfig {
    pub short_term_path: PathBuf,
    pub long_term_path: PathBuf,
    pub max_history: Option<usize>,
    pub model: String,
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub artifact_dir: PathBuf,
    pub python: String,
    pub pip: String,
    pub binance_base_url: String,
}

impl AgentConfig {
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::new()
    }

    /// Settings handed to the standard tool constructors.
    pub fn standard_tools(&self) -> StandardToolsConfig {
        StandardToolsConfig {
            artifact_dir: self.artifact_dir.clone(),
            python: self.python.clone(),
            pip: self.pip.clone(),
            evaluation_timeout: self.tool_timeout,
            binance_base_url: self.binance_base_url.clone(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        let builder = AgentConfigBuilder::default();
        AgentConfig {
            short_term_path: builder.short_term_path,
            long_term_path: builder.long_term_path,
            max_history: builder.max_history,
            model: builder.model,
            api_key: builder.api_key,
            api_base_url: builder.api_base_url,
            model_timeout: Duration::from_secs(builder.model_timeout_secs),
            tool_timeout: Duration::from_secs(builder.tool_timeout_secs),
            artifact_dir: builder.artifact_dir,
            python: builder.python,
            pip: builder.pip,
            binance_base_url: builder.binance_base_url,
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("short_term_path", &self.short_term_path)
            .field("long_term_path", &self.long_term_path)
            .field("max_history", &self.max_history)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("model_timeout", &self.model_timeout)
            .field("tool_timeout", &self.tool_timeout)
            .field("artifact_dir", &self.artifact_dir)
            .field("python", &self.python)
            .field("pip", &self.pip)
            .field("binance_base_url", &self.binance_base_url)
            .finish()
    }
}

/// Builder for [`AgentConfig`] with environment variable support
#[derive(Debug, Clone)]
pub struct AgentConfigBuilder {
    short_term_path: PathBuf,
    long_term_path: PathBuf,
    max_history: Option<usize>,
    model: String,
    api_key: Option<String>,
    api_base_url: String,
    model_timeout_secs: u64,
    tool_timeout_secs: u64,
    artifact_dir: PathBuf,
    python: String,
    pip: String,
    binance_base_url: String,
}

impl Default for AgentConfigBuilder {
    fn default() -> Self {
        Self {
            short_term_path: PathBuf::from("./agent_memory.json"),
            long_term_path: PathBuf::from("./agent_longterm_memory.json"),
            max_history: None,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model_timeout_secs: 120,
            tool_timeout_secs: 300,
            artifact_dir: PathBuf::from("."),
            python: "python3".to_string(),
            pip: "pip3".to_string(),
            binance_base_url: DEFAULT_BINANCE_BASE_URL.to_string(),
        }
    }
}

impl AgentConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::default();

        // Memory
        if let Some(path) = get("OBSCUREX_MEMORY_PATH") {
            builder = builder.short_term_path(path);
        }
        if let Some(path) = get("OBSCUREX_LONG_TERM_MEMORY_PATH") {
            builder = builder.long_term_path(path);
        }
        if let Some(max) = parse_number::<usize>("OBSCUREX_MAX_HISTORY", get("OBSCUREX_MAX_HISTORY"))? {
            builder = builder.max_history(Some(max));
        }

        // Language model
        if let Some(model) = get("OBSCUREX_MODEL") {
            builder = builder.model(model);
        }
        if let Some(key) = get("ANTHROPIC_API_KEY").or_else(|| get("CLAUDE_API_KEY")) {
            builder = builder.api_key(key);
        }
        if let Some(url) = get("OBSCUREX_API_BASE_URL") {
            builder = builder.api_base_url(url);
        }
        if let Some(secs) = parse_number::<u64>(
            "OBSCUREX_MODEL_TIMEOUT_SECS",
            get("OBSCUREX_MODEL_TIMEOUT_SECS"),
        )? {
            builder = builder.model_timeout_secs(secs);
        }

        // Tools
        if let Some(secs) = parse_number::<u64>(
            "OBSCUREX_TOOL_TIMEOUT_SECS",
            get("OBSCUREX_TOOL_TIMEOUT_SECS"),
        )? {
            builder = builder.tool_timeout_secs(secs);
        }
        if let Some(dir) = get("OBSCUREX_ARTIFACT_DIR") {
            builder = builder.artifact_dir(dir);
        }
        if let Some(python) = get("OBSCUREX_PYTHON") {
            builder = builder.python(python);
        }
        if let Some(pip) = get("OBSCUREX_PIP") {
            builder = builder.pip(pip);
        }
        if let Some(url) = get("OBSCUREX_BINANCE_BASE_URL") {
            builder = builder.binance_base_url(url);
        }

        Ok(builder)
    }

    #[must_use]
    pub fn short_term_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.short_term_path = path.into();
        self
    }

    #[must_use]
    pub fn long_term_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.long_term_path = path.into();
        self
    }

    /// Keep at most this many archived versions per long-term key.
    #[must_use]
    pub fn max_history(mut self, max: Option<usize>) -> Self {
        self.max_history = max;
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn model_timeout_secs(mut self, secs: u64) -> Self {
        self.model_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    #[must_use]
    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    #[must_use]
    pub fn pip(mut self, pip: impl Into<String>) -> Self {
        self.pip = pip.into();
        self
    }

    #[must_use]
    pub fn binance_base_url(mut self, url: impl Into<String>) -> Self {
        self.binance_base_url = url.into();
        self
    }

    /// Validate configuration and build [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the configuration is invalid.
    pub fn build(self) -> Result<AgentConfig, ConfigError> {
        self.validate()?;

        Ok(AgentConfig {
            short_term_path: self.short_term_path,
            long_term_path: self.long_term_path,
            max_history: self.max_history,
            model: self.model,
            api_key: self.api_key,
            api_base_url: self.api_base_url,
            model_timeout: Duration::from_secs(self.model_timeout_secs),
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
            artifact_dir: self.artifact_dir,
            python: self.python,
            pip: self.pip,
            binance_base_url: self.binance_base_url,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "model_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.tool_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "tool_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.short_term_path.as_os_str().is_empty() || self.long_term_path.as_os_str().is_empty()
        {
            return Err(ConfigError::Validation(
                "memory paths cannot be empty".to_string(),
            ));
        }
        if self.short_term_path == self.long_term_path {
            return Err(ConfigError::Validation(
                "short-term and long-term memory must use different files".to_string(),
            ));
        }

        if self.max_history == Some(0) {
            return Err(ConfigError::Validation(
                "max_history must be at least 1 when set".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model cannot be empty".to_string()));
        }

        Ok(())
    }
}

fn parse_number<T>(key: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.map(|value| {
        value.trim().parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
            key: key.to_string(),
            message: format!("'{value}': {e}"),
        })
    })
    .transpose()
}

/// Settings for one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationConfig {
    pub initial_prompt: String,
    /// Stop once the best objective is at or below this value.
    #[serde(alias = "mseThreshold")]
    pub threshold: f64,
    pub max_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
    pub verbose: bool,
    pub generation_tool: String,
    pub evaluation_tool: String,
    /// Long-term memory key the best result is mirrored under.
    pub best_state_key: String,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            initial_prompt: "Create a price prediction pipeline for Binance data using CatBoost"
                .to_string(),
            threshold: 0.1,
            max_iterations: 50,
            data_file: None,
            verbose: true,
            generation_tool: "generateMLPipeline".to_string(),
            evaluation_tool: "testMLPipeline".to_string(),
            best_state_key: "best_pipeline".to_string(),
        }
    }
}

impl OptimizationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() {
            return Err(ConfigError::Validation(
                "threshold must be a finite number".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "max_iterations must be greater than 0".to_string(),
            ));
        }
        if self.best_state_key.is_empty() {
            return Err(ConfigError::Validation(
                "best_state_key cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The prompt for the first generation, with the data file appended.
    pub fn seed_prompt(&self) -> String {
        match &self.data_file {
            Some(file) => format!("{} (data file: {})", self.initial_prompt, file.display()),
            None => self.initial_prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfigBuilder::from_lookup(lookup(&[])).unwrap().build().unwrap();
        assert_eq!(config.short_term_path, PathBuf::from("./agent_memory.json"));
        assert_eq!(config.long_term_path, PathBuf::from("./agent_longterm_memory.json"));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_key, None);
        assert_eq!(config.model_timeout, Duration::from_secs(120));
        assert_eq!(config.tool_timeout, Duration::from_secs(300));
        assert_eq!(config.max_history, None);
    }

    #[test]
    fn test_env_overrides() {
        let config = AgentConfigBuilder::from_lookup(lookup(&[
            ("OBSCUREX_MEMORY_PATH", "/tmp/st.json"),
            ("OBSCUREX_LONG_TERM_MEMORY_PATH", "/tmp/lt.json"),
            ("OBSCUREX_MAX_HISTORY", "10"),
            ("OBSCUREX_TOOL_TIMEOUT_SECS", "60"),
            ("OBSCUREX_PYTHON", "/usr/bin/python3.12"),
        ]))
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(config.short_term_path, PathBuf::from("/tmp/st.json"));
        assert_eq!(config.max_history, Some(10));
        assert_eq!(config.tool_timeout, Duration::from_secs(60));
        assert_eq!(config.standard_tools().python, "/usr/bin/python3.12");
        assert_eq!(config.standard_tools().evaluation_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_api_key_fallback() {
        let config = AgentConfigBuilder::from_lookup(lookup(&[("CLAUDE_API_KEY", "k2")]))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("k2"));

        let config = AgentConfigBuilder::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "k1"),
            ("CLAUDE_API_KEY", "k2"),
        ]))
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("k1"));
        assert!(!format!("{config:?}").contains("k1"));
    }

    #[test]
    fn test_invalid_number() {
        let err = AgentConfigBuilder::from_lookup(lookup(&[("OBSCUREX_MODEL_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref key, .. } if key == "OBSCUREX_MODEL_TIMEOUT_SECS"));
    }

    #[test]
    fn test_validation() {
        let err = AgentConfigBuilder::new().tool_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("tool_timeout_secs"));

        let err = AgentConfigBuilder::new()
            .short_term_path("same.json")
            .long_term_path("same.json")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("different files"));

        let err = AgentConfigBuilder::new().max_history(Some(0)).build().unwrap_err();
        assert!(err.to_string().contains("max_history"));
    }

    #[test]
    fn test_optimization_config() {
        let config = OptimizationConfig::default();
        assert_eq!(config.threshold, 0.1);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.best_state_key, "best_pipeline");
        assert!(config.validate().is_ok());

        let bad = OptimizationConfig {
            max_iterations: 0,
            ..OptimizationConfig::default()
        };
        assert!(bad.validate().is_err());

        let parsed: OptimizationConfig = serde_json::from_value(serde_json::json!({
            "initialPrompt": "p",
            "mseThreshold": 0.05,
            "maxIterations": 3,
            "verbose": false,
            "generationTool": "g",
            "evaluationTool": "e",
            "bestStateKey": "best"
        }))
        .unwrap();
        assert_eq!(parsed.threshold, 0.05);
    }
}
