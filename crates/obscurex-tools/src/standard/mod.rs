//! # Standard Tool Library
//!
//! The tools an ObscureX agent ships with, grouped by domain:
//!
//! - **Memory**: short-term and versioned long-term store access
//! - **CSV**: indicator column management for price files
//! - **ML**: pipeline generation and evaluation, Python package management
//! - **Market**: Binance price history download (`network` feature)
//! - **Analysis**: price statistics and native indicator computation
//! - **Autonomy**: model-assisted decisions for the optimization loop
//!
//! [`standard_manifest`] lists all of them for [`ToolRegistry::populate`].
//!
//! [`ToolRegistry::populate`]: crate::ToolRegistry::populate

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use obscurex_core::{Tool, ToolCategory};
use serde_json::{Value, json};

use crate::registry::ToolManifest;

/// Price statistics and SMA/EMA/RSI indicators
pub mod analysis;
/// Model-assisted decision tools
pub mod autonomy;
/// Indicator column management
pub mod csv;
/// Memory store tools
pub mod memory;
/// ML pipeline and Python package tools
pub mod ml;
/// Market data download
#[cfg(feature = "network")]
pub mod network;
/// Minimal CSV table model shared by the file tools
pub mod table;

pub use analysis::{AnalyzeBinanceDataTool, CalculateCryptoIndicatorsTool};
pub use autonomy::{
    AnalyzeContextTool, ExecuteAutonomousDecisionTool, GetExecutionOptionsTool,
    RecommendOptimizationStrategyTool,
};
pub use csv::{AddTechnicalIndicatorTool, ListTechnicalIndicatorsTool, RemoveTechnicalIndicatorTool};
pub use memory::{
    RetrieveLongTermMemoryTool, RetrieveMemoryTool, SearchLongTermMemoryTool, SearchMemoryTool,
    StoreLongTermMemoryTool, StoreMemoryTool,
};
pub use ml::{GenerateMlPipelineTool, InstallPythonModuleTool, ListPythonModulesTool, TestMlPipelineTool};
#[cfg(feature = "network")]
pub use network::DownloadBinancePriceHistoryTool;

/// Tools that receive a language-model handle in their context.
pub const MODEL_ALLOW_LIST: &[&str] = &[
    "generateMLPipeline",
    "analyzeContext",
    "getExecutionOptions",
    "recommendOptimizationStrategy",
    "executeAutonomousDecision",
];

/// Object schema with the given properties and required keys.
pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Settings the standard tools are constructed with.
#[derive(Debug, Clone)]
pub struct StandardToolsConfig {
    /// Directory generated pipelines are written to.
    pub artifact_dir: PathBuf,
    pub python: String,
    pub pip: String,
    pub evaluation_timeout: Duration,
    pub binance_base_url: String,
}

impl Default for StandardToolsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("."),
            python: "python3".to_string(),
            pip: "pip3".to_string(),
            evaluation_timeout: TestMlPipelineTool::DEFAULT_TIMEOUT,
            binance_base_url: "https://api.binance.com".to_string(),
        }
    }
}

fn entry(manifest: ToolManifest, category: ToolCategory, tool: impl Tool + 'static) -> ToolManifest {
    manifest.with_tool(category, Arc::new(tool))
}

/// The full standard library, in registration order.
pub fn standard_manifest(config: &StandardToolsConfig) -> ToolManifest {
    let mut manifest = ToolManifest::new();

    manifest = entry(manifest, ToolCategory::Memory, StoreMemoryTool);
    manifest = entry(manifest, ToolCategory::Memory, RetrieveMemoryTool);
    manifest = entry(manifest, ToolCategory::Memory, SearchMemoryTool);
    manifest = entry(manifest, ToolCategory::Memory, StoreLongTermMemoryTool);
    manifest = entry(manifest, ToolCategory::Memory, RetrieveLongTermMemoryTool);
    manifest = entry(manifest, ToolCategory::Memory, SearchLongTermMemoryTool);

    manifest = entry(manifest, ToolCategory::Csv, AddTechnicalIndicatorTool);
    manifest = entry(manifest, ToolCategory::Csv, ListTechnicalIndicatorsTool);
    manifest = entry(manifest, ToolCategory::Csv, RemoveTechnicalIndicatorTool);

    manifest = entry(
        manifest,
        ToolCategory::Ml,
        GenerateMlPipelineTool::new(config.artifact_dir.clone()),
    );
    manifest = entry(
        manifest,
        ToolCategory::Ml,
        TestMlPipelineTool::new(config.python.clone(), config.evaluation_timeout),
    );
    manifest = entry(manifest, ToolCategory::Ml, InstallPythonModuleTool::new(config.pip.clone()));
    manifest = entry(manifest, ToolCategory::Ml, ListPythonModulesTool::new(config.pip.clone()));

    #[cfg(feature = "network")]
    {
        let base_url = config.binance_base_url.clone();
        manifest = manifest.with("downloadBinancePriceHistory", ToolCategory::Market, move || {
            Ok(Arc::new(DownloadBinancePriceHistoryTool::new(base_url)) as Arc<dyn Tool>)
        });
    }

    manifest = entry(manifest, ToolCategory::Analysis, AnalyzeBinanceDataTool);
    manifest = entry(manifest, ToolCategory::Analysis, CalculateCryptoIndicatorsTool);

    manifest = entry(manifest, ToolCategory::Autonomy, AnalyzeContextTool);
    manifest = entry(manifest, ToolCategory::Autonomy, GetExecutionOptionsTool);
    manifest = entry(manifest, ToolCategory::Autonomy, RecommendOptimizationStrategyTool);
    manifest = entry(manifest, ToolCategory::Autonomy, ExecuteAutonomousDecisionTool);

    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolRegistry;

    #[test]
    fn manifest_populates_cleanly() {
        let mut registry = ToolRegistry::new();
        let report = registry.populate(standard_manifest(&StandardToolsConfig::default()));
        assert!(report.is_complete(), "skipped: {:?}", report.skipped);
        assert_eq!(report.loaded.len(), registry.len());
        assert_eq!(registry.names()[0], "storeMemory");
    }

    #[test]
    fn allow_listed_tools_are_registered() {
        let mut registry = ToolRegistry::new();
        registry.populate(standard_manifest(&StandardToolsConfig::default()));
        for name in MODEL_ALLOW_LIST {
            assert!(registry.contains(name), "{name} missing");
        }
    }

    #[test]
    fn listing_reports_categories() {
        let mut registry = ToolRegistry::new();
        registry.populate(standard_manifest(&StandardToolsConfig::default()));
        let descriptors = registry.list();
        let memory = descriptors
            .iter()
            .filter(|d| d.category == ToolCategory::Memory)
            .count();
        assert_eq!(memory, 6);
        assert!(
            descriptors
                .iter()
                .all(|d| d.parameters["type"] == "object")
        );
    }

    #[cfg(feature = "network")]
    #[test]
    fn network_tools_are_market_category() {
        let mut registry = ToolRegistry::new();
        registry.populate(standard_manifest(&StandardToolsConfig::default()));
        let download = registry
            .list()
            .into_iter()
            .find(|d| d.name == "downloadBinancePriceHistory")
            .unwrap();
        assert_eq!(download.category, ToolCategory::Market);
    }
}
