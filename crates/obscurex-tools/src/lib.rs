//! # ObscureX Tools
//!
//! The tool registry and the standard tool library for ObscureX agents.
//!
//! ## Tool Categories
//!
//! - **memory**: store, retrieve and search short-term and long-term memory
//! - **csv**: add, list and remove technical-indicator columns
//! - **ml**: generate and evaluate ML pipelines, manage Python packages
//! - **market** (`network` feature): download Binance price history
//! - **analysis**: price statistics and native SMA/EMA/RSI indicators
//! - **autonomy**: model-assisted decisions for the optimization loop
//!
//! ## Usage
//!
//! ```rust
//! use obscurex_tools::{StandardToolsConfig, ToolRegistry, standard_manifest};
//!
//! let mut registry = ToolRegistry::new();
//! let report = registry.populate(standard_manifest(&StandardToolsConfig::default()));
//! assert!(report.skipped.is_empty());
//! assert!(registry.resolve("storeMemory").is_some());
//! ```

/// Registry errors.
pub mod error;
/// Parameter decoding helpers shared by the standard tools.
pub mod params;
/// Ordered tool registry and manifest-based population.
pub mod registry;
/// Standard tool library.
pub mod standard;

pub use error::RegistryError;
pub use obscurex_core::{Tool, ToolCategory, ToolDescriptor};
pub use registry::{PopulationReport, SkippedTool, ToolManifest, ToolRegistry};
pub use standard::{MODEL_ALLOW_LIST, StandardToolsConfig, standard_manifest};
