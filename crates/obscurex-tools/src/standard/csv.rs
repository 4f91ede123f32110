//! # CSV Indicator Tools
//!
//! Manage technical-indicator columns in price CSV files.

use std::path::PathBuf;

use async_trait::async_trait;
use obscurex_core::{ExecutionContext, Tool, ToolCategory, ToolError, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

use super::object_schema;
use super::table::CsvTable;
use crate::params::decode;

/// Columns that are price data rather than indicators (compared lowercase).
pub const STANDARD_COLUMNS: &[&str] = &[
    "date",
    "time",
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "open_time",
    "close_time",
    "quote_asset_volume",
    "quote_volume",
    "number_of_trades",
    "num_trades",
    "trades",
    "taker_buy_base_asset_volume",
    "taker_buy_volume",
    "taker_buy_quote_asset_volume",
    "taker_buy_quote_volume",
    "ignore",
    "symbol",
    "interval",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndicatorParams {
    filename: PathBuf,
    indicator_name: String,
}

#[derive(Debug, Deserialize)]
struct FileParams {
    filename: PathBuf,
}

fn indicator_schema() -> Value {
    object_schema(
        json!({
            "filename": {"type": "string"},
            "indicatorName": {"type": "string"}
        }),
        &["filename", "indicatorName"],
    )
}

/// Append an indicator column filled with `0`.
pub struct AddTechnicalIndicatorTool;

#[async_trait]
impl Tool for AddTechnicalIndicatorTool {
    fn name(&self) -> &str {
        "addTechnicalIndicator"
    }

    fn description(&self) -> &str {
        "Add a technical indicator column to a CSV file (works with Binance price data)"
    }

    fn parameters_schema(&self) -> Value {
        indicator_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Csv
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: IndicatorParams = decode(self.name(), params)?;
        let mut table = CsvTable::read(&p.filename).await?;

        if table.column_index(&p.indicator_name).is_some() {
            return Err(ToolError::execution(format!(
                "Indicator '{}' already exists in {}",
                p.indicator_name,
                p.filename.display()
            )));
        }

        let rows = table.rows.len();
        table.push_column(&p.indicator_name, std::iter::repeat_n("0".to_string(), rows));
        table.write(&p.filename).await?;

        tracing::debug!(file = ?p.filename, indicator = %p.indicator_name, "Added indicator column");
        Ok(json!({
            "success": true,
            "message": format!("Indicator '{}' added to {}", p.indicator_name, p.filename.display()),
        }))
    }
}

/// List the non-standard columns of a CSV file.
pub struct ListTechnicalIndicatorsTool;

#[async_trait]
impl Tool for ListTechnicalIndicatorsTool {
    fn name(&self) -> &str {
        "listTechnicalIndicators"
    }

    fn description(&self) -> &str {
        "List technical indicators added to a CSV file (works with Binance price data)"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"filename": {"type": "string"}}), &["filename"])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Csv
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: FileParams = decode(self.name(), params)?;
        let table = match CsvTable::read(&p.filename).await {
            Ok(table) => table,
            Err(ToolError::ExecutionFailed(msg)) if msg.starts_with("File is empty") => {
                return Ok(json!([]));
            }
            Err(e) => return Err(e),
        };

        let indicators: Vec<&String> = table
            .headers
            .iter()
            .filter(|h| !STANDARD_COLUMNS.contains(&h.to_lowercase().as_str()))
            .collect();
        Ok(json!(indicators))
    }
}

/// Drop an indicator column.
pub struct RemoveTechnicalIndicatorTool;

#[async_trait]
impl Tool for RemoveTechnicalIndicatorTool {
    fn name(&self) -> &str {
        "removeTechnicalIndicator"
    }

    fn description(&self) -> &str {
        "Remove a technical indicator from a CSV file (works with Binance price data)"
    }

    fn parameters_schema(&self) -> Value {
        indicator_schema()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Csv
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: IndicatorParams = decode(self.name(), params)?;
        let mut table = CsvTable::read(&p.filename).await?;

        let index = table.column_index(&p.indicator_name).ok_or_else(|| {
            ToolError::execution(format!(
                "Indicator '{}' not found in {}",
                p.indicator_name,
                p.filename.display()
            ))
        })?;
        table.remove_column(index);
        table.write(&p.filename).await?;

        Ok(json!({
            "success": true,
            "message": format!("Indicator '{}' removed from {}", p.indicator_name, p.filename.display()),
        }))
    }
}
