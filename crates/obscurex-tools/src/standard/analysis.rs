//! # Price Analysis Tools
//!
//! Summary statistics over a price CSV and natively computed technical
//! indicators appended as new columns.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use obscurex_core::{ExecutionContext, Tool, ToolCategory, ToolError, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

use super::object_schema;
use super::table::CsvTable;
use crate::params::decode;

#[derive(Debug, Deserialize)]
struct FileParams {
    filename: PathBuf,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn trend(bullish: bool) -> &'static str {
    if bullish { "bullish" } else { "bearish" }
}

/// Price, volume, volatility and trend statistics for a price CSV.
pub fn analyze_prices(table: &CsvTable) -> ToolResult<Value> {
    let close = table.numeric_column("close")?;
    let high = table.numeric_column("high")?;
    let low = table.numeric_column("low")?;
    let volume = table.numeric_column("volume")?;

    let (Some(&start), Some(&current)) = (close.first(), close.last()) else {
        return Err(ToolError::execution("No price rows to analyze"));
    };

    let returns: Vec<f64> = close
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    let recent = &close[close.len().saturating_sub(10)..];
    let average = mean(&close);
    let std = sample_std(&close);
    let change_percent = if start != 0.0 {
        (current - start) / start * 100.0
    } else {
        0.0
    };

    Ok(json!({
        "price": {
            "min": min(&low),
            "max": max(&high),
            "average": average,
            "current": current,
            "start": start,
            "change": current - start,
            "changePercent": change_percent,
        },
        "volume": {
            "total": volume.iter().sum::<f64>(),
            "average": mean(&volume),
            "min": min(&volume),
            "max": max(&volume),
        },
        "volatility": {
            "standardDeviation": std,
            "volatilityPercent": std / average * 100.0,
            "averageReturn": mean(&returns) * 100.0,
        },
        "trends": {
            "shortTerm": trend(current > mean(recent)),
            "overall": trend(current > start),
        },
    }))
}

pub struct AnalyzeBinanceDataTool;

#[async_trait]
impl Tool for AnalyzeBinanceDataTool {
    fn name(&self) -> &str {
        "analyzeBinanceData"
    }

    fn description(&self) -> &str {
        "Analyze Binance price data and provide statistics (volatility, trends, volume analysis)"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"filename": {"type": "string"}}), &["filename"])
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: FileParams = decode(self.name(), params)?;
        let table = CsvTable::read(&p.filename).await?;
        analyze_prices(&table)
    }
}

/// Indicator families computed from the close column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub kind: IndicatorKind,
    pub period: usize,
}

impl Indicator {
    pub const DEFAULT_PERIOD: usize = 14;

    /// Parse `SMA`, `ema_20`, `RSI-7` and similar.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim().to_uppercase();
        let (kind, period) = match spec.split_once(['_', '-']) {
            Some((kind, period)) => (kind.to_string(), period.parse::<usize>().ok()?),
            None => (spec, Self::DEFAULT_PERIOD),
        };
        if period == 0 {
            return None;
        }
        let kind = match kind.as_str() {
            "SMA" => IndicatorKind::Sma,
            "EMA" => IndicatorKind::Ema,
            "RSI" => IndicatorKind::Rsi,
            _ => return None,
        };
        Some(Self { kind, period })
    }

    pub fn compute(&self, close: &[f64]) -> Vec<Option<f64>> {
        match self.kind {
            IndicatorKind::Sma => sma(close, self.period),
            IndicatorKind::Ema => ema(close, self.period),
            IndicatorKind::Rsi => rsi(close, self.period),
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Ema => "EMA",
            IndicatorKind::Rsi => "RSI",
        };
        write!(f, "{}_{}", kind, self.period)
    }
}

pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| (i + 1 >= period).then(|| mean(&values[i + 1 - period..=i])))
        .collect()
}

/// Exponential moving average seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if values.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = mean(&values[..period]);
    out[period - 1] = Some(prev);
    for i in period..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = Some(prev);
    }
    out
}

/// Wilder's relative strength index.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if values.len() <= period {
        return out;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| c.max(0.0);
    let loss = |c: f64| (-c).max(0.0);

    let mut avg_gain = changes[..period].iter().copied().map(gain).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().copied().map(loss).sum::<f64>() / period as f64;

    let index = |g: f64, l: f64| {
        if l == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + g / l)
        }
    };

    out[period] = Some(index(avg_gain, avg_loss));
    for (i, &change) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (period - 1) as f64 + gain(change)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(change)) / period as f64;
        out[i + 1] = Some(index(avg_gain, avg_loss));
    }
    out
}

#[derive(Debug, Deserialize)]
struct IndicatorParams {
    filename: PathBuf,
    #[serde(default)]
    indicators: Vec<String>,
}

/// Compute SMA/EMA/RSI columns from `close` and append them to the CSV.
pub struct CalculateCryptoIndicatorsTool;

#[async_trait]
impl Tool for CalculateCryptoIndicatorsTool {
    fn name(&self) -> &str {
        "calculateCryptoIndicators"
    }

    fn description(&self) -> &str {
        "Calculate and add technical indicators (SMA, EMA, RSI) to Binance CSV data"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({
                "filename": {"type": "string"},
                "indicators": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "e.g. [\"SMA_14\", \"EMA_20\", \"RSI_14\"]"
                }
            }),
            &["filename", "indicators"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: IndicatorParams = decode(self.name(), params)?;
        if p.indicators.is_empty() {
            return Err(ToolError::invalid_parameters(self.name(), "no indicators requested"));
        }

        let mut table = CsvTable::read(&p.filename).await?;
        let close_index = table
            .column_index("close")
            .ok_or_else(|| ToolError::execution("Column 'close' not found"))?;
        let close = table
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.get(close_index)
                    .and_then(|c| c.trim().parse::<f64>().ok())
                    .ok_or_else(|| ToolError::execution(format!("non-numeric close value on row {}", i + 1)))
            })
            .collect::<ToolResult<Vec<f64>>>()?;

        let mut added = Vec::new();
        let mut skipped = Vec::new();
        for spec in &p.indicators {
            let Some(indicator) = Indicator::parse(spec) else {
                skipped.push(json!({"indicator": spec, "reason": "unsupported indicator"}));
                continue;
            };
            let column = indicator.to_string();
            if table.column_index(&column).is_some() {
                skipped.push(json!({"indicator": spec, "reason": format!("column '{column}' already exists")}));
                continue;
            }
            let values = indicator
                .compute(&close)
                .into_iter()
                .map(|v| v.map(|v| format!("{v:.6}")).unwrap_or_default());
            table.push_column(&column, values);
            added.push(column);
        }

        if !added.is_empty() {
            table.write(&p.filename).await?;
        }

        Ok(json!({
            "success": true,
            "message": format!("Added {} indicator(s) to {}", added.len(), p.filename.display()),
            "indicators": added,
            "skipped": skipped,
            "filename": p.filename,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sma_window() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(out, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn ema_seeded_with_sma() {
        let out = ema(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out[1], None);
        assert!(approx(out[2].unwrap(), 2.0));
        assert!(approx(out[3].unwrap(), 0.5 * 4.0 + 0.5 * 2.0));
    }

    #[test]
    fn rsi_extremes() {
        let rising: Vec<f64> = (1..=10).map(f64::from).collect();
        let out = rsi(&rising, 3);
        assert_eq!(out[2], None);
        assert_eq!(out[3], Some(100.0));

        let falling: Vec<f64> = (1..=10).rev().map(f64::from).collect();
        assert!(approx(rsi(&falling, 3)[9].unwrap(), 0.0));
    }

    #[test]
    fn parses_indicator_specs() {
        assert_eq!(
            Indicator::parse("ema_20"),
            Some(Indicator { kind: IndicatorKind::Ema, period: 20 })
        );
        assert_eq!(Indicator::parse("RSI").unwrap().period, 14);
        assert_eq!(Indicator::parse("SMA-5").unwrap().to_string(), "SMA_5");
        assert!(Indicator::parse("MACD").is_none());
        assert!(Indicator::parse("SMA_0").is_none());
    }

    #[test]
    fn analysis_statistics() {
        let table = CsvTable::parse(
            "timestamp,open,high,low,close,volume\n\
             1,10,11,9,10,100\n\
             2,10,13,9.5,12,200\n\
             3,12,12.5,8,11,300\n",
        )
        .unwrap();
        let stats = analyze_prices(&table).unwrap();
        assert_eq!(stats["price"]["min"], 8.0);
        assert_eq!(stats["price"]["max"], 13.0);
        assert_eq!(stats["price"]["current"], 11.0);
        assert_eq!(stats["price"]["change"], 1.0);
        assert!(approx(stats["price"]["changePercent"].as_f64().unwrap(), 10.0));
        assert_eq!(stats["volume"]["total"], 600.0);
        assert!(approx(stats["volatility"]["standardDeviation"].as_f64().unwrap(), 1.0));
        // The last close equals the recent mean, which is not above it.
        assert_eq!(stats["trends"]["shortTerm"], "bearish");
        assert_eq!(stats["trends"]["overall"], "bullish");
    }

    #[tokio::test]
    async fn appends_indicator_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.csv");
        fs::write(&path, "timestamp,close\n1,1\n2,2\n3,3\n").unwrap();

        let ctx = ExecutionContext::ephemeral("calculateCryptoIndicators");
        let result = CalculateCryptoIndicatorsTool
            .execute(json!({"filename": path, "indicators": ["SMA_2", "MACD"]}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["indicators"], json!(["SMA_2"]));
        assert_eq!(result["skipped"][0]["indicator"], "MACD");

        let csv = fs::read_to_string(&path).unwrap();
        assert_eq!(
            csv,
            "timestamp,close,SMA_2\n1,1,\n2,2,1.500000\n3,3,2.500000\n"
        );
    }
}
