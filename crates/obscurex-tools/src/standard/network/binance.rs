//! # Binance Price History
//!
//! Download klines from the Binance REST API and save them as CSV.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use obscurex_core::{ExecutionContext, Tool, ToolCategory, ToolError, ToolResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::params::decode;
use crate::standard::object_schema;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

pub const VALID_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

pub const MAX_LIMIT: u32 = 1000;

pub const CSV_HEADER: &str = "timestamp,open,high,low,close,volume,close_time,quote_volume,trades,taker_buy_volume,taker_buy_quote_volume";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadParams {
    symbol: String,
    interval: String,
    #[serde(default)]
    start_time: Option<Value>,
    #[serde(default)]
    end_time: Option<Value>,
    #[serde(default = "default_limit")]
    limit: u32,
    output_file: PathBuf,
}

fn default_limit() -> u32 {
    MAX_LIMIT
}

/// Epoch milliseconds, given as a number, a numeric string or RFC 3339.
fn parse_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        _ => None,
    }
}

fn iso_date(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Render one kline array as a CSV row of its first eleven fields.
fn kline_row(kline: &[Value]) -> String {
    kline
        .iter()
        .take(11)
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub struct DownloadBinancePriceHistoryTool {
    client: Client,
    base_url: String,
}

impl DownloadBinancePriceHistoryTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for DownloadBinancePriceHistoryTool {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl Tool for DownloadBinancePriceHistoryTool {
    fn name(&self) -> &str {
        "downloadBinancePriceHistory"
    }

    fn description(&self) -> &str {
        "Download historical cryptocurrency price data from Binance in CSV format"
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({
                "symbol": {"type": "string"},
                "interval": {"type": "string", "enum": VALID_INTERVALS},
                "startTime": {"type": ["string", "integer", "null"]},
                "endTime": {"type": ["string", "integer", "null"]},
                "limit": {"type": "integer", "maximum": MAX_LIMIT},
                "outputFile": {"type": "string"}
            }),
            &["symbol", "interval", "outputFile"],
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Market
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> ToolResult<Value> {
        let p: DownloadParams = decode(self.name(), params)?;

        if !VALID_INTERVALS.contains(&p.interval.as_str()) {
            return Err(ToolError::invalid_parameters(
                self.name(),
                format!("Invalid interval. Must be one of: {}", VALID_INTERVALS.join(", ")),
            ));
        }
        if p.limit > MAX_LIMIT {
            return Err(ToolError::invalid_parameters(
                self.name(),
                "Limit cannot exceed 1000 per request",
            ));
        }

        let symbol = p.symbol.to_uppercase();
        let mut query: Vec<(&str, String)> = vec![
            ("symbol", symbol.clone()),
            ("interval", p.interval.clone()),
            ("limit", p.limit.to_string()),
        ];
        for (name, value) in [("startTime", &p.start_time), ("endTime", &p.end_time)] {
            let Some(value) = value.as_ref().filter(|v| !v.is_null()) else {
                continue;
            };
            let millis = parse_time(value).ok_or_else(|| {
                ToolError::invalid_parameters(self.name(), format!("unparseable {name}: {value}"))
            })?;
            query.push((name, millis.to_string()));
        }

        tracing::info!(symbol = %symbol, interval = %p.interval, "Downloading Binance price history");

        let url = format!("{}/api/v3/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&query)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ToolError::execution(format!("Failed to download Binance data: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::execution(format!(
                "Failed to download Binance data: HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let klines: Vec<Vec<Value>> = response
            .json()
            .await
            .map_err(|e| ToolError::execution(format!("Failed to parse Binance response: {e}")))?;

        let (Some(first), Some(last)) = (klines.first(), klines.last()) else {
            return Err(ToolError::execution("No data received from Binance API"));
        };
        let open_time = |k: &[Value]| k.first().and_then(Value::as_i64).and_then(iso_date);
        let start_date = open_time(first);
        let end_date = open_time(last);

        let mut csv = String::from(CSV_HEADER);
        csv.push('\n');
        for kline in &klines {
            csv.push_str(&kline_row(kline));
            csv.push('\n');
        }
        tokio::fs::write(&p.output_file, csv).await?;

        tracing::info!(records = klines.len(), file = ?p.output_file, "Saved Binance price history");
        Ok(json!({
            "success": true,
            "symbol": p.symbol,
            "interval": p.interval,
            "records": klines.len(),
            "filename": p.output_file,
            "startDate": start_date,
            "endDate": end_date,
            "message": format!("Downloaded {} {} candles for {}", klines.len(), p.interval, p.symbol),
        }))
    }
}
