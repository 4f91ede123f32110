//! Network-backed tools.

pub mod binance;

pub use binance::DownloadBinancePriceHistoryTool;
