//! Application Services
//!
//! - `TickerService`: subscription encoding, inbound decoding and ticker fan-out
//! - `HistoricalSeriesFetcher`: backward pagination of the candle endpoint

pub mod history;
pub mod ticker;

pub use history::{FetchReport, HistoricalSeriesFetcher, HistoryConfig, HistoryError, StopReason};
pub use ticker::{TickerService, TickerServiceError};
