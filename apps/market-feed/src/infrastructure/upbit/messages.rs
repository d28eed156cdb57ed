//! Upbit Wire Types
//!
//! Serde shapes for the Upbit WebSocket ticker stream and the REST candle
//! endpoints.
//!
//! # Subscription
//!
//! One JSON array with a ticket, a type and a format element:
//!
//! ```json
//! [{"ticket":"6f1c..."},
//!  {"type":"ticker","codes":["KRW-BTC"],"is_only_snapshot":false,"is_only_realtime":false},
//!  {"format":"DEFAULT"}]
//! ```
//!
//! # Ticker
//!
//! `DEFAULT` frames use full field names, `SIMPLE_LIST` frames abbreviate
//! them. Both decode into [`TickerMessage`]:
//!
//! ```json
//! {"type":"ticker","code":"KRW-BTC","trade_price":51000000.0,"change":"RISE",
//!  "change_price":250000.0,"change_rate":0.0049,"acc_trade_volume_24h":1234.5,...}
//! {"ty":"ticker","cd":"KRW-BTC","tp":51000000.0,"c":"RISE","cp":250000.0,"cr":0.0049,...}
//! ```
//!
//! Numeric fields that are missing, null or not numbers decode as zero so a
//! partially degraded frame still yields a ticker.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::market::{Candle, ChangeDirection, SubscriptionRequest, TickerValue};

/// Stream type requested in the subscription.
pub const TICKER_TYPE: &str = "ticker";

// =============================================================================
// Subscription
// =============================================================================

/// One element of the subscription array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SubscriptionElement {
    /// `{"ticket": ...}`
    Ticket {
        /// Subscription ticket.
        ticket: String,
    },
    /// `{"type": "ticker", "codes": [...], ...}`
    Type {
        /// Stream type.
        #[serde(rename = "type")]
        kind: String,
        /// Instrument codes.
        codes: Vec<String>,
        /// Only send the current snapshot.
        is_only_snapshot: bool,
        /// Only send realtime updates.
        is_only_realtime: bool,
    },
    /// `{"format": "DEFAULT" | "SIMPLE_LIST"}`
    Format {
        /// Response format marker.
        format: String,
    },
}

impl SubscriptionElement {
    /// Wire elements for a ticker subscription, in the order the venue expects.
    #[must_use]
    pub fn ticker_frame(request: &SubscriptionRequest) -> Vec<Self> {
        vec![
            Self::Ticket {
                ticket: request.ticket().as_str().to_string(),
            },
            Self::Type {
                kind: TICKER_TYPE.to_string(),
                codes: request.codes().to_vec(),
                is_only_snapshot: false,
                is_only_realtime: false,
            },
            Self::Format {
                format: request.format().as_str().to_string(),
            },
        ]
    }
}

// =============================================================================
// Ticker
// =============================================================================

/// Ticker frame in either response format.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerMessage {
    /// Message type (`ticker`).
    #[serde(rename = "type", alias = "ty", default)]
    pub msg_type: Option<String>,
    /// Instrument code.
    #[serde(alias = "cd")]
    pub code: String,
    /// Last traded price.
    #[serde(alias = "tp", default, deserialize_with = "lenient_decimal")]
    pub trade_price: Decimal,
    /// `RISE`, `EVEN` or `FALL`.
    #[serde(alias = "c", default, deserialize_with = "lenient_string")]
    pub change: Option<String>,
    /// Unsigned change against the previous close.
    #[serde(alias = "cp", default, deserialize_with = "lenient_decimal")]
    pub change_price: Decimal,
    /// Unsigned change rate (0.01 = 1%).
    #[serde(alias = "cr", default, deserialize_with = "lenient_decimal")]
    pub change_rate: Decimal,
    /// Volume over the last 24 hours.
    #[serde(alias = "atv24h", default, deserialize_with = "lenient_decimal")]
    pub acc_trade_volume_24h: Decimal,
    /// Traded value over the last 24 hours.
    #[serde(alias = "atp24h", default, deserialize_with = "lenient_decimal")]
    pub acc_trade_price_24h: Decimal,
    /// Venue timestamp in milliseconds.
    #[serde(alias = "tms", default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
}

impl TickerMessage {
    /// Project the wire frame onto the domain ticker.
    #[must_use]
    pub fn into_ticker(self) -> TickerValue {
        TickerValue {
            code: self.code,
            trade_price: self.trade_price,
            change_price: self.change_price,
            change_percent: self.change_rate * Decimal::ONE_HUNDRED,
            acc_trade_volume_24h: self.acc_trade_volume_24h,
            acc_trade_price_24h: self.acc_trade_price_24h,
            direction: self
                .change
                .as_deref()
                .map(ChangeDirection::from_venue)
                .unwrap_or_default(),
            timestamp: self.timestamp.and_then(DateTime::from_timestamp_millis),
        }
    }
}

/// `{"status": "UP"}` keepalive frame.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusMessage {
    /// Venue status.
    pub status: String,
}

/// `{"error": {"name": ..., "message": ...}}` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    /// Error body.
    pub error: ErrorBody,
}

/// Body of an error frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// Error name, e.g. `INVALID_PARAM`.
    #[serde(default)]
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub message: String,
}

// =============================================================================
// Candles
// =============================================================================

/// One candle row from `/v1/candles/*`.
///
/// ```json
/// {"market":"KRW-BTC","candle_date_time_utc":"2024-01-01T00:00:00",
///  "opening_price":57000000.0,"high_price":58000000.0,"low_price":56500000.0,
///  "trade_price":57800000.0,"timestamp":1704153599000,
///  "candle_acc_trade_price":123456789.0,"candle_acc_trade_volume":2.5}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CandleRow {
    /// Instrument code.
    pub market: String,
    /// Bucket start in UTC, without offset.
    pub candle_date_time_utc: String,
    /// Opening price.
    pub opening_price: Decimal,
    /// Highest price.
    pub high_price: Decimal,
    /// Lowest price.
    pub low_price: Decimal,
    /// Closing price.
    pub trade_price: Decimal,
    /// Timestamp of the last trade in the bucket (ms).
    #[serde(default)]
    pub timestamp: i64,
    /// Traded value in the bucket.
    pub candle_acc_trade_price: Decimal,
    /// Traded volume in the bucket.
    pub candle_acc_trade_volume: Decimal,
}

/// Format of `candle_date_time_utc`.
pub const CANDLE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl CandleRow {
    /// Convert to a domain candle.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `candle_date_time_utc` is not a timestamp.
    pub fn into_candle(self) -> Result<Candle, chrono::ParseError> {
        let timestamp =
            NaiveDateTime::parse_from_str(&self.candle_date_time_utc, CANDLE_TIME_FORMAT)?.and_utc();
        Ok(Candle {
            timestamp,
            open: self.opening_price,
            high: self.high_price,
            low: self.low_price,
            close: self.trade_price,
            traded_value: self.candle_acc_trade_price,
            volume: self.candle_acc_trade_volume,
        })
    }
}

// =============================================================================
// Lenient field decoding
// =============================================================================

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => number_to_decimal(&n),
        Value::String(s) => Decimal::from_str(s.trim()).unwrap_or_default(),
        _ => Decimal::ZERO,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| number_to_decimal(&n).trunc().to_i64()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn number_to_decimal(n: &serde_json::Number) -> Decimal {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .unwrap_or_default()
}
