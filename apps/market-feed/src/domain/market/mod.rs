//! Market Data Values
//!
//! Venue-independent values exchanged with the market-data core:
//! subscription requests going out, ticker projections and candle series
//! coming back.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

// =============================================================================
// Subscription
// =============================================================================

/// Caller-chosen identifier of one logical subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticket(String);

impl Ticket {
    /// Wrap an existing ticket identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh UUID v4 ticket.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Ticket identifier as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shape of the ticker frames the venue sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseFormat {
    /// Full field names (`code`, `trade_price`, ...).
    #[default]
    Default,
    /// Abbreviated field names (`cd`, `tp`, ...).
    SimpleList,
}

impl ResponseFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" => Some(Self::Default),
            "SIMPLE_LIST" | "SIMPLE" => Some(Self::SimpleList),
            _ => None,
        }
    }

    /// Wire marker for the format element of a subscription frame.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::SimpleList => "SIMPLE_LIST",
        }
    }
}

/// Immutable subscription: ticket, ordered instrument codes and response format.
///
/// Codes keep their first-seen order; duplicates and blank entries are
/// dropped on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    ticket: Ticket,
    codes: Vec<String>,
    format: ResponseFormat,
}

impl SubscriptionRequest {
    /// Build a request from any list of instrument codes.
    pub fn new<I, S>(ticket: Ticket, codes: I, format: ResponseFormat) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for code in codes {
            let code = code.into().trim().to_string();
            if !code.is_empty() && !unique.contains(&code) {
                unique.push(code);
            }
        }
        Self {
            ticket,
            codes: unique,
            format,
        }
    }

    /// Subscription ticket.
    #[must_use]
    pub const fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    /// Instrument codes in subscription order.
    #[must_use]
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Requested response format.
    #[must_use]
    pub const fn format(&self) -> ResponseFormat {
        self.format
    }

    /// True when no instrument is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

// =============================================================================
// Ticker
// =============================================================================

/// Sign of the price change against the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChangeDirection {
    /// Price is up.
    Rise,
    /// Price is unchanged (also used when the venue sends something unknown).
    #[default]
    Even,
    /// Price is down.
    Fall,
}

impl ChangeDirection {
    /// Map the venue's `RISE | EVEN | FALL` marker; anything else is `Even`.
    #[must_use]
    pub fn from_venue(marker: &str) -> Self {
        match marker.trim().to_ascii_uppercase().as_str() {
            "RISE" => Self::Rise,
            "FALL" => Self::Fall,
            _ => Self::Even,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rise => "rise",
            Self::Even => "even",
            Self::Fall => "fall",
        }
    }
}

/// Latest ticker for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerValue {
    /// Instrument code, e.g. `KRW-BTC`.
    pub code: String,
    /// Last traded price.
    pub trade_price: Decimal,
    /// Absolute change against the previous close (unsigned).
    pub change_price: Decimal,
    /// Percentage change against the previous close (unsigned, e.g. `1.25` for 1.25%).
    pub change_percent: Decimal,
    /// Traded volume over the last 24 hours.
    pub acc_trade_volume_24h: Decimal,
    /// Traded value over the last 24 hours.
    pub acc_trade_price_24h: Decimal,
    /// Direction of the change.
    pub direction: ChangeDirection,
    /// Venue timestamp of the ticker, when present.
    pub timestamp: Option<DateTime<Utc>>,
}

impl TickerValue {
    /// Percentage change carrying the direction as its sign.
    #[must_use]
    pub fn signed_change_percent(&self) -> Decimal {
        match self.direction {
            ChangeDirection::Fall => -self.change_percent,
            ChangeDirection::Even => Decimal::ZERO,
            ChangeDirection::Rise => self.change_percent,
        }
    }
}

// =============================================================================
// Candles
// =============================================================================

/// Candle bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CandleUnit {
    /// Minute candles; [`CandleUnit::minutes`] checks the size against the venue.
    Minutes(u16),
    /// Daily candles.
    #[default]
    Days,
    /// Weekly candles.
    Weeks,
    /// Monthly candles.
    Months,
}

impl CandleUnit {
    /// Minute sizes the venue serves.
    pub const MINUTE_SIZES: [u16; 8] = [1, 3, 5, 10, 15, 30, 60, 240];

    /// Minute candles of the given size, if the venue supports it.
    #[must_use]
    pub fn minutes(size: u16) -> Option<Self> {
        Self::MINUTE_SIZES
            .contains(&size)
            .then_some(Self::Minutes(size))
    }
}

impl fmt::Display for CandleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minutes(n) => write!(f, "{n}m"),
            Self::Days => f.write_str("1d"),
            Self::Weeks => f.write_str("1w"),
            Self::Months => f.write_str("1M"),
        }
    }
}

/// One OHLC bucket as served by the venue, before indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candle {
    /// Bucket start (UTC).
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: Decimal,
    /// Highest price.
    pub high: Decimal,
    /// Lowest price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Cumulative traded value in the bucket.
    pub traded_value: Decimal,
    /// Cumulative traded volume in the bucket.
    pub volume: Decimal,
}

/// One bucket of an assembled series; `index` 0 is the oldest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinPrice {
    /// Position in the series, contiguous from 0.
    pub index: usize,
    /// Bucket start (UTC).
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: Decimal,
    /// Highest price.
    pub high: Decimal,
    /// Lowest price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Cumulative traded value in the bucket.
    pub traded_value: Decimal,
    /// Cumulative traded volume in the bucket.
    pub volume: Decimal,
}

impl CoinPrice {
    /// Attach a series position to a candle.
    #[must_use]
    pub fn from_candle(index: usize, candle: Candle) -> Self {
        Self {
            index,
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            traded_value: candle.traded_value,
            volume: candle.volume,
        }
    }
}

/// How much history to fetch: bucket size, bucket count and the end of the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSpec {
    /// Bucket size.
    pub unit: CandleUnit,
    /// Number of buckets wanted.
    pub count: usize,
    /// Exclusive upper bound; `None` means now.
    pub end: Option<DateTime<Utc>>,
}

impl IntervalSpec {
    /// `count` daily candles ending now.
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self {
            unit: CandleUnit::Days,
            count,
            end: None,
        }
    }

    /// Use a different bucket size.
    #[must_use]
    pub fn with_unit(mut self, unit: CandleUnit) -> Self {
        self.unit = unit;
        self
    }

    /// End the window at `end` instead of now.
    #[must_use]
    pub fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }
}
