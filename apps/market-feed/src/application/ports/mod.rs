//! Ports
//!
//! Capability contracts the services depend on. Infrastructure adapters
//! implement them; tests substitute fakes and mocks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::connection::{ConnectionState, TransportError};
use crate::domain::market::{Candle, CandleUnit, SubscriptionRequest, TickerValue};

mod feed;

pub use feed::{Feed, FeedSignal, InboundFeed, StateFeed, lossy_feed, signal_feed};

// =============================================================================
// Transport Contract
// =============================================================================

/// One logical streaming connection.
///
/// Every operation may be called concurrently from any task. Feeds are
/// independent per call: each call to [`Transport::inbound`] or
/// [`Transport::states`] returns a new subscriber that sees everything
/// published after the call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection. A no-op while already connecting or connected.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the connection. Idempotent; always ends in `closed`.
    async fn close(&self);

    /// Send one frame. Fails with [`TransportError::NotConnected`] without an open connection.
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Send a subscription frame.
    ///
    /// Transports that survive reconnects remember the last frame sent
    /// through here and replay it on every new connection.
    async fn send_subscription(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.send(frame).await
    }

    /// Received frames, in arrival order. Completes when the connection ends.
    fn inbound(&self) -> InboundFeed;

    /// Lifecycle transitions.
    fn states(&self) -> StateFeed;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;
}

/// Builds fresh transport instances; closed instances are never reused.
pub trait TransportFactory: Send + Sync {
    /// Create a new, disconnected transport.
    fn create(&self) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Arc<dyn Transport> + Send + Sync,
{
    fn create(&self) -> Arc<dyn Transport> {
        self()
    }
}

// =============================================================================
// Frame Codec
// =============================================================================

/// Result of decoding one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// Zero or more tickers.
    Tickers(Vec<TickerValue>),
    /// Venue status frame (e.g. `UP`); carries no market data.
    Status(String),
}

/// Errors raised while encoding or decoding venue frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is a message type the codec does not handle.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// The frame is not a JSON object or array of objects.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// The venue reported an error.
    #[error("venue error {name}: {message}")]
    Venue {
        /// Error name reported by the venue.
        name: String,
        /// Error description.
        message: String,
    },
}

/// Venue wire format for the ticker stream.
pub trait FrameCodec: Send + Sync {
    /// Encode a subscription request as one wire frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    fn encode_subscription(&self, request: &SubscriptionRequest) -> Result<Vec<u8>, CodecError>;

    /// Decode one inbound payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a ticker or status frame.
    fn decode(&self, payload: &[u8]) -> Result<DecodedFrame, CodecError>;
}

// =============================================================================
// Candle Source
// =============================================================================

/// One page request against the candle history endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Instrument code, e.g. `KRW-BTC`.
    pub market: String,
    /// Bucket size.
    pub unit: CandleUnit,
    /// Number of candles wanted (at most 200 per call).
    pub count: usize,
    /// Exclusive upper bound of the page.
    pub to: Option<DateTime<Utc>>,
}

/// Errors raised while fetching candle history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The caller cancelled the fetch.
    #[error("historical fetch cancelled")]
    Cancelled,

    /// The fetch arguments cannot be served.
    #[error("invalid history request: {0}")]
    InvalidRequest(String),

    /// The venue answered with a non-2xx status.
    #[error("venue rejected request with status {status}: {body}")]
    RemoteRejection {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The request did not complete (connect, TLS, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The response body was not a candle array.
    #[error("failed to decode candles: {0}")]
    Decode(String),
}

/// Source of candle pages, newest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch up to `request.count` candles ending before `request.to`.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Candle>, HistoryError>;
}

// =============================================================================
// Clock
// =============================================================================

/// Supplies the current time.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that the ports are object safe.
    #[allow(dead_code)]
    fn assert_object_safe(
        _transport: &dyn Transport,
        _factory: &dyn TransportFactory,
        _codec: &dyn FrameCodec,
        _source: &dyn CandleSource,
        _clock: &dyn Clock,
    ) {
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn mock_candle_source_returns_scripted_page() {
        let mut source = MockCandleSource::new();
        source
            .expect_fetch_page()
            .withf(|request| request.market == "KRW-BTC" && request.count == 2)
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let request = PageRequest {
            market: "KRW-BTC".to_string(),
            unit: CandleUnit::Days,
            count: 2,
            to: None,
        };
        let page = source.fetch_page(&request).await.unwrap();
        assert!(page.is_empty());
    }
}
