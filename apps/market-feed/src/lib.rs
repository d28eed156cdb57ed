#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Market Feed - Real-time Market Data Core
//!
//! Keeps a long-lived WebSocket connection to the Upbit market-data venue,
//! recovers from disconnects transparently, decodes ticker frames into a
//! fan-out feed, and pages historical candles backward through the venue's
//! REST API.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Connection lifecycle and market data types
//!   - `connection`: `ConnectionState`, `TransportError`, `InboundEvent`
//!   - `market`: tickets, subscriptions, tickers, candles, intervals
//!
//! - **Application**: Ports and services
//!   - `ports`: `Transport` contract, frame codec, candle source, clock
//!   - `services`: `TickerService`, `HistoricalSeriesFetcher`
//!
//! - **Infrastructure**: Adapters and ambient setup
//!   - `transport`: base WebSocket transport and the reconnecting decorator
//!   - `upbit`: stream codec and REST candle client
//!   - `broadcast`: ticker fan-out hub
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Upbit WS ──► WebSocketTransport ──► ResilientTransport ──► TickerService ──► TickerHub ──► consumers
//!                     ▲                      │ (reconnect + replay)
//!                     └── factory ───────────┘
//!
//! Upbit REST ──► UpbitRestClient ──► HistoricalSeriesFetcher ──► Vec<CoinPrice>
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Connection and market data types with no I/O.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionState, InboundEvent, TransportError};
pub use domain::market::{
    Candle, CandleUnit, ChangeDirection, CoinPrice, IntervalSpec, ResponseFormat,
    SubscriptionRequest, Ticket, TickerValue,
};

// Ports
pub use application::ports::{
    CandleSource, Clock, CodecError, DecodedFrame, FrameCodec, HistoryError, PageRequest,
    SystemClock, Transport, TransportFactory,
};

// Services
pub use application::services::{
    FetchReport, HistoricalSeriesFetcher, HistoryConfig, StopReason, TickerService,
    TickerServiceError,
};

// Transports
pub use infrastructure::transport::{
    ReconnectConfig, ResilientTransport, WebSocketConfig, WebSocketTransport,
};

// Venue adapters
pub use infrastructure::upbit::{UpbitCodec, UpbitRestClient};

// Configuration
pub use infrastructure::config::{ConfigError, FeedConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
