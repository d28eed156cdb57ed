//! Prometheus Metrics Module
//!
//! Records feed health through the `metrics` facade. Without an installed
//! recorder every call is a no-op, so library users pay nothing unless the
//! binary enables the exporter.
//!
//! # Metrics Categories
//!
//! - **Frames**: frames received, decode failures, tickers published
//! - **Connections**: state transitions, reconnect attempts, subscription replays
//! - **History**: pages fetched, fetch outcomes and durations

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics initialization error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built (e.g. the port is taken).
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),
    /// Another global recorder is already installed.
    #[error("failed to install metrics recorder: {0}")]
    Install(String),
}

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Port 0 disables the exporter and returns `Ok(None)`. Calling again after
/// a successful install returns the existing handle. Must be called from
/// within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the exporter cannot bind or a recorder is already installed.
pub fn init_metrics(port: u16) -> Result<Option<PrometheusHandle>, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(Some(handle.clone()));
    }
    if port == 0 {
        return Ok(None);
    }

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .build()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| MetricsError::Install(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::warn!(error = ?e, "Prometheus exporter stopped");
        }
    });

    register_metrics();
    let _ = PROMETHEUS_HANDLE.set(handle.clone());
    tracing::info!(port, "Prometheus exporter listening");
    Ok(Some(handle))
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frames
    describe_counter!(
        "market_feed_frames_received_total",
        "Total frames received from the venue stream"
    );
    describe_counter!(
        "market_feed_frame_bytes_total",
        "Total payload bytes received from the venue stream"
    );
    describe_counter!(
        "market_feed_decode_failures_total",
        "Inbound frames skipped because they could not be decoded"
    );
    describe_counter!(
        "market_feed_tickers_published_total",
        "Tickers republished to subscribers"
    );
    describe_gauge!(
        "market_feed_ticker_subscribers",
        "Active ticker feed subscribers"
    );

    // Connections
    describe_counter!(
        "market_feed_state_transitions_total",
        "Connection state transitions by transport layer and target state"
    );
    describe_counter!(
        "market_feed_reconnects_total",
        "Reconnect attempts scheduled"
    );
    describe_counter!(
        "market_feed_reconnects_exhausted_total",
        "Outages where the reconnect budget ran out"
    );
    describe_counter!(
        "market_feed_subscription_replays_total",
        "Subscriptions replayed after a reconnect"
    );

    // History
    describe_counter!(
        "market_feed_history_pages_total",
        "Candle pages requested from the REST API"
    );
    describe_counter!(
        "market_feed_history_candles_total",
        "Candles received from the REST API"
    );
    describe_counter!(
        "market_feed_history_fetches_total",
        "Historical fetches by outcome"
    );
    describe_histogram!(
        "market_feed_history_fetch_seconds",
        "Wall time of historical fetches"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Which transport produced a state transition.
#[derive(Debug, Clone, Copy)]
pub enum TransportLayer {
    /// Single physical connection.
    Base,
    /// Reconnecting façade.
    Resilient,
}

impl TransportLayer {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Resilient => "resilient",
        }
    }
}

/// Where an inbound frame failed to decode.
#[derive(Debug, Clone, Copy)]
pub enum DecodeStage {
    /// The frame itself was unreadable (e.g. invalid UTF-8 text frame).
    Frame,
    /// The payload was not a ticker.
    Ticker,
}

impl DecodeStage {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Ticker => "ticker",
        }
    }
}

/// Record one frame received from the venue.
pub fn record_frame_received(bytes: usize) {
    counter!("market_feed_frames_received_total").increment(1);
    counter!("market_feed_frame_bytes_total").increment(bytes as u64);
}

/// Record a skipped frame.
pub fn record_decode_failure(stage: DecodeStage) {
    counter!(
        "market_feed_decode_failures_total",
        "stage" => stage.as_str()
    )
    .increment(1);
}

/// Record a ticker handed to subscribers.
pub fn record_ticker_published(code: &str) {
    counter!(
        "market_feed_tickers_published_total",
        "code" => code.to_string()
    )
    .increment(1);
}

/// Update the ticker subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_ticker_subscribers(count: usize) {
    gauge!("market_feed_ticker_subscribers").set(count as f64);
}

/// Record a connection state transition.
pub fn record_state_transition(layer: TransportLayer, state: &ConnectionState) {
    counter!(
        "market_feed_state_transitions_total",
        "layer" => layer.as_str(),
        "state" => state.as_str()
    )
    .increment(1);
}

/// Record a scheduled reconnect attempt.
pub fn record_reconnect() {
    counter!("market_feed_reconnects_total").increment(1);
}

/// Record an outage that exhausted the reconnect budget.
pub fn record_reconnects_exhausted() {
    counter!("market_feed_reconnects_exhausted_total").increment(1);
}

/// Record a subscription replay.
pub fn record_subscription_replay() {
    counter!("market_feed_subscription_replays_total").increment(1);
}

/// Record one candle page.
pub fn record_history_page(candles: usize) {
    counter!("market_feed_history_pages_total").increment(1);
    counter!("market_feed_history_candles_total").increment(candles as u64);
}

/// Record the end of a historical fetch.
pub fn record_history_fetch(outcome: &'static str, duration: Duration) {
    counter!(
        "market_feed_history_fetches_total",
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "market_feed_history_fetch_seconds",
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_values() {
        assert_eq!(TransportLayer::Base.as_str(), "base");
        assert_eq!(TransportLayer::Resilient.as_str(), "resilient");
        assert_eq!(DecodeStage::Frame.as_str(), "frame");
        assert_eq!(DecodeStage::Ticker.as_str(), "ticker");
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        record_frame_received(128);
        record_decode_failure(DecodeStage::Ticker);
        record_state_transition(TransportLayer::Base, &ConnectionState::Connecting);
        record_history_fetch("completed", Duration::from_millis(5));
        assert!(get_metrics_handle().is_none());
    }

    #[test]
    fn zero_port_disables_exporter() {
        assert!(init_metrics(0).unwrap().is_none());
    }
}
