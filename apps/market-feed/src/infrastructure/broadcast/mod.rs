//! Ticker Fan-out
//!
//! One reader decodes the transport's inbound feed; every consumer gets
//! its own receiver on the hub. A consumer that falls more than `capacity`
//! tickers behind skips the oldest ones instead of stalling the others.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::application::ports::{Feed, lossy_feed};
use crate::domain::market::TickerValue;
use crate::infrastructure::config::StreamSettings;

/// Default ticker channel capacity.
pub const DEFAULT_TICKER_CAPACITY: usize = 1_024;

/// Ticker hub configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Tickers buffered per subscriber before the oldest are dropped.
    pub ticker_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            ticker_capacity: DEFAULT_TICKER_CAPACITY,
        }
    }
}

impl From<&StreamSettings> for BroadcastConfig {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            ticker_capacity: settings.ticker_capacity,
        }
    }
}

/// Broadcast hub for decoded tickers.
#[derive(Debug)]
pub struct TickerHub {
    tickers_tx: broadcast::Sender<TickerValue>,
}

/// Shared handle to the hub.
pub type SharedTickerHub = Arc<TickerHub>;

impl Default for TickerHub {
    fn default() -> Self {
        Self::new(BroadcastConfig::default())
    }
}

impl TickerHub {
    /// Create a hub with the given capacity (minimum 1).
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        let (tickers_tx, _) = broadcast::channel(config.ticker_capacity.max(1));
        Self { tickers_tx }
    }

    /// Publish a ticker; returns the number of receivers, or `None` if nobody listens.
    pub fn publish(&self, ticker: TickerValue) -> Option<usize> {
        self.tickers_tx.send(ticker).ok()
    }

    /// Raw receiver for tickers published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TickerValue> {
        self.tickers_tx.subscribe()
    }

    /// Ticker stream for tickers published from now on.
    #[must_use]
    pub fn feed(&self) -> Feed<TickerValue> {
        lossy_feed(self.subscribe(), "tickers")
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tickers_tx.receiver_count()
    }
}
