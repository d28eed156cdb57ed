//! Historical Series Fetcher
//!
//! Assembles a candle series by walking the venue's paginated candle
//! endpoint backward in time. Each page asks for the newest candles strictly
//! older than a cursor; the cursor then moves to one second before the
//! oldest candle received. The fetch stops when the requested count is
//! reached, when a page comes back empty, or when the caller cancels.
//!
//! Cancellation is checked before every request and races every wait, so at
//! most the request already in flight is abandoned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::TimeDelta;
use tokio_util::sync::CancellationToken;

pub use crate::application::ports::HistoryError;
use crate::application::ports::{CandleSource, Clock, PageRequest, SystemClock};
use crate::domain::market::{Candle, CoinPrice, IntervalSpec};
use crate::infrastructure::config::MAX_HISTORY_PAGE_SIZE;
use crate::infrastructure::metrics;

/// Step from the oldest candle of a page to the next cursor.
const CURSOR_STEP: TimeDelta = TimeDelta::seconds(1);

/// Fetcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Candles per page request (clamped to 1..=200).
    pub page_size: usize,
    /// Pause between consecutive page requests.
    pub request_spacing: Duration,
    /// On cancellation, return what was gathered instead of [`HistoryError::Cancelled`].
    pub partial_on_cancel: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_HISTORY_PAGE_SIZE,
            request_spacing: Duration::from_millis(110),
            partial_on_cancel: false,
        }
    }
}

/// Why a fetch stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested count was reached.
    Completed,
    /// The venue ran out of history.
    Exhausted,
    /// The caller cancelled.
    Cancelled,
}

impl StopReason {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Series plus fetch diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Ascending series, indexed from 0.
    pub prices: Vec<CoinPrice>,
    /// Page requests issued.
    pub pages_requested: usize,
    /// Why the walk stopped.
    pub stop_reason: StopReason,
}

/// Paginating candle fetcher.
pub struct HistoricalSeriesFetcher {
    source: Arc<dyn CandleSource>,
    clock: Arc<dyn Clock>,
    config: HistoryConfig,
}

impl HistoricalSeriesFetcher {
    /// Fetcher over `source`, taking "now" from `clock`.
    #[must_use]
    pub fn new(source: Arc<dyn CandleSource>, clock: Arc<dyn Clock>, config: HistoryConfig) -> Self {
        let config = HistoryConfig {
            page_size: config.page_size.clamp(1, MAX_HISTORY_PAGE_SIZE),
            ..config
        };
        Self {
            source,
            clock,
            config,
        }
    }

    /// Fetcher using the wall clock.
    #[must_use]
    pub fn with_system_clock(source: Arc<dyn CandleSource>, config: HistoryConfig) -> Self {
        Self::new(source, Arc::new(SystemClock), config)
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Fetch up to `interval.count` candles for `market`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Cancelled`] if `cancel` fires (unless partial
    /// results are enabled), or the first request or decode failure.
    pub async fn fetch_prices(
        &self,
        market: &str,
        interval: &IntervalSpec,
        cancel: &CancellationToken,
    ) -> Result<Vec<CoinPrice>, HistoryError> {
        self.fetch_report(market, interval, cancel)
            .await
            .map(|report| report.prices)
    }

    /// Like [`HistoricalSeriesFetcher::fetch_prices`], with diagnostics.
    ///
    /// # Errors
    ///
    /// See [`HistoricalSeriesFetcher::fetch_prices`].
    pub async fn fetch_report(
        &self,
        market: &str,
        interval: &IntervalSpec,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, HistoryError> {
        let market = market.trim();
        if market.is_empty() {
            return Err(HistoryError::InvalidRequest("market is empty".to_string()));
        }

        let started = Instant::now();
        let result = self.walk(market, interval, cancel).await;

        let outcome = match &result {
            Ok(report) => report.stop_reason.as_str(),
            Err(HistoryError::Cancelled) => StopReason::Cancelled.as_str(),
            Err(_) => "error",
        };
        metrics::record_history_fetch(outcome, started.elapsed());

        match &result {
            Ok(report) => tracing::info!(
                market,
                unit = %interval.unit,
                requested = interval.count,
                received = report.prices.len(),
                pages = report.pages_requested,
                stop = report.stop_reason.as_str(),
                "Historical fetch finished"
            ),
            Err(e) => tracing::warn!(market, unit = %interval.unit, error = %e, "Historical fetch failed"),
        }
        result
    }

    async fn walk(
        &self,
        market: &str,
        interval: &IntervalSpec,
        cancel: &CancellationToken,
    ) -> Result<FetchReport, HistoryError> {
        let count = interval.count;
        let mut cursor = interval.end.unwrap_or_else(|| self.clock.now());
        let mut candles: Vec<Candle> = Vec::with_capacity(count.min(MAX_HISTORY_PAGE_SIZE));
        let mut pages_requested = 0;

        let stop_reason = loop {
            let remaining = count.saturating_sub(candles.len());
            if remaining == 0 {
                break StopReason::Completed;
            }
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            if pages_requested > 0 && !self.config.request_spacing.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break StopReason::Cancelled,
                    () = tokio::time::sleep(self.config.request_spacing) => {}
                }
            }

            let request = PageRequest {
                market: market.to_string(),
                unit: interval.unit,
                count: remaining.min(self.config.page_size),
                to: Some(cursor),
            };
            pages_requested += 1;

            let page = tokio::select! {
                biased;
                () = cancel.cancelled() => break StopReason::Cancelled,
                page = self.source.fetch_page(&request) => page?,
            };
            metrics::record_history_page(page.len());
            tracing::debug!(market, page = pages_requested, candles = page.len(), to = %cursor, "Candle page received");

            let Some(oldest) = page.iter().map(|candle| candle.timestamp).min() else {
                break StopReason::Exhausted;
            };
            candles.extend(page);
            cursor = oldest - CURSOR_STEP;
        };

        if stop_reason == StopReason::Cancelled && !self.config.partial_on_cancel {
            return Err(HistoryError::Cancelled);
        }

        Ok(FetchReport {
            prices: assemble(candles, count),
            pages_requested,
            stop_reason,
        })
    }
}

/// Order ascending, drop duplicate buckets, keep the newest `count`, index from 0.
fn assemble(mut candles: Vec<Candle>, count: usize) -> Vec<CoinPrice> {
    candles.sort_by_key(|candle| candle.timestamp);
    candles.dedup_by_key(|candle| candle.timestamp);
    let skip = candles.len().saturating_sub(count);
    candles
        .into_iter()
        .skip(skip)
        .enumerate()
        .map(|(index, candle)| CoinPrice::from_candle(index, candle))
        .collect()
}
