//! Upbit REST Candle Client
//!
//! [`CandleSource`] over `GET /v1/candles/{unit}`. The venue returns at most
//! 200 candles per call, newest first, strictly older than `to`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;

use crate::application::ports::{CandleSource, HistoryError, PageRequest};
use crate::domain::market::{Candle, CandleUnit};
use crate::infrastructure::config::{DEFAULT_REST_URL, MAX_HISTORY_PAGE_SIZE};
use crate::infrastructure::upbit::messages::CandleRow;

/// Format of the `to` query parameter.
pub const CURSOR_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body kept in a [`HistoryError::RemoteRejection`].
const MAX_REJECTION_BODY: usize = 512;

/// HTTP client for the candle endpoints.
#[derive(Debug, Clone)]
pub struct UpbitRestClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for UpbitRestClient {
    fn default() -> Self {
        Self::new(DEFAULT_REST_URL)
    }
}

impl UpbitRestClient {
    /// Client against `base_url` (e.g. `https://api.upbit.com`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(http, base_url)
    }

    /// Client reusing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Full URL of the candle endpoint for `unit`.
    #[must_use]
    pub fn candles_url(&self, unit: CandleUnit) -> String {
        format!("{}{}", self.base_url, candles_path(unit))
    }
}

/// Path of the candle endpoint for `unit`.
#[must_use]
pub fn candles_path(unit: CandleUnit) -> String {
    match unit {
        CandleUnit::Minutes(n) => format!("/v1/candles/minutes/{n}"),
        CandleUnit::Days => "/v1/candles/days".to_string(),
        CandleUnit::Weeks => "/v1/candles/weeks".to_string(),
        CandleUnit::Months => "/v1/candles/months".to_string(),
    }
}

/// Render a cursor for the `to` parameter.
#[must_use]
pub fn format_cursor(to: DateTime<Utc>) -> String {
    to.format(CURSOR_FORMAT).to_string()
}

#[async_trait]
impl CandleSource for UpbitRestClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Candle>, HistoryError> {
        let count = request.count.clamp(1, MAX_HISTORY_PAGE_SIZE);
        let mut query = vec![
            ("market", request.market.clone()),
            ("count", count.to_string()),
        ];
        if let Some(to) = request.to {
            query.push(("to", format_cursor(to)));
        }

        let url = self.candles_url(request.unit);
        tracing::debug!(%url, market = %request.market, count, to = ?request.to, "Requesting candle page");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .query(&query)
            .send()
            .await
            .map_err(|e| HistoryError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| HistoryError::Request(e.to_string()))?;

        if !status.is_success() {
            let mut text = String::from_utf8_lossy(&body).into_owned();
            if text.len() > MAX_REJECTION_BODY {
                let cut = (0..=MAX_REJECTION_BODY)
                    .rev()
                    .find(|i| text.is_char_boundary(*i))
                    .unwrap_or(0);
                text.truncate(cut);
            }
            tracing::warn!(status = status.as_u16(), body = %text, "Candle request rejected");
            return Err(HistoryError::RemoteRejection {
                status: status.as_u16(),
                body: text,
            });
        }

        let rows: Vec<CandleRow> =
            serde_json::from_slice(&body).map_err(|e| HistoryError::Decode(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                row.into_candle()
                    .map_err(|e| HistoryError::Decode(e.to_string()))
            })
            .collect()
    }
}
