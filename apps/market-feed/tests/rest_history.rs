//! Historical Fetch Integration Tests
//!
//! `UpbitRestClient` + `HistoricalSeriesFetcher` against a mock venue
//! served by axum.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use market_feed::{
    CandleUnit, Clock, HistoricalSeriesFetcher, HistoryConfig, HistoryError, IntervalSpec,
    StopReason, UpbitRestClient,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

type Queries = Arc<Mutex<Vec<HashMap<String, String>>>>;

#[derive(Clone)]
struct Venue {
    queries: Queries,
    available: usize,
    step: TimeDelta,
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn newest() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn candle_json(market: &str, at: DateTime<Utc>) -> Value {
    json!({
        "market": market,
        "candle_date_time_utc": at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "candle_date_time_kst": (at + TimeDelta::hours(9)).format("%Y-%m-%dT%H:%M:%S").to_string(),
        "opening_price": 100.0,
        "high_price": 110.5,
        "low_price": 95,
        "trade_price": 105,
        "timestamp": at.timestamp_millis(),
        "candle_acc_trade_price": 1_000_000.25,
        "candle_acc_trade_volume": 12.5,
    })
}

async fn candles(State(venue): State<Venue>, Query(params): Query<HashMap<String, String>>) -> Response {
    venue.queries.lock().push(params.clone());

    let market = params.get("market").cloned().unwrap_or_default();
    let count: usize = params
        .get("count")
        .and_then(|c| c.parse().ok())
        .unwrap_or(1);
    let to = params.get("to").map(|to| {
        NaiveDateTime::parse_from_str(to, "%Y-%m-%dT%H:%M:%SZ")
            .unwrap()
            .and_utc()
    });

    let rows: Vec<Value> = (0..venue.available)
        .map(|k| newest() - venue.step * i32::try_from(k).unwrap())
        .filter(|at| to.is_none_or(|to| *at < to))
        .take(count)
        .map(|at| candle_json(&market, at))
        .collect();
    axum::Json(rows).into_response()
}

async fn spawn_venue(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn candle_venue(available: usize) -> (String, Queries) {
    let queries: Queries = Arc::default();
    let state = Venue {
        queries: Arc::clone(&queries),
        available,
        step: TimeDelta::days(1),
    };
    let minutes = Venue {
        step: TimeDelta::minutes(15),
        ..state.clone()
    };
    let router = Router::new()
        .route("/v1/candles/days", get(candles).with_state(state))
        .route("/v1/candles/minutes/15", get(candles).with_state(minutes));
    (spawn_venue(router).await, queries)
}

fn fetcher(base_url: &str) -> HistoricalSeriesFetcher {
    let config = HistoryConfig {
        request_spacing: Duration::from_millis(5),
        ..HistoryConfig::default()
    };
    HistoricalSeriesFetcher::new(
        Arc::new(UpbitRestClient::new(base_url)),
        Arc::new(FixedClock(newest() + TimeDelta::days(1))),
        config,
    )
}

#[tokio::test]
async fn two_hundred_candles_in_one_page() {
    let (url, queries) = candle_venue(1_000).await;

    let prices = fetcher(&url)
        .fetch_prices("KRW-BTC", &IntervalSpec::new(200), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(prices.len(), 200);
    assert_eq!(queries.lock().len(), 1);
    assert_eq!(prices[0].index, 0);
    assert_eq!(prices[0].timestamp, newest() - TimeDelta::days(199));
    assert_eq!(prices[199].timestamp, newest());
    assert!(prices.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert_eq!(prices[0].high.to_string(), "110.5");
}

#[tokio::test]
async fn pages_backward_until_history_runs_out() {
    let (url, queries) = candle_venue(450).await;

    let report = fetcher(&url)
        .fetch_report("KRW-BTC", &IntervalSpec::new(500), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.prices.len(), 450);
    assert_eq!(report.pages_requested, 4);
    assert_eq!(report.prices.last().unwrap().index, 449);

    let queries = queries.lock();
    let counts: Vec<&str> = queries.iter().map(|q| q["count"].as_str()).collect();
    assert_eq!(counts, ["200", "200", "100", "50"]);
    assert!(queries.iter().all(|q| q["market"] == "KRW-BTC"));
    assert_eq!(queries[0]["to"], "2024-06-02T00:00:00Z");
    // One second before the oldest candle of the first page.
    let oldest_first_page = newest() - TimeDelta::days(199);
    assert_eq!(
        queries[1]["to"],
        (oldest_first_page - TimeDelta::seconds(1))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string()
    );
}

#[tokio::test]
async fn minute_candles_use_the_minute_endpoint() {
    let (url, queries) = candle_venue(100).await;
    let interval = IntervalSpec::new(30).with_unit(CandleUnit::minutes(15).unwrap());

    let prices = fetcher(&url)
        .fetch_prices("KRW-ETH", &interval, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(prices.len(), 30);
    assert_eq!(
        prices[1].timestamp - prices[0].timestamp,
        TimeDelta::minutes(15)
    );
    assert_eq!(queries.lock()[0]["market"], "KRW-ETH");
}

#[tokio::test]
async fn rejection_carries_status_and_body() {
    let router = Router::new().route(
        "/v1/candles/days",
        get(|| async { (StatusCode::TOO_MANY_REQUESTS, "Too many requests") }),
    );
    let url = spawn_venue(router).await;

    let err = fetcher(&url)
        .fetch_prices("KRW-BTC", &IntervalSpec::new(10), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        HistoryError::RemoteRejection {
            status: 429,
            body: "Too many requests".to_string()
        }
    );
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let router = Router::new().route(
        "/v1/candles/days",
        get(|| async { axum::Json(json!({"unexpected": true})) }),
    );
    let url = spawn_venue(router).await;

    let err = fetcher(&url)
        .fetch_prices("KRW-BTC", &IntervalSpec::new(10), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Decode(_)));
}

#[tokio::test]
async fn unreachable_venue_is_a_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = fetcher(&url)
        .fetch_prices("KRW-BTC", &IntervalSpec::new(10), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Request(_)));
}
