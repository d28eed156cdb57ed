//! Market Feed Binary
//!
//! Fetches a daily candle series for the first configured instrument, then
//! streams tickers for every configured instrument until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-feed
//! ```
//!
//! # Environment Variables
//!
//! - `MARKET_FEED_CODES`: Comma-separated instrument codes (default: KRW-BTC,KRW-ETH)
//! - `MARKET_FEED_WS_URL`: Streaming endpoint (default: <wss://api.upbit.com/websocket/v1>)
//! - `MARKET_FEED_REST_URL`: REST endpoint (default: <https://api.upbit.com>)
//! - `MARKET_FEED_METRICS_PORT`: Prometheus exporter port (default: 0, disabled)
//! - `MARKET_FEED_MAX_RECONNECT_ATTEMPTS`: Reconnect budget (default: 0, unbounded)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log filter (default: `market_feed=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use market_feed::infrastructure::broadcast::{BroadcastConfig, TickerHub};
use market_feed::infrastructure::telemetry;
use market_feed::{
    CandleSource, FeedConfig, HistoricalSeriesFetcher, HistoryConfig, IntervalSpec,
    ReconnectConfig, ResilientTransport, TickerService, Transport, UpbitCodec, UpbitRestClient,
    WebSocketConfig, WebSocketTransport, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Daily candles fetched at startup.
const STARTUP_HISTORY: usize = 200;

/// Bound on the final disconnect.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting market feed");

    let config = FeedConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let _metrics_handle = init_metrics(config.metrics_port).context("metrics exporter")?;

    let shutdown_token = CancellationToken::new();

    // Historical series
    let rest: Arc<dyn CandleSource> = Arc::new(UpbitRestClient::new(&config.history.rest_url));
    let fetcher =
        HistoricalSeriesFetcher::with_system_clock(rest, HistoryConfig::from(&config.history));
    if let Some(market) = config.codes.first() {
        fetch_startup_history(&fetcher, market, &shutdown_token).await;
    }

    // Ticker stream
    let factory = WebSocketTransport::factory(WebSocketConfig::from_settings(&config.stream));
    let transport: Arc<dyn Transport> = Arc::new(ResilientTransport::with_capacity(
        factory,
        ReconnectConfig::from_settings(&config.reconnect),
        config.stream.inbound_capacity,
        config.stream.state_capacity,
    ));
    let hub = Arc::new(TickerHub::new(BroadcastConfig::from(&config.stream)));
    let service = Arc::new(TickerService::new(
        transport,
        Arc::new(UpbitCodec::new()),
        config.stream.response_format,
        hub,
    ));

    let states_task = tokio::spawn(log_states(Arc::clone(&service), shutdown_token.clone()));
    let tickers_task = tokio::spawn(log_tickers(Arc::clone(&service), shutdown_token.clone()));

    let ticket = service
        .subscribe_codes(config.codes.iter().cloned())
        .await
        .context("subscription rejected")?;
    tracing::info!(%ticket, codes = ?config.codes, "Subscription registered");

    if let Err(e) = service.connect().await {
        // The resilient transport keeps retrying in the background.
        tracing::warn!(error = %e, "Initial connection failed, retrying");
    }

    tracing::info!("Market feed ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, service.disconnect())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Disconnect timed out"
        );
    }
    let _ = tokio::join!(states_task, tickers_task);

    tracing::info!("Market feed stopped");
    Ok(())
}

/// Fetch and summarize the startup candle series.
async fn fetch_startup_history(
    fetcher: &HistoricalSeriesFetcher,
    market: &str,
    shutdown_token: &CancellationToken,
) {
    let interval = IntervalSpec::new(STARTUP_HISTORY);
    match fetcher.fetch_prices(market, &interval, shutdown_token).await {
        Ok(prices) => {
            let first = prices.first();
            let last = prices.last();
            tracing::info!(
                market,
                candles = prices.len(),
                from = ?first.map(|p| p.timestamp),
                to = ?last.map(|p| p.timestamp),
                last_close = ?last.map(|p| p.close),
                "Historical series loaded"
            );
        }
        Err(e) => tracing::error!(market, error = %e, "Historical series fetch failed"),
    }
}

/// Log every connection state change until shutdown.
async fn log_states(service: Arc<TickerService>, shutdown_token: CancellationToken) {
    let mut states = service.connection_states();
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            state = states.next() => match state {
                Some(state) => tracing::info!(%state, "Connection state"),
                None => break,
            },
        }
    }
}

/// Log every ticker until shutdown.
async fn log_tickers(service: Arc<TickerService>, shutdown_token: CancellationToken) {
    let mut tickers = service.observe_tickers();
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => break,
            ticker = tickers.next() => match ticker {
                Some(ticker) => tracing::info!(
                    code = %ticker.code,
                    price = %ticker.trade_price,
                    change = ticker.direction.as_str(),
                    change_percent = %ticker.signed_change_percent(),
                    "Ticker"
                ),
                None => break,
            },
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        codes = ?config.codes,
        format = config.stream.response_format.as_str(),
        metrics_port = config.metrics_port,
        max_reconnect_attempts = config.reconnect.max_attempts,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_url = %config.stream.url,
        rest_url = %config.history.rest_url,
        "Venue endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
