//! Feed Settings
//!
//! All settings have defaults; environment variables override them.
//! Values that fail to parse fall back to the default, endpoints that are
//! not valid URLs are rejected.

use std::time::Duration;

use crate::application::services::HistoryConfig;
use crate::domain::market::ResponseFormat;

/// Default streaming endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api.upbit.com/websocket/v1";

/// Default REST endpoint.
pub const DEFAULT_REST_URL: &str = "https://api.upbit.com";

/// Most candles the venue returns per request.
pub const MAX_HISTORY_PAGE_SIZE: usize = 200;

/// Streaming connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Silence tolerated after a ping.
    pub heartbeat_timeout: Duration,
    /// Ticker frame shape requested from the venue.
    pub response_format: ResponseFormat,
    /// Capacity of the inbound frame channel.
    pub inbound_capacity: usize,
    /// Capacity of the state channel.
    pub state_capacity: usize,
    /// Capacity of the ticker fan-out channel.
    pub ticker_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            response_format: ResponseFormat::Default,
            inbound_capacity: 1_024,
            state_capacity: 64,
            ticker_capacity: 1_024,
        }
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Delay before the first reconnect attempt.
    pub delay_initial: Duration,
    /// Cap on the delay between attempts.
    pub delay_max: Duration,
    /// Backoff growth factor.
    pub delay_multiplier: f64,
    /// Jitter as a fraction of the delay.
    pub jitter: f64,
    /// Attempts per outage before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_secs(1),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 0,
        }
    }
}

/// Historical candle fetch settings.
#[derive(Debug, Clone)]
pub struct HistorySettings {
    /// REST base URL (`http://` or `https://`).
    pub rest_url: String,
    /// Candles per page request, 1 to 200.
    pub page_size: usize,
    /// Pause between consecutive page requests.
    pub request_spacing: Duration,
    /// Return what was gathered when a fetch is cancelled.
    pub partial_on_cancel: bool,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            rest_url: DEFAULT_REST_URL.to_string(),
            page_size: MAX_HISTORY_PAGE_SIZE,
            request_spacing: Duration::from_millis(110),
            partial_on_cancel: false,
        }
    }
}

impl From<&HistorySettings> for HistoryConfig {
    fn from(settings: &HistorySettings) -> Self {
        Self {
            page_size: settings.page_size,
            request_spacing: settings.request_spacing,
            partial_on_cancel: settings.partial_on_cancel,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct FeedConfig {
    /// Streaming connection settings.
    pub stream: StreamSettings,
    /// Reconnect backoff settings.
    pub reconnect: ReconnectSettings,
    /// Historical fetch settings.
    pub history: HistorySettings,
    /// Prometheus exporter port (0 = disabled).
    pub metrics_port: u16,
    /// Instrument codes the binary subscribes to.
    pub codes: Vec<String>,
}

impl FeedConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint variable holds an unusable URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint variable holds an unusable URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let stream_defaults = StreamSettings::default();
        let reconnect_defaults = ReconnectSettings::default();
        let history_defaults = HistorySettings::default();

        let url = env.string("MARKET_FEED_WS_URL", &stream_defaults.url)?;
        validate_url("MARKET_FEED_WS_URL", &url, &["ws://", "wss://"])?;

        let rest_url = env.string("MARKET_FEED_REST_URL", &history_defaults.rest_url)?;
        validate_url("MARKET_FEED_REST_URL", &rest_url, &["http://", "https://"])?;

        let stream = StreamSettings {
            url,
            connect_timeout: env.duration_millis(
                "MARKET_FEED_CONNECT_TIMEOUT_MS",
                stream_defaults.connect_timeout,
            ),
            heartbeat_interval: env.duration_secs(
                "MARKET_FEED_HEARTBEAT_INTERVAL_SECS",
                stream_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "MARKET_FEED_HEARTBEAT_TIMEOUT_SECS",
                stream_defaults.heartbeat_timeout,
            ),
            response_format: env
                .raw("MARKET_FEED_RESPONSE_FORMAT")
                .and_then(|s| ResponseFormat::from_str_case_insensitive(&s))
                .unwrap_or(stream_defaults.response_format),
            inbound_capacity: env.parse(
                "MARKET_FEED_INBOUND_CAPACITY",
                stream_defaults.inbound_capacity,
            ),
            state_capacity: env.parse("MARKET_FEED_STATE_CAPACITY", stream_defaults.state_capacity),
            ticker_capacity: env.parse(
                "MARKET_FEED_TICKER_CAPACITY",
                stream_defaults.ticker_capacity,
            ),
        };

        let reconnect = ReconnectSettings {
            delay_initial: env.duration_millis(
                "MARKET_FEED_RECONNECT_DELAY_INITIAL_MS",
                reconnect_defaults.delay_initial,
            ),
            delay_max: env.duration_secs(
                "MARKET_FEED_RECONNECT_DELAY_MAX_SECS",
                reconnect_defaults.delay_max,
            ),
            delay_multiplier: env.parse(
                "MARKET_FEED_RECONNECT_DELAY_MULTIPLIER",
                reconnect_defaults.delay_multiplier,
            ),
            jitter: env.parse("MARKET_FEED_RECONNECT_JITTER", reconnect_defaults.jitter),
            max_attempts: env.parse(
                "MARKET_FEED_MAX_RECONNECT_ATTEMPTS",
                reconnect_defaults.max_attempts,
            ),
        };

        let history = HistorySettings {
            rest_url,
            page_size: env
                .parse("MARKET_FEED_HISTORY_PAGE_SIZE", history_defaults.page_size)
                .clamp(1, MAX_HISTORY_PAGE_SIZE),
            request_spacing: env.duration_millis(
                "MARKET_FEED_HISTORY_REQUEST_SPACING_MS",
                history_defaults.request_spacing,
            ),
            partial_on_cancel: env.flag(
                "MARKET_FEED_HISTORY_PARTIAL_ON_CANCEL",
                history_defaults.partial_on_cancel,
            ),
        };

        let codes = env
            .raw("MARKET_FEED_CODES")
            .map(|raw| split_codes(&raw))
            .filter(|codes| !codes.is_empty())
            .unwrap_or_else(|| vec!["KRW-BTC".to_string(), "KRW-ETH".to_string()]);

        Ok(Self {
            stream,
            reconnect,
            history,
            metrics_port: env.parse("MARKET_FEED_METRICS_PORT", 0),
            codes,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable is set but empty.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Endpoint variable does not hold a usable URL.
    #[error("environment variable {key} is not a valid endpoint: {value}")]
    InvalidUrl {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

// =============================================================================
// Parsing helpers
// =============================================================================

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn string(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        match self.raw(key) {
            Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(value) => Ok(value.trim().to_string()),
            None => Ok(default.to_string()),
        }
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.raw(key).map_or(default, |v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.raw(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.raw(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

fn validate_url(key: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let host = schemes
        .iter()
        .find_map(|scheme| value.strip_prefix(scheme))
        .unwrap_or_default();
    if host.is_empty() || host.starts_with('/') || host.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidUrl {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn split_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}
