//! Configuration Module
//!
//! Environment-driven settings for the streaming connection, reconnect
//! backoff and historical fetches.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_REST_URL, DEFAULT_WS_URL, FeedConfig, HistorySettings,
    MAX_HISTORY_PAGE_SIZE, ReconnectSettings, StreamSettings,
};
