//! Heartbeat Monitor
//!
//! Keeps an idle WebSocket alive and detects dead peers. The session loop
//! owns one monitor per connection, feeds it every received frame and asks
//! it what to do on every heartbeat tick.

use std::time::Duration;

use tokio::time::Instant;

use crate::infrastructure::config::StreamSettings;

/// Heartbeat timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Silence tolerated after a ping before the peer is considered gone.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration with custom timing.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Heartbeat timing from the stream settings.
    #[must_use]
    pub const fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            pong_timeout: settings.heartbeat_timeout,
        }
    }
}

/// What the session loop should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping frame.
    SendPing,
    /// The peer has been silent too long; drop the connection.
    TimedOut(Duration),
}

/// Per-connection liveness tracking.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    last_seen: Instant,
    awaiting_pong: bool,
}

impl HeartbeatMonitor {
    /// Start tracking; the handshake counts as activity.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            last_seen: Instant::now(),
            awaiting_pong: false,
        }
    }

    /// Interval between ticks.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        self.config.ping_interval
    }

    /// Any inbound frame, pong included, proves the peer is alive.
    pub fn record_activity(&mut self) {
        self.last_seen = Instant::now();
        self.awaiting_pong = false;
    }

    /// Decide the action for a tick happening now.
    pub fn on_tick(&mut self) -> HeartbeatAction {
        self.on_tick_at(Instant::now())
    }

    fn on_tick_at(&mut self, now: Instant) -> HeartbeatAction {
        let silence = now.saturating_duration_since(self.last_seen);
        if self.awaiting_pong && silence > self.config.pong_timeout {
            return HeartbeatAction::TimedOut(silence);
        }
        self.awaiting_pong = true;
        HeartbeatAction::SendPing
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub const fn is_awaiting_pong(&self) -> bool {
        self.awaiting_pong
    }
}
