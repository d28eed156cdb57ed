//! Streaming transports.
//!
//! [`WebSocketTransport`] manages one physical connection;
//! [`ResilientTransport`] decorates any transport factory with reconnects,
//! backoff and subscription replay.

pub mod heartbeat;
pub mod reconnect;
pub mod resilient;
pub mod websocket;

pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use resilient::ResilientTransport;
pub use websocket::{WebSocketConfig, WebSocketTransport};
