//! Connection Lifecycle Types
//!
//! Every transport, base or decorated, reports its lifecycle through
//! [`ConnectionState`] and delivers received frames as [`InboundEvent`]s.
//!
//! # State Machine
//!
//! ```text
//! disconnected ──connect()──► connecting ──handshake ok──► connected
//!                                 │                            │
//!                          handshake failed          close()/peer close/error
//!                                 ▼                            ▼
//!                          failed{error}  ◄── connect() ──  closed{code, reason}
//! ```
//!
//! `closed` and `failed` are terminal for one connection; a fresh
//! `connect()` restarts the machine.

use std::fmt;
use std::time::Duration;

// =============================================================================
// Close Codes
// =============================================================================

/// WebSocket close codes used when reporting `closed` states.
pub mod close_code {
    /// Normal closure, used when the caller closes the transport.
    pub const NORMAL: u16 = 1000;
    /// The peer sent a close frame without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// The connection dropped without a close frame (I/O error, timeout).
    pub const ABNORMAL: u16 = 1006;
    /// A text frame carried invalid UTF-8.
    pub const INVALID_PAYLOAD: u16 = 1007;
}

/// Reason attached to `closed` when the caller initiated the close.
pub const CLOSED_BY_CLIENT: &str = "closed by client";

// =============================================================================
// Transport Error
// =============================================================================

/// Errors raised by transports.
///
/// Cloneable so a failure can be carried inside [`ConnectionState::Failed`]
/// and republished to every state subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint is not a `ws://` or `wss://` URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// `send` was called without an open connection.
    #[error("not connected")]
    NotConnected,

    /// The WebSocket handshake was rejected or the socket could not be opened.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not complete within the connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// No frame or pong arrived within the heartbeat timeout.
    #[error("heartbeat timed out after {0:?}")]
    HeartbeatTimeout(Duration),

    /// Socket-level read or write failure.
    #[error("transport failure: {0}")]
    Io(String),

    /// A received frame could not be read as a message; the connection survives.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The transport was closed while the operation was in flight.
    #[error("transport closed")]
    Closed,

    /// The reconnect policy gave up.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    RetriesExhausted(u32),
}

impl TransportError {
    /// Whether a reconnect attempt can be expected to fix this failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidEndpoint(_) | Self::Closed | Self::RetriesExhausted(_)
        )
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of one transport instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created, never connected.
    #[default]
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Handshake completed; frames flow.
    Connected,
    /// The caller asked to close; the close frame is being sent.
    Closing,
    /// The connection ended.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason reported by the peer or the transport.
        reason: String,
        /// Whether the caller's own `close()` ended the connection.
        by_client: bool,
    },
    /// The connection could not be established.
    Failed {
        /// Why the handshake failed.
        error: TransportError,
    },
}

impl ConnectionState {
    /// `closed` state used when the caller closes the transport.
    #[must_use]
    pub fn closed_by_client() -> Self {
        Self::Closed {
            code: close_code::NORMAL,
            reason: CLOSED_BY_CLIENT.to_string(),
            by_client: true,
        }
    }

    /// `closed` state ended by the peer or by the transport itself.
    #[must_use]
    pub fn closed(code: u16, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
            by_client: false,
        }
    }

    /// `closed` state for a connection that dropped without a close frame.
    #[must_use]
    pub fn dropped(reason: impl Into<String>) -> Self {
        Self::closed(close_code::ABNORMAL, reason)
    }

    /// `closed` or `failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Failed { .. })
    }

    /// `connecting` or `connected`.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Whether this terminal state was produced by the caller's own `close()`.
    #[must_use]
    pub const fn is_client_close(&self) -> bool {
        matches!(self, Self::Closed { by_client: true, .. })
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        match self {
            Self::Disconnected => matches!(next, Self::Connecting | Self::Closed { .. }),
            Self::Connecting => matches!(
                next,
                Self::Connected | Self::Failed { .. } | Self::Closing | Self::Closed { .. }
            ),
            Self::Connected => matches!(next, Self::Closing | Self::Closed { .. }),
            Self::Closing => matches!(next, Self::Closed { .. }),
            Self::Closed { .. } => matches!(next, Self::Connecting),
            Self::Failed { .. } => matches!(next, Self::Connecting | Self::Closed { .. }),
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed { .. } => "closed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed { code, reason, .. } => write!(f, "closed({code}, {reason})"),
            Self::Failed { error } => write!(f, "failed({error})"),
            other => f.write_str(other.as_str()),
        }
    }
}

// =============================================================================
// Inbound Event
// =============================================================================

/// One received wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Raw payload of a text or binary frame.
    Payload(Vec<u8>),
    /// The frame could not be read; the connection stays up.
    Failure(TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::closed_by_client().is_terminal());
        assert!(
            ConnectionState::Failed {
                error: TransportError::NotConnected
            }
            .is_terminal()
        );
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(!ConnectionState::Closing.is_terminal());
    }

    #[test]
    fn client_close_is_distinguished_from_drop() {
        assert!(ConnectionState::closed_by_client().is_client_close());
        assert!(!ConnectionState::dropped("reset by peer").is_client_close());
        assert!(!ConnectionState::closed(close_code::NORMAL, "server restart").is_client_close());
    }

    #[test]
    fn peer_echoing_the_client_reason_is_not_a_client_close() {
        let echoed = ConnectionState::closed(close_code::NORMAL, CLOSED_BY_CLIENT);
        assert!(!echoed.is_client_close());
        assert_ne!(echoed, ConnectionState::closed_by_client());
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        let path = [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Closing,
            ConnectionState::closed_by_client(),
            ConnectionState::Connecting,
            ConnectionState::Failed {
                error: TransportError::Timeout(Duration::from_secs(1)),
            },
            ConnectionState::Connecting,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(&pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn connected_requires_connecting() {
        assert!(!ConnectionState::Disconnected.can_transition_to(&ConnectionState::Connected));
        assert!(
            !ConnectionState::closed_by_client().can_transition_to(&ConnectionState::Connected)
        );
        assert!(!ConnectionState::Closing.can_transition_to(&ConnectionState::Connecting));
    }

    #[test]
    fn display_includes_close_details() {
        let state = ConnectionState::closed(4000, "bye");
        assert_eq!(state.to_string(), "closed(4000, bye)");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }

    #[test]
    fn retryable_errors() {
        assert!(TransportError::Io("reset".to_string()).is_retryable());
        assert!(TransportError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(TransportError::HeartbeatTimeout(Duration::from_secs(5)).is_retryable());
        assert!(!TransportError::InvalidEndpoint("http://x".to_string()).is_retryable());
        assert!(!TransportError::Closed.is_retryable());
        assert!(!TransportError::RetriesExhausted(3).is_retryable());
    }
}
