//! WebSocket Transport
//!
//! Manages exactly one physical WebSocket connection. A session task owns
//! the socket while connected: it reads frames, answers pings, runs the
//! heartbeat and writes outbound frames handed over by [`Transport::send`].
//! Reconnecting is not this type's job; once `closed` or `failed`, only an
//! explicit `connect()` starts a new connection.
//!
//! Undecodable payloads are the codec's concern and never end a connection.
//! A text frame with invalid UTF-8 is a protocol violation: the socket cannot
//! be read past it, so it is reported on the inbound feed and the connection
//! closes with 1007.
//!
//! # Termination Order
//!
//! When the peer closes or the socket fails, the session task stops reading,
//! publishes the terminal state and then completes the inbound feed, in that
//! order, so a consumer that sees the feed end can rely on the state already
//! being terminal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    FeedSignal, InboundFeed, StateFeed, Transport, TransportFactory, lossy_feed, signal_feed,
};
use crate::domain::connection::{
    CLOSED_BY_CLIENT, ConnectionState, InboundEvent, TransportError, close_code,
};
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics::{self, TransportLayer};
use crate::infrastructure::transport::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Outbound frames queued ahead of the session task.
const OUTBOUND_CAPACITY: usize = 64;

// =============================================================================
// Configuration
// =============================================================================

/// Base transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Bound on the handshake.
    pub connect_timeout: Duration,
    /// Keepalive timing.
    pub heartbeat: HeartbeatConfig,
    /// Inbound frames buffered per subscriber.
    pub inbound_capacity: usize,
    /// State transitions buffered per subscriber.
    pub state_capacity: usize,
}

impl WebSocketConfig {
    /// Configuration for `url` with default timing and capacities.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_settings(&StreamSettings {
            url: url.into(),
            ..StreamSettings::default()
        })
    }

    /// Configuration from the stream settings.
    #[must_use]
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            url: settings.url.clone(),
            connect_timeout: settings.connect_timeout,
            heartbeat: HeartbeatConfig::from_settings(settings),
            inbound_capacity: settings.inbound_capacity.max(1),
            state_capacity: settings.state_capacity.max(1),
        }
    }

    /// Use a different handshake bound.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Use different keepalive timing.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Transport over a single WebSocket connection.
pub struct WebSocketTransport {
    shared: Arc<Shared>,
}

struct Shared {
    config: WebSocketConfig,
    state: Mutex<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    inbound_tx: broadcast::Sender<FeedSignal<InboundEvent>>,
    // Lock order: state, then pending, then session.
    pending: Mutex<Option<CancellationToken>>,
    session: Mutex<Option<Session>>,
}

struct Session {
    outbound: mpsc::Sender<Outbound>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

struct Outbound {
    message: Message,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

enum Flow {
    Continue,
    Stop(ConnectionState),
}

/// Fails the handshake if its `connect()` future is dropped before finishing.
struct PendingAttempt {
    shared: Arc<Shared>,
    token: CancellationToken,
    armed: bool,
}

impl Drop for PendingAttempt {
    fn drop(&mut self) {
        // A cancelled token means close() already settled the state.
        if !self.armed || self.token.is_cancelled() {
            return;
        }
        let mut state = self.shared.state.lock();
        if *state != ConnectionState::Connecting {
            return;
        }
        self.shared.pending.lock().take();
        self.token.cancel();
        tracing::debug!(url = %self.shared.config.url, "Connect abandoned during handshake");
        self.shared.apply(
            &mut state,
            ConnectionState::Failed {
                error: TransportError::Closed,
            },
        );
        self.shared.end_inbound();
    }
}

impl WebSocketTransport {
    /// Create a disconnected transport.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        let (state_tx, _) = broadcast::channel(config.state_capacity.max(1));
        let (inbound_tx, _) = broadcast::channel(config.inbound_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                state_tx,
                inbound_tx,
                pending: Mutex::new(None),
                session: Mutex::new(None),
            }),
        }
    }

    /// Factory producing a fresh transport per call, for the resilient decorator.
    #[must_use]
    pub fn factory(config: WebSocketConfig) -> Arc<dyn TransportFactory> {
        Arc::new(move || -> Arc<dyn Transport> { Arc::new(Self::new(config.clone())) })
    }

    /// Endpoint this transport connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.config.url
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(token) = self.shared.pending.lock().take() {
            token.cancel();
        }
        if let Some(session) = self.shared.session.lock().take() {
            session.shutdown.cancel();
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let token = {
            let mut state = self.shared.state.lock();
            if matches!(
                *state,
                ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Closing
            ) {
                return Ok(());
            }

            self.shared.apply(&mut state, ConnectionState::Connecting);
            if let Err(error) = validate_endpoint(&self.shared.config.url) {
                tracing::warn!(url = %self.shared.config.url, "Rejecting invalid endpoint");
                self.shared.apply(
                    &mut state,
                    ConnectionState::Failed {
                        error: error.clone(),
                    },
                );
                self.shared.end_inbound();
                return Err(error);
            }

            let token = CancellationToken::new();
            *self.shared.pending.lock() = Some(token.clone());
            token
        };
        let mut attempt = PendingAttempt {
            shared: Arc::clone(&self.shared),
            token,
            armed: true,
        };

        let timeout = self.shared.config.connect_timeout;
        tracing::info!(url = %self.shared.config.url, "Connecting to market data stream");
        let handshake = tokio::time::timeout(
            timeout,
            tokio_tungstenite::connect_async(self.shared.config.url.as_str()),
        );
        let outcome = tokio::select! {
            () = attempt.token.cancelled() => return Err(TransportError::Closed),
            outcome = handshake => outcome,
        };

        let mut state = self.shared.state.lock();
        attempt.armed = false;
        self.shared.pending.lock().take();
        if *state != ConnectionState::Connecting {
            // close() ran while the handshake was finishing
            return Err(TransportError::Closed);
        }

        let error = match outcome {
            Ok(Ok((ws, _response))) => {
                self.shared.apply(&mut state, ConnectionState::Connected);
                let session = Session::spawn(Arc::clone(&self.shared), ws);
                *self.shared.session.lock() = Some(session);
                tracing::info!(url = %self.shared.config.url, "Market data stream connected");
                return Ok(());
            }
            Ok(Err(e)) => TransportError::Handshake(e.to_string()),
            Err(_) => TransportError::Timeout(timeout),
        };

        tracing::warn!(url = %self.shared.config.url, error = %error, "Connection attempt failed");
        self.shared.apply(
            &mut state,
            ConnectionState::Failed {
                error: error.clone(),
            },
        );
        self.shared.end_inbound();
        Err(error)
    }

    async fn close(&self) {
        let mut states = self.shared.state_tx.subscribe();
        let session = {
            let mut state = self.shared.state.lock();
            match &*state {
                ConnectionState::Closed { .. } => return,
                ConnectionState::Closing => None,
                ConnectionState::Connected => {
                    self.shared.apply(&mut state, ConnectionState::Closing);
                    self.shared.session.lock().take()
                }
                ConnectionState::Connecting => {
                    if let Some(token) = self.shared.pending.lock().take() {
                        token.cancel();
                    }
                    self.shared.apply(&mut state, ConnectionState::closed_by_client());
                    self.shared.end_inbound();
                    return;
                }
                ConnectionState::Disconnected | ConnectionState::Failed { .. } => {
                    self.shared.apply(&mut state, ConnectionState::closed_by_client());
                    self.shared.end_inbound();
                    return;
                }
            }
        };

        if let Some(session) = session {
            session.shutdown.cancel();
            if let Err(e) = session.task.await {
                tracing::warn!(error = %e, "WebSocket session task failed");
            }
            return;
        }

        // Another caller is closing; wait for it to finish.
        loop {
            match states.recv().await {
                Ok(state) if state.is_terminal() => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.state().is_terminal() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let outbound = {
            let state = self.shared.state.lock();
            if *state != ConnectionState::Connected {
                return Err(TransportError::NotConnected);
            }
            self.shared
                .session
                .lock()
                .as_ref()
                .map(|session| session.outbound.clone())
                .ok_or(TransportError::NotConnected)?
        };

        let (ack, done) = oneshot::channel();
        outbound
            .send(Outbound {
                message: frame_message(frame),
                ack,
            })
            .await
            .map_err(|_| TransportError::NotConnected)?;
        done.await.map_err(|_| TransportError::NotConnected)?
    }

    fn inbound(&self) -> InboundFeed {
        signal_feed(self.shared.inbound_tx.subscribe(), "inbound")
    }

    fn states(&self) -> StateFeed {
        lossy_feed(self.shared.state_tx.subscribe(), "state")
    }

    fn state(&self) -> ConnectionState {
        self.shared.state.lock().clone()
    }
}

// =============================================================================
// Shared state
// =============================================================================

impl Shared {
    /// Move to `next` and publish it; repeated states are not republished.
    fn apply(&self, current: &mut ConnectionState, next: ConnectionState) {
        if *current == next {
            return;
        }
        if !current.can_transition_to(&next) {
            tracing::debug!(from = %current, to = %next, "Unexpected state transition");
        }
        tracing::debug!(from = %current, to = %next, "Transport state changed");
        metrics::record_state_transition(TransportLayer::Base, &next);
        *current = next.clone();
        let _ = self.state_tx.send(next);
    }

    fn publish(&self, event: InboundEvent) {
        let _ = self.inbound_tx.send(FeedSignal::Item(event));
    }

    fn end_inbound(&self) {
        let _ = self.inbound_tx.send(FeedSignal::End);
    }

    /// Called by the session task once the read loop has stopped.
    fn finish(&self, terminal: ConnectionState) {
        let mut state = self.state.lock();
        if matches!(*state, ConnectionState::Connected | ConnectionState::Closing) {
            if !terminal.is_client_close() {
                tracing::warn!(state = %terminal, "Market data stream dropped");
            }
            self.apply(&mut state, terminal);
        }
        self.session.lock().take();
        self.end_inbound();
    }
}

// =============================================================================
// Session
// =============================================================================

impl Session {
    fn spawn(shared: Arc<Shared>, ws: WsStream) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_session(shared, ws, outbound_rx, shutdown.clone()));
        Self {
            outbound: outbound_tx,
            shutdown,
            task,
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    ws: WsStream,
    mut outbound: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
) {
    let (mut write, mut read) = ws.split();
    let mut heartbeat = HeartbeatMonitor::new(shared.config.heartbeat.clone());
    let period = heartbeat.ping_interval().max(Duration::from_millis(10));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let terminal = loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                send_close(&mut write, CloseCode::Normal, CLOSED_BY_CLIENT).await;
                break ConnectionState::closed_by_client();
            }
            Some(request) = outbound.recv() => {
                let result = write
                    .send(request.message)
                    .await
                    .map_err(|e| TransportError::Io(e.to_string()));
                let failure = result.as_ref().err().map(ToString::to_string);
                let _ = request.ack.send(result);
                if let Some(reason) = failure {
                    break ConnectionState::dropped(reason);
                }
            }
            _ = ticker.tick() => {
                match heartbeat.on_tick() {
                    HeartbeatAction::SendPing => {
                        if let Err(e) = write.send(Message::Ping(Vec::<u8>::new().into())).await {
                            break ConnectionState::dropped(e.to_string());
                        }
                    }
                    HeartbeatAction::TimedOut(silence) => {
                        tracing::warn!(silence_ms = silence.as_millis(), "Heartbeat timeout");
                        break ConnectionState::dropped(
                            TransportError::HeartbeatTimeout(silence).to_string(),
                        );
                    }
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(message)) => {
                        heartbeat.record_activity();
                        if let Flow::Stop(state) = handle_message(&shared, &mut write, message).await {
                            break state;
                        }
                    }
                    Some(Err(e)) if is_malformed_frame(&e) => {
                        // The read half has ended; report the frame, then fail the connection.
                        let reason = e.to_string();
                        tracing::warn!(error = %reason, "Malformed frame, closing connection");
                        let failure = TransportError::MalformedFrame(reason.clone());
                        shared.publish(InboundEvent::Failure(failure));
                        send_close(&mut write, CloseCode::Invalid, "invalid utf-8").await;
                        break ConnectionState::closed(close_code::INVALID_PAYLOAD, reason);
                    }
                    Some(Err(e)) => break ConnectionState::dropped(e.to_string()),
                    None => break ConnectionState::dropped("stream ended"),
                }
            }
        }
    };

    drop(read);
    shared.finish(terminal);
}

async fn handle_message(shared: &Shared, write: &mut WsWriter, message: Message) -> Flow {
    match message {
        Message::Text(text) => {
            metrics::record_frame_received(text.len());
            shared.publish(InboundEvent::Payload(text.as_bytes().to_vec()));
        }
        Message::Binary(data) => {
            metrics::record_frame_received(data.len());
            shared.publish(InboundEvent::Payload(data.to_vec()));
        }
        Message::Ping(data) => {
            if let Err(e) = write.send(Message::Pong(data)).await {
                return Flow::Stop(ConnectionState::dropped(e.to_string()));
            }
        }
        Message::Close(frame) => {
            let (code, reason) = frame.map_or_else(
                || (close_code::NO_STATUS, String::new()),
                |f| (u16::from(f.code), f.reason.as_str().to_string()),
            );
            tracing::info!(code, reason = %reason, "Server sent close frame");
            return Flow::Stop(ConnectionState::closed(code, reason));
        }
        Message::Pong(_) | Message::Frame(_) => {}
    }
    Flow::Continue
}

async fn send_close(write: &mut WsWriter, code: CloseCode, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    if let Err(e) = write.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Failed to send close frame");
    }
}

fn is_malformed_frame(error: &tungstenite::Error) -> bool {
    matches!(error, tungstenite::Error::Utf8 { .. })
}

fn frame_message(frame: Vec<u8>) -> Message {
    match String::from_utf8(frame) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => Message::Binary(e.into_bytes().into()),
    }
}

fn validate_endpoint(url: &str) -> Result<(), TransportError> {
    let rest = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .unwrap_or_default();
    if rest.is_empty() || rest.starts_with('/') || rest.contains(char::is_whitespace) {
        return Err(TransportError::InvalidEndpoint(url.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[test]
    fn endpoint_validation() {
        assert!(validate_endpoint("wss://api.upbit.com/websocket/v1").is_ok());
        assert!(validate_endpoint("ws://127.0.0.1:9001").is_ok());
        assert!(validate_endpoint("https://api.upbit.com").is_err());
        assert!(validate_endpoint("wss://").is_err());
        assert!(validate_endpoint("ws:///path").is_err());
        assert!(validate_endpoint("").is_err());
    }

    #[test]
    fn utf8_frames_go_out_as_text() {
        assert!(matches!(frame_message(b"[{}]".to_vec()), Message::Text(_)));
        assert!(matches!(frame_message(vec![0xff, 0xfe]), Message::Binary(_)));
    }

    #[tokio::test]
    async fn starts_disconnected_and_send_fails() {
        let transport = WebSocketTransport::new(WebSocketConfig::new("ws://127.0.0.1:1"));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(
            transport.send(b"hi".to_vec()).await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn invalid_endpoint_fails_without_io() {
        let transport = WebSocketTransport::new(WebSocketConfig::new("http://example.com"));
        let mut states = transport.states();

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
        assert!(!err.is_retryable());

        assert_eq!(states.next().await, Some(ConnectionState::Connecting));
        assert!(matches!(
            states.next().await,
            Some(ConnectionState::Failed {
                error: TransportError::InvalidEndpoint(_)
            })
        ));
    }

    #[tokio::test]
    async fn close_before_connect_reaches_closed_once() {
        let transport = WebSocketTransport::new(WebSocketConfig::new("ws://127.0.0.1:1"));
        let mut states = transport.states();

        transport.close().await;
        transport.close().await;

        assert_eq!(states.next().await, Some(ConnectionState::closed_by_client()));
        assert_eq!(transport.state(), ConnectionState::closed_by_client());
        drop(transport);
        assert_eq!(states.next().await, None);
    }

    #[tokio::test]
    async fn refused_connection_fails() {
        // Port 1 is never listening in the test environment.
        let transport = WebSocketTransport::new(
            WebSocketConfig::new("ws://127.0.0.1:1").with_connect_timeout(Duration::from_secs(2)),
        );
        let err = transport.connect().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(transport.state(), ConnectionState::Failed { .. }));
    }
}
