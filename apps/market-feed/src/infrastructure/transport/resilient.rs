//! Resilient Transport
//!
//! Decorator that presents the [`Transport`] contract over a sequence of
//! short-lived inner transports. A single supervisor task owns the current
//! inner transport: it builds one from the factory, connects it, replays the
//! last subscription, and when the inner connection ends without the caller
//! asking, waits out the backoff delay and starts over with a fresh instance.
//!
//! # Guarantees
//!
//! - At most one inner transport and one pending reconnect delay exist.
//! - `connect()` and `close()` are serialized on the supervisor slot; a new
//!   supervisor starts only after the previous one has fully stopped.
//! - `connected` is published only after the stored subscription has been
//!   re-sent on the new connection.
//! - The inbound feed survives reconnects and completes only when the
//!   supervisor stops (`close()`, a non-retryable failure or exhausted retries).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    FeedSignal, InboundFeed, StateFeed, Transport, TransportFactory, lossy_feed, signal_feed,
};
use crate::domain::connection::{ConnectionState, InboundEvent, TransportError};
use crate::infrastructure::metrics::{self, TransportLayer};
use crate::infrastructure::transport::reconnect::{ReconnectConfig, ReconnectPolicy};

const STATE_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 1_024;

/// Time allowed for a finished connection's inbound frames to drain.
const FORWARDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

type FirstAttempt = Option<oneshot::Sender<Result<(), TransportError>>>;

/// Reconnecting transport decorator.
pub struct ResilientTransport {
    core: Arc<Core>,
}

struct Core {
    factory: Arc<dyn TransportFactory>,
    config: ReconnectConfig,
    state: Mutex<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    inbound_tx: broadcast::Sender<FeedSignal<InboundEvent>>,
    current: Mutex<Option<Arc<dyn Transport>>>,
    // Held across the replay so a concurrent subscribe cannot slip between
    // the replay and `connected`.
    subscription: tokio::sync::Mutex<Option<Vec<u8>>>,
    supervisor: tokio::sync::Mutex<Option<Supervisor>>,
}

struct Supervisor {
    cancel: CancellationToken,
    // Set before a supervisor that gives up publishes its final state.
    stopped: CancellationToken,
    task: JoinHandle<()>,
}

/// How one connection ended.
enum Outcome {
    /// The caller closed the façade.
    Stopped,
    /// The connection failed or dropped on its own.
    Dropped {
        retryable: bool,
        reset_backoff: bool,
    },
}

impl ResilientTransport {
    /// Decorate transports built by `factory` with the given backoff.
    #[must_use]
    pub fn new(factory: Arc<dyn TransportFactory>, config: ReconnectConfig) -> Self {
        Self::with_capacity(factory, config, INBOUND_CAPACITY, STATE_CAPACITY)
    }

    /// Like [`ResilientTransport::new`] with explicit feed capacities.
    #[must_use]
    pub fn with_capacity(
        factory: Arc<dyn TransportFactory>,
        config: ReconnectConfig,
        inbound_capacity: usize,
        state_capacity: usize,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(state_capacity.max(1));
        let (inbound_tx, _) = broadcast::channel(inbound_capacity.max(1));
        Self {
            core: Arc::new(Core {
                factory,
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                state_tx,
                inbound_tx,
                current: Mutex::new(None),
                subscription: tokio::sync::Mutex::new(None),
                supervisor: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Whether an inner transport currently exists.
    #[must_use]
    pub fn has_inner(&self) -> bool {
        self.core.current.lock().is_some()
    }
}

impl Drop for ResilientTransport {
    fn drop(&mut self) {
        if let Ok(mut supervisor) = self.core.supervisor.try_lock()
            && let Some(supervisor) = supervisor.take()
        {
            supervisor.cancel.cancel();
        }
    }
}

#[async_trait]
impl Transport for ResilientTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let first = {
            let mut supervisor = self.core.supervisor.lock().await;
            if let Some(running) = supervisor.take() {
                if !running.stopped.is_cancelled() {
                    *supervisor = Some(running);
                    return Ok(());
                }
                // Stopped on its own; let it finish publishing before replacing it.
                if let Err(e) = running.task.await {
                    tracing::warn!(error = %e, "Reconnect supervisor failed");
                }
            }

            let cancel = CancellationToken::new();
            let stopped = CancellationToken::new();
            let (first_tx, first_rx) = oneshot::channel();
            let task = tokio::spawn(supervise(
                Arc::clone(&self.core),
                cancel.clone(),
                stopped.clone(),
                first_tx,
            ));
            *supervisor = Some(Supervisor {
                cancel,
                stopped,
                task,
            });
            first_rx
        };

        first.await.unwrap_or(Err(TransportError::Closed))
    }

    async fn close(&self) {
        // Held until the close is complete so a concurrent connect() waits for it.
        let mut slot = self.core.supervisor.lock().await;

        if let Some(supervisor) = slot.take() {
            supervisor.cancel.cancel();
            let current = self.core.current.lock().clone();
            if let Some(inner) = current {
                inner.close().await;
            }
            if let Err(e) = supervisor.task.await {
                tracing::warn!(error = %e, "Reconnect supervisor failed");
            }
        }

        if !matches!(self.core.state(), ConnectionState::Closed { .. }) {
            self.core.publish(ConnectionState::closed_by_client());
            self.core.end_inbound();
        }
        drop(slot);
    }

    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.core.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let inner = self
            .core
            .current
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;
        inner.send(frame).await
    }

    /// Remember `frame` for replay and send it now if connected.
    ///
    /// While disconnected or reconnecting this succeeds without sending; the
    /// frame goes out as soon as the next connection is established.
    async fn send_subscription(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        let mut stored = self.core.subscription.lock().await;
        *stored = Some(frame.clone());

        match self.send(frame).await {
            Err(TransportError::NotConnected) => {
                tracing::debug!("Subscription stored until the next connection");
                Ok(())
            }
            result => result,
        }
    }

    fn inbound(&self) -> InboundFeed {
        signal_feed(self.core.inbound_tx.subscribe(), "resilient-inbound")
    }

    fn states(&self) -> StateFeed {
        lossy_feed(self.core.state_tx.subscribe(), "resilient-state")
    }

    fn state(&self) -> ConnectionState {
        self.core.state()
    }
}

// =============================================================================
// Supervisor
// =============================================================================

async fn supervise(
    core: Arc<Core>,
    cancel: CancellationToken,
    stopped: CancellationToken,
    first: oneshot::Sender<Result<(), TransportError>>,
) {
    let mut first = Some(first);
    let mut policy = ReconnectPolicy::new(core.config.clone());

    loop {
        let outcome = core.run_connection(&cancel, &stopped, &mut first).await;
        let (retryable, reset_backoff) = match outcome {
            Outcome::Stopped => break,
            Outcome::Dropped {
                retryable,
                reset_backoff,
            } => (retryable, reset_backoff),
        };

        if cancel.is_cancelled() {
            break;
        }
        if reset_backoff {
            policy.reset();
        }
        if !retryable {
            tracing::warn!(state = %core.state(), "Connection failure is not retryable");
            break;
        }

        let Some(delay) = policy.next_delay() else {
            stopped.cancel();
            let max = policy.max_attempts();
            tracing::error!(max_attempts = max, "Giving up reconnecting");
            metrics::record_reconnects_exhausted();
            core.publish(ConnectionState::Failed {
                error: TransportError::RetriesExhausted(max),
            });
            break;
        };

        metrics::record_reconnect();
        tracing::info!(
            attempt = policy.attempt_count(),
            delay_ms = delay.as_millis(),
            "Scheduling reconnect"
        );

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    stopped.cancel();
    core.current.lock().take();
    if cancel.is_cancelled() && !core.state().is_client_close() {
        core.publish(ConnectionState::closed_by_client());
    }
    core.end_inbound();
}

impl Core {
    fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    fn publish(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state == next {
            return;
        }
        tracing::debug!(from = %*state, to = %next, "Resilient transport state changed");
        metrics::record_state_transition(TransportLayer::Resilient, &next);
        *state = next.clone();
        let _ = self.state_tx.send(next);
    }

    fn end_inbound(&self) {
        let _ = self.inbound_tx.send(FeedSignal::End);
    }

    /// Drive one inner transport from creation until it ends.
    async fn run_connection(
        &self,
        cancel: &CancellationToken,
        stopped: &CancellationToken,
        first: &mut FirstAttempt,
    ) -> Outcome {
        let inner = self.factory.create();
        let mut inner_states = inner.states();
        let forwarder = spawn_forwarder(inner.inbound(), self.inbound_tx.clone());
        *self.current.lock() = Some(Arc::clone(&inner));

        self.publish(ConnectionState::Connecting);
        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                inner.close().await;
                self.publish(inner.state());
                self.detach(forwarder).await;
                return Outcome::Stopped;
            }
            result = inner.connect() => result,
        };

        if let Err(error) = connected {
            tracing::warn!(error = %error, "Connection attempt failed");
            let retryable = error.is_retryable();
            if !retryable {
                stopped.cancel();
            }
            self.publish(ConnectionState::Failed {
                error: error.clone(),
            });
            notify(first, Err(error));
            self.detach(forwarder).await;
            return Outcome::Dropped {
                retryable,
                reset_backoff: false,
            };
        }

        {
            let subscription = self.subscription.lock().await;
            if let Some(frame) = subscription.clone() {
                let bytes = frame.len();
                if let Err(error) = inner.send(frame).await {
                    tracing::warn!(error = %error, "Subscription replay failed");
                    drop(subscription);
                    inner.close().await;
                    self.publish(ConnectionState::Failed {
                        error: error.clone(),
                    });
                    notify(first, Err(error));
                    self.detach(forwarder).await;
                    return Outcome::Dropped {
                        retryable: true,
                        reset_backoff: false,
                    };
                }
                metrics::record_subscription_replay();
                tracing::debug!(bytes, "Subscription replayed");
            }
            self.publish(ConnectionState::Connected);
        }
        notify(first, Ok(()));
        tracing::info!("Resilient transport connected");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    inner.close().await;
                    self.publish(inner.state());
                    self.detach(forwarder).await;
                    return Outcome::Stopped;
                }
                next = inner_states.next() => {
                    let state = next.unwrap_or_else(|| inner.state());
                    match state {
                        ConnectionState::Closing => self.publish(ConnectionState::Closing),
                        ConnectionState::Closed { .. } | ConnectionState::Failed { .. } => {
                            let retryable = match &state {
                                ConnectionState::Failed { error } => error.is_retryable(),
                                _ => true,
                            };
                            if !retryable {
                                stopped.cancel();
                            }
                            tracing::warn!(state = %state, "Inner transport ended");
                            self.publish(state);
                            self.detach(forwarder).await;
                            return Outcome::Dropped {
                                retryable,
                                reset_backoff: true,
                            };
                        }
                        // Buffered transitions from the handshake.
                        ConnectionState::Disconnected
                        | ConnectionState::Connecting
                        | ConnectionState::Connected => {}
                    }
                }
            }
        }
    }

    /// Release the current inner transport once its frames have drained.
    async fn detach(&self, forwarder: JoinHandle<()>) {
        self.current.lock().take();
        let abort = forwarder.abort_handle();
        if tokio::time::timeout(FORWARDER_DRAIN_TIMEOUT, forwarder)
            .await
            .is_err()
        {
            tracing::debug!("Inbound forwarder did not drain in time");
            abort.abort();
        }
    }
}

fn notify(first: &mut FirstAttempt, result: Result<(), TransportError>) {
    if let Some(tx) = first.take() {
        let _ = tx.send(result);
    }
}

fn spawn_forwarder(
    mut inbound: InboundFeed,
    tx: broadcast::Sender<FeedSignal<InboundEvent>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = inbound.next().await {
            let _ = tx.send(FeedSignal::Item(event));
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// In-memory transport whose connect outcome is scripted.
    struct FakeTransport {
        connect_result: Result<(), TransportError>,
        state: Mutex<ConnectionState>,
        state_tx: broadcast::Sender<ConnectionState>,
        inbound_tx: broadcast::Sender<FeedSignal<InboundEvent>>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl FakeTransport {
        fn new(connect_result: Result<(), TransportError>, sent: Arc<Mutex<Vec<Vec<u8>>>>) -> Self {
            let (state_tx, _) = broadcast::channel(16);
            let (inbound_tx, _) = broadcast::channel(16);
            Self {
                connect_result,
                state: Mutex::new(ConnectionState::Disconnected),
                state_tx,
                inbound_tx,
                sent,
            }
        }

        fn set(&self, next: ConnectionState) {
            *self.state.lock() = next.clone();
            let _ = self.state_tx.send(next);
        }

        fn drop_connection(&self) {
            self.set(ConnectionState::dropped("peer went away"));
            let _ = self.inbound_tx.send(FeedSignal::End);
        }

        fn push(&self, payload: &[u8]) {
            let _ = self
                .inbound_tx
                .send(FeedSignal::Item(InboundEvent::Payload(payload.to_vec())));
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            self.set(ConnectionState::Connecting);
            match &self.connect_result {
                Ok(()) => {
                    self.set(ConnectionState::Connected);
                    Ok(())
                }
                Err(error) => {
                    self.set(ConnectionState::Failed {
                        error: error.clone(),
                    });
                    let _ = self.inbound_tx.send(FeedSignal::End);
                    Err(error.clone())
                }
            }
        }

        async fn close(&self) {
            if !matches!(*self.state.lock(), ConnectionState::Closed { .. }) {
                self.set(ConnectionState::closed_by_client());
                let _ = self.inbound_tx.send(FeedSignal::End);
            }
        }

        async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
            if *self.state.lock() != ConnectionState::Connected {
                return Err(TransportError::NotConnected);
            }
            self.sent.lock().push(frame);
            Ok(())
        }

        fn inbound(&self) -> InboundFeed {
            signal_feed(self.inbound_tx.subscribe(), "fake-inbound")
        }

        fn states(&self) -> StateFeed {
            lossy_feed(self.state_tx.subscribe(), "fake-state")
        }

        fn state(&self) -> ConnectionState {
            self.state.lock().clone()
        }
    }

    /// Factory handing out scripted fakes and remembering each one.
    #[derive(Default)]
    struct Script {
        outcomes: Mutex<VecDeque<Result<(), TransportError>>>,
        created: Mutex<Vec<Arc<FakeTransport>>>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        builds: AtomicUsize,
    }

    impl Script {
        fn new(outcomes: impl IntoIterator<Item = Result<(), TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                ..Self::default()
            })
        }

        fn latest(&self) -> Arc<FakeTransport> {
            Arc::clone(self.created.lock().last().unwrap())
        }
    }

    impl TransportFactory for Script {
        fn create(&self) -> Arc<dyn Transport> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(()));
            let fake = Arc::new(FakeTransport::new(outcome, Arc::clone(&self.sent)));
            self.created.lock().push(Arc::clone(&fake));
            fake
        }
    }

    fn fast_backoff(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    async fn wait_for(states: &mut StateFeed, wanted: impl Fn(&ConnectionState) -> bool) -> ConnectionState {
        loop {
            let state = states.next().await.unwrap();
            if wanted(&state) {
                return state;
            }
        }
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let script = Script::new([]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(0));

        transport.connect().await.unwrap();
        transport.connect().await.unwrap();

        assert_eq!(transport.state(), ConnectionState::Connected);
        assert_eq!(script.builds.load(Ordering::SeqCst), 1);
        transport.close().await;
    }

    #[tokio::test]
    async fn stored_subscription_is_sent_on_connect() {
        let script = Script::new([]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(0));

        transport.send_subscription(b"sub-1".to_vec()).await.unwrap();
        assert!(script.sent.lock().is_empty());

        transport.connect().await.unwrap();
        assert_eq!(*script.sent.lock(), vec![b"sub-1".to_vec()]);
        transport.close().await;
    }

    #[tokio::test]
    async fn reconnects_and_replays_before_connected() {
        let script = Script::new([]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(0));
        transport.connect().await.unwrap();
        transport.send_subscription(b"sub".to_vec()).await.unwrap();
        assert_eq!(script.sent.lock().len(), 1);

        let mut states = transport.states();
        script.latest().drop_connection();

        wait_for(&mut states, |s| matches!(s, ConnectionState::Closed { .. })).await;
        wait_for(&mut states, |s| *s == ConnectionState::Connected).await;

        // Replay happened before `connected` was observable.
        assert_eq!(script.sent.lock().len(), 2);
        assert_eq!(script.builds.load(Ordering::SeqCst), 2);
        transport.close().await;
    }

    #[tokio::test]
    async fn inbound_feed_survives_reconnects() {
        let script = Script::new([]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(0));
        let mut inbound = transport.inbound();
        let mut states = transport.states();
        transport.connect().await.unwrap();

        script.latest().push(b"one");
        assert_eq!(inbound.next().await, Some(InboundEvent::Payload(b"one".to_vec())));

        script.latest().drop_connection();
        wait_for(&mut states, |s| matches!(s, ConnectionState::Closed { .. })).await;
        wait_for(&mut states, |s| *s == ConnectionState::Connected).await;

        script.latest().push(b"two");
        assert_eq!(inbound.next().await, Some(InboundEvent::Payload(b"two".to_vec())));

        transport.close().await;
        assert_eq!(inbound.next().await, None);
    }

    #[tokio::test]
    async fn first_failure_is_reported_and_retried() {
        let script = Script::new([Err(TransportError::Handshake("refused".into()))]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(0));
        let mut states = transport.states();

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Handshake(_)));

        wait_for(&mut states, |s| *s == ConnectionState::Connected).await;
        assert_eq!(script.builds.load(Ordering::SeqCst), 2);
        transport.close().await;
    }

    #[tokio::test]
    async fn non_retryable_failure_stops_the_loop() {
        let script = Script::new([Err(TransportError::InvalidEndpoint("http://x".into()))]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(0));

        assert!(transport.connect().await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(script.builds.load(Ordering::SeqCst), 1);
        assert!(matches!(transport.state(), ConnectionState::Failed { .. }));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let refused = || Err(TransportError::Handshake("refused".into()));
        let script = Script::new([refused(), refused(), refused()]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(2));
        let mut states = transport.states();

        assert!(transport.connect().await.is_err());
        let state = wait_for(&mut states, |s| {
            matches!(s, ConnectionState::Failed { error: TransportError::RetriesExhausted(_) })
        })
        .await;

        assert_eq!(
            state,
            ConnectionState::Failed {
                error: TransportError::RetriesExhausted(2)
            }
        );
        assert_eq!(script.builds.load(Ordering::SeqCst), 3);

        transport.close().await;
        assert_eq!(transport.state(), ConnectionState::closed_by_client());
    }

    #[tokio::test]
    async fn close_stops_reconnecting() {
        let script = Script::new([]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(0));
        transport.connect().await.unwrap();

        transport.close().await;
        transport.close().await;

        assert_eq!(transport.state(), ConnectionState::closed_by_client());
        assert!(!transport.has_inner());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(script.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_connect_and_close_stay_consistent() {
        for round in 0..200 {
            let script = Script::new([]);
            let transport = Arc::new(ResilientTransport::new(script.clone(), fast_backoff(0)));
            transport.connect().await.unwrap();

            let spawn_connect = |transport: Arc<ResilientTransport>| {
                tokio::spawn(async move { transport.connect().await })
            };
            let first = spawn_connect(Arc::clone(&transport));
            let closer = {
                let transport = Arc::clone(&transport);
                tokio::spawn(async move { transport.close().await })
            };
            let second = spawn_connect(Arc::clone(&transport));
            closer.await.unwrap();
            // Either connect may lose to the close; only the end state matters.
            let _ = first.await.unwrap();
            let _ = second.await.unwrap();

            let live = script
                .created
                .lock()
                .iter()
                .filter(|fake| fake.state() == ConnectionState::Connected)
                .count();
            let state = transport.state();
            assert!(live <= 1, "round {round}: {live} live inner transports");
            assert_eq!(
                state == ConnectionState::Connected,
                live == 1,
                "round {round}: state {state} with {live} live inner transports"
            );
            assert_eq!(transport.has_inner(), live == 1, "round {round}");

            transport.close().await;
            assert!(
                script.created.lock().iter().all(|fake| fake.state().is_terminal()),
                "round {round}: inner transport left open"
            );
            transport.connect().await.unwrap();
            assert_eq!(transport.state(), ConnectionState::Connected, "round {round}");
            transport.close().await;
        }
    }

    #[tokio::test]
    async fn connect_after_exhaustion_starts_over() {
        let refused = || Err(TransportError::Handshake("refused".into()));
        let script = Script::new([refused(), refused()]);
        let transport = ResilientTransport::new(script.clone(), fast_backoff(1));
        let mut states = transport.states();

        assert!(transport.connect().await.is_err());
        wait_for(&mut states, |s| {
            matches!(s, ConnectionState::Failed { error: TransportError::RetriesExhausted(_) })
        })
        .await;

        transport.connect().await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Connected);
        assert_eq!(script.builds.load(Ordering::SeqCst), 3);
        transport.close().await;
    }

    #[tokio::test]
    async fn send_without_connection_fails() {
        let transport = ResilientTransport::new(Script::new([]), fast_backoff(0));
        assert_eq!(
            transport.send(b"x".to_vec()).await,
            Err(TransportError::NotConnected)
        );
    }
}
