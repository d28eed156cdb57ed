//! Ticker Service
//!
//! Owns the decoding pipeline between a transport and ticker consumers.
//! Exactly one reader task consumes the transport's inbound feed; decoded
//! tickers are republished through a [`TickerHub`] so any number of
//! consumers can call [`TickerService::observe_tickers`].
//!
//! Decode failures are logged, counted and skipped. They never end the
//! ticker feed.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    CodecError, DecodedFrame, Feed, FrameCodec, StateFeed, Transport,
};
use crate::domain::connection::{ConnectionState, InboundEvent, TransportError};
use crate::domain::market::{ResponseFormat, SubscriptionRequest, Ticket, TickerValue};
use crate::infrastructure::broadcast::{SharedTickerHub, TickerHub};
use crate::infrastructure::metrics::{self, DecodeStage};

/// Errors surfaced by [`TickerService`].
#[derive(Debug, thiserror::Error)]
pub enum TickerServiceError {
    /// The subscription could not be encoded.
    #[error("failed to encode subscription: {0}")]
    Codec(#[from] CodecError),

    /// The transport refused the operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Ticker stream over a (typically resilient) transport.
pub struct TickerService {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn FrameCodec>,
    format: ResponseFormat,
    hub: SharedTickerHub,
    reader: Mutex<Option<Reader>>,
}

struct Reader {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TickerService {
    /// Build a service over `transport`, decoding with `codec`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn FrameCodec>,
        format: ResponseFormat,
        hub: SharedTickerHub,
    ) -> Self {
        Self {
            transport,
            codec,
            format,
            hub,
            reader: Mutex::new(None),
        }
    }

    /// Build a service with a default-sized hub.
    #[must_use]
    pub fn with_default_hub(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn FrameCodec>,
        format: ResponseFormat,
    ) -> Self {
        Self::new(transport, codec, format, Arc::new(TickerHub::default()))
    }

    /// Connect the transport and start the reader.
    ///
    /// # Errors
    ///
    /// Returns the transport's connect error.
    pub async fn connect(&self) -> Result<(), TickerServiceError> {
        self.ensure_reader();
        self.transport.connect().await?;
        Ok(())
    }

    /// Close the transport. The ticker feed stays open for a later `connect()`.
    pub async fn disconnect(&self) {
        self.transport.close().await;
    }

    /// Subscribe to tickers for `codes` under `ticket`.
    ///
    /// A no-op when `codes` holds no instrument. The request replaces any
    /// previous subscription and is replayed after every reconnect.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be encoded or sent.
    pub async fn subscribe<I, S>(&self, ticket: Ticket, codes: I) -> Result<(), TickerServiceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = SubscriptionRequest::new(ticket, codes, self.format);
        if request.is_empty() {
            tracing::debug!("Ignoring subscription without instruments");
            return Ok(());
        }

        let frame = self.codec.encode_subscription(&request)?;
        self.transport.send_subscription(frame).await.inspect_err(|e| {
            tracing::warn!(ticket = %request.ticket(), error = %e, "Subscription failed");
        })?;

        tracing::info!(
            ticket = %request.ticket(),
            codes = ?request.codes(),
            format = request.format().as_str(),
            "Subscribed to tickers"
        );
        Ok(())
    }

    /// Subscribe under a freshly generated ticket.
    ///
    /// # Errors
    ///
    /// See [`TickerService::subscribe`].
    pub async fn subscribe_codes<I, S>(&self, codes: I) -> Result<Ticket, TickerServiceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ticket = Ticket::generate();
        self.subscribe(ticket.clone(), codes).await?;
        Ok(ticket)
    }

    /// Tickers decoded from now on. Never completes while the service lives.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn observe_tickers(&self) -> Feed<TickerValue> {
        self.ensure_reader();
        let feed = self.hub.feed();
        metrics::set_ticker_subscribers(self.hub.receiver_count());
        feed
    }

    /// Connection state transitions, for diagnostics.
    #[must_use]
    pub fn connection_states(&self) -> StateFeed {
        self.transport.states()
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Number of live ticker subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.receiver_count()
    }

    fn ensure_reader(&self) {
        let mut reader = self.reader.lock();
        if reader.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(read_inbound(
            Arc::clone(&self.transport),
            Arc::clone(&self.codec),
            Arc::clone(&self.hub),
            cancel.clone(),
        ));
        *reader = Some(Reader { cancel, task });
    }
}

impl Drop for TickerService {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.cancel.cancel();
        }
    }
}

/// The single reader of the transport's inbound feed.
async fn read_inbound(
    transport: Arc<dyn Transport>,
    codec: Arc<dyn FrameCodec>,
    hub: SharedTickerHub,
    cancel: CancellationToken,
) {
    loop {
        let mut inbound = transport.inbound();
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                event = inbound.next() => event,
            };
            match event {
                Some(InboundEvent::Payload(payload)) => {
                    handle_payload(codec.as_ref(), &hub, &payload);
                }
                Some(InboundEvent::Failure(error)) => {
                    tracing::warn!(error = %error, "Skipping unreadable frame");
                    metrics::record_decode_failure(DecodeStage::Frame);
                }
                None => break,
            }
        }
        // The feed completes when the transport closes; pick up the next one.
        tracing::debug!("Inbound feed ended, waiting for the next connection");
    }
}

fn handle_payload(codec: &dyn FrameCodec, hub: &TickerHub, payload: &[u8]) {
    match codec.decode(payload) {
        Ok(DecodedFrame::Tickers(tickers)) => {
            for ticker in tickers {
                metrics::record_ticker_published(&ticker.code);
                hub.publish(ticker);
            }
        }
        Ok(DecodedFrame::Status(status)) => {
            tracing::debug!(%status, "Venue status");
        }
        Err(e) => {
            tracing::warn!(error = %e, bytes = payload.len(), "Failed to decode ticker frame");
            metrics::record_decode_failure(DecodeStage::Ticker);
        }
    }
}
