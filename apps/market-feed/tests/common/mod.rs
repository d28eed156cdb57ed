//! Shared integration test helpers: a local WebSocket venue.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use market_feed::ConnectionState;
use market_feed::application::ports::StateFeed;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Server side of one accepted connection.
pub type ServerSocket = WebSocketStream<TcpStream>;

/// Frames received by the venue, tagged with the connection number (from 1).
pub type Received = Arc<Mutex<Vec<(usize, Vec<u8>)>>>;

/// Local venue accepting WebSocket connections on an ephemeral port.
pub struct TestVenue {
    /// `ws://` URL of the venue.
    pub url: String,
    /// Connections accepted so far.
    pub connections: Arc<AtomicUsize>,
    /// Data frames received.
    pub received: Received,
    handle: JoinHandle<()>,
}

impl TestVenue {
    /// Accepted connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Frames received on connection `n`.
    pub fn received_on(&self, n: usize) -> Vec<Vec<u8>> {
        self.received
            .lock()
            .iter()
            .filter(|(conn, _)| *conn == n)
            .map(|(_, frame)| frame.clone())
            .collect()
    }
}

impl Drop for TestVenue {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a venue; `handler` runs once per accepted connection.
pub async fn spawn_venue<F, Fut>(handler: F) -> TestVenue
where
    F: Fn(usize, ServerSocket, Received) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let received: Received = Arc::new(Mutex::new(Vec::new()));

    let handler = Arc::new(handler);
    let counter = Arc::clone(&connections);
    let recorder = Arc::clone(&received);
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let handler = Arc::clone(&handler);
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move { handler(n, socket, recorder).await });
        }
    });

    TestVenue {
        url: format!("ws://{addr}"),
        connections,
        received,
        handle,
    }
}

/// Next data frame from the client, answering pings on the way.
pub async fn read_data(socket: &mut ServerSocket) -> Option<Vec<u8>> {
    while let Some(Ok(message)) = socket.next().await {
        match message {
            Message::Text(text) => return Some(text.as_bytes().to_vec()),
            Message::Binary(data) => return Some(data.to_vec()),
            Message::Close(_) => return None,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    None
}

/// Record every data frame until the client goes away.
pub async fn record_all(n: usize, socket: &mut ServerSocket, received: &Received) {
    while let Some(frame) = read_data(socket).await {
        received.lock().push((n, frame));
    }
}

/// Send `payload` as a binary frame.
pub async fn send_binary(socket: &mut ServerSocket, payload: &[u8]) {
    socket
        .send(Message::Binary(payload.to_vec().into()))
        .await
        .unwrap();
}

/// Wait until `states` yields a state matching `wanted`.
pub async fn wait_for_state(
    states: &mut StateFeed,
    wanted: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = states.next().await.expect("state feed ended");
            if wanted(&state) {
                return state;
            }
        }
    })
    .await
    .expect("timed out waiting for state")
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
