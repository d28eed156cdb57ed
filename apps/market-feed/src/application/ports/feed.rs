//! Broadcast-backed feeds.
//!
//! Feeds are `tokio::sync::broadcast` receivers wrapped as boxed streams.
//! A subscriber that falls behind skips what it missed and keeps going.

use futures::StreamExt;
use futures::future;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::domain::connection::{ConnectionState, InboundEvent};

/// Boxed, `Send` stream of feed items.
pub type Feed<T> = BoxStream<'static, T>;

/// Inbound frames of a transport.
pub type InboundFeed = Feed<InboundEvent>;

/// Lifecycle transitions of a transport.
pub type StateFeed = Feed<ConnectionState>;

/// Item on a channel whose feed can complete.
#[derive(Debug, Clone)]
pub enum FeedSignal<T> {
    /// Next item.
    Item(T),
    /// The producer finished; subscribers' feeds complete.
    End,
}

/// Feed over a channel that never completes on its own.
pub fn lossy_feed<T>(receiver: broadcast::Receiver<T>, name: &'static str) -> Feed<T>
where
    T: Clone + Send + 'static,
{
    BroadcastStream::new(receiver)
        .filter_map(move |item| future::ready(skip_lagged(item, name)))
        .boxed()
}

/// Feed that completes at the first [`FeedSignal::End`].
pub fn signal_feed<T>(receiver: broadcast::Receiver<FeedSignal<T>>, name: &'static str) -> Feed<T>
where
    T: Clone + Send + 'static,
{
    BroadcastStream::new(receiver)
        .filter_map(move |item| future::ready(skip_lagged(item, name)))
        .take_while(|signal| future::ready(matches!(signal, FeedSignal::Item(_))))
        .filter_map(|signal| {
            future::ready(match signal {
                FeedSignal::Item(item) => Some(item),
                FeedSignal::End => None,
            })
        })
        .boxed()
}

fn skip_lagged<T>(item: Result<T, BroadcastStreamRecvError>, name: &'static str) -> Option<T> {
    match item {
        Ok(item) => Some(item),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(feed = name, skipped, "Feed subscriber lagged, skipping items");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_feed_completes_on_end() {
        let (tx, rx) = broadcast::channel(8);
        let mut feed = signal_feed(rx, "test");

        tx.send(FeedSignal::Item(1)).unwrap();
        tx.send(FeedSignal::Item(2)).unwrap();
        tx.send(FeedSignal::End).unwrap();
        tx.send(FeedSignal::Item(3)).unwrap();

        assert_eq!(feed.next().await, Some(1));
        assert_eq!(feed.next().await, Some(2));
        assert_eq!(feed.next().await, None);
    }

    #[tokio::test]
    async fn lossy_feed_skips_overwritten_items() {
        let (tx, rx) = broadcast::channel(2);
        let feed = lossy_feed(rx, "test");

        for value in 0..5 {
            tx.send(value).unwrap();
        }
        drop(tx);

        let received: Vec<i32> = feed.collect().await;
        assert_eq!(received, vec![3, 4]);
    }

    #[tokio::test]
    async fn feeds_are_independent_per_subscriber() {
        let (tx, _) = broadcast::channel(8);
        let mut first = lossy_feed(tx.subscribe(), "test");
        tx.send("a").unwrap();
        let mut second = lossy_feed(tx.subscribe(), "test");
        tx.send("b").unwrap();

        assert_eq!(first.next().await, Some("a"));
        assert_eq!(first.next().await, Some("b"));
        assert_eq!(second.next().await, Some("b"));
    }
}
