//! Live queries.
//!
//! Every committed write publishes a change notice on its collection's
//! broadcast channel. A [`Subscription`] turns those notices into full
//! snapshots by re-running its query, so a subscriber that falls behind simply
//! resynchronizes on the next delivery instead of missing changes.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::debug;

use crate::error::Result;
use crate::models::{CollectionPath, Snapshot};

/// Stream of snapshots for one live query.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Snapshot>> + Send>>;

type Channels = Arc<DashMap<CollectionPath, broadcast::Sender<u64>>>;

/// Per-collection change-notice fan-out shared by the backends.
///
/// A collection only has a channel while somebody watches it; the last
/// subscription to go away removes it.
pub(crate) struct ChangeFeed {
    channels: Channels,
    capacity: usize,
    live: Arc<AtomicUsize>,
}

impl ChangeFeed {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Announce that `collection` changed at write sequence `sequence`.
    pub(crate) fn publish(&self, collection: &CollectionPath, sequence: u64) {
        let Some(tx) = self.channels.get(collection).map(|tx| tx.value().clone()) else {
            return;
        };
        // A closing subscriber may have just dropped its receiver.
        let _ = tx.send(sequence);
    }

    /// Build a subscription whose snapshots come from `load`.
    ///
    /// The receiver is registered before the first load so a write racing
    /// with subscription setup is never missed.
    pub(crate) fn subscribe<F>(&self, collection: &CollectionPath, load: F) -> Subscription
    where
        F: Fn() -> Result<Snapshot> + Send + Sync + 'static,
    {
        // Subscribe under the entry lock so a closing guard cannot remove the
        // channel between lookup and registration.
        let rx = self
            .channels
            .entry(collection.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        let guard = SubscriptionGuard::new(
            self.live.clone(),
            Arc::downgrade(&self.channels),
            collection.clone(),
        );
        Subscription {
            stream: snapshot_stream(rx, load),
            collection: collection.clone(),
            _guard: guard,
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Collections that currently hold a notice channel.
    #[cfg(test)]
    pub(crate) fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

fn snapshot_stream<F>(rx: broadcast::Receiver<u64>, load: F) -> SnapshotStream
where
    F: Fn() -> Result<Snapshot> + Send + Sync + 'static,
{
    let stream = futures::stream::unfold((rx, load, true), |(mut rx, load, first)| async move {
        if !first {
            match rx.recv().await {
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Subscriber lagged, resynchronizing");
                }
                Err(RecvError::Closed) => return None,
            }
            // Coalesce notices that queued up meanwhile; the next load sees
            // all of them anyway.
            loop {
                match rx.try_recv() {
                    Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
        }
        let snapshot = load();
        Some((snapshot, (rx, load, false)))
    });
    Box::pin(stream)
}

/// Decrements the live-subscription count when the subscription goes away
/// and drops the collection's channel once nobody listens on it.
struct SubscriptionGuard {
    live: Arc<AtomicUsize>,
    // Weak so open subscriptions do not keep a dropped store's senders alive.
    channels: Weak<DashMap<CollectionPath, broadcast::Sender<u64>>>,
    collection: CollectionPath,
}

impl SubscriptionGuard {
    fn new(
        live: Arc<AtomicUsize>,
        channels: Weak<DashMap<CollectionPath, broadcast::Sender<u64>>>,
        collection: CollectionPath,
    ) -> Self {
        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(collection = %collection, active = now, "Subscription opened");
        Self {
            live,
            channels,
            collection,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let now = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        let removed = self.channels.upgrade().is_some_and(|channels| {
            channels
                .remove_if(&self.collection, |_, tx| tx.receiver_count() == 0)
                .is_some()
        });
        debug!(collection = %self.collection, active = now, removed, "Subscription closed");
    }
}

/// A cancelable live query.
///
/// Yields the current matching set immediately, then a fresh snapshot after
/// every write to the collection. Dropping it (or calling
/// [`unsubscribe`](Self::unsubscribe)) cancels the query.
pub struct Subscription {
    stream: SnapshotStream,
    collection: CollectionPath,
    // Declared last: the receiver inside `stream` must be gone before the
    // guard checks for remaining listeners.
    _guard: SubscriptionGuard,
}

impl Subscription {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Wait for the next snapshot. `None` once the store has shut down.
    pub async fn next_snapshot(&mut self) -> Option<Result<Snapshot>> {
        futures::StreamExt::next(self).await
    }

    /// Cancel the live query.
    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = Result<Snapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn counting_feed() -> (ChangeFeed, Arc<AtomicU64>) {
        (ChangeFeed::new(4), Arc::new(AtomicU64::new(0)))
    }

    #[tokio::test]
    async fn test_first_delivery_is_immediate() {
        let (feed, seq) = counting_feed();
        let coll = CollectionPath::new("boards");
        let s = seq.clone();
        let mut sub = feed.subscribe(&coll, move || {
            Ok(Snapshot {
                documents: Vec::new(),
                sequence: s.load(Ordering::SeqCst),
            })
        });

        let first = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(first.sequence, 0);
    }

    #[tokio::test]
    async fn test_notice_triggers_reload() {
        let (feed, seq) = counting_feed();
        let coll = CollectionPath::new("boards");
        let s = seq.clone();
        let mut sub = feed.subscribe(&coll, move || {
            Ok(Snapshot {
                documents: Vec::new(),
                sequence: s.load(Ordering::SeqCst),
            })
        });
        sub.next_snapshot().await.unwrap().unwrap();

        seq.store(7, Ordering::SeqCst);
        feed.publish(&coll, 7);

        let next = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(next.sequence, 7);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_resyncs() {
        let (feed, seq) = counting_feed();
        let coll = CollectionPath::new("tasks");
        let s = seq.clone();
        let mut sub = feed.subscribe(&coll, move || {
            Ok(Snapshot {
                documents: Vec::new(),
                sequence: s.load(Ordering::SeqCst),
            })
        });
        sub.next_snapshot().await.unwrap().unwrap();

        // Overflow the 4-slot channel.
        for i in 1..=20 {
            seq.store(i, Ordering::SeqCst);
            feed.publish(&coll, i);
        }

        let next = sub.next_snapshot().await.unwrap().unwrap();
        assert_eq!(next.sequence, 20);
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_it() {
        let (feed, _) = counting_feed();
        let coll = CollectionPath::new("chats");
        let a = feed.subscribe(&coll, || {
            Ok(Snapshot {
                documents: Vec::new(),
                sequence: 0,
            })
        });
        let b = feed.subscribe(&coll, || {
            Ok(Snapshot {
                documents: Vec::new(),
                sequence: 0,
            })
        });
        assert_eq!(feed.active(), 2);

        a.unsubscribe();
        assert_eq!(feed.active(), 1);
        drop(b);
        assert_eq!(feed.active(), 0);
    }

    #[tokio::test]
    async fn test_other_collections_do_not_wake_subscriber() {
        let (feed, _) = counting_feed();
        let tasks = CollectionPath::new("tasks");
        let mut sub = feed.subscribe(&tasks, || {
            Ok(Snapshot {
                documents: Vec::new(),
                sequence: 0,
            })
        });
        sub.next_snapshot().await.unwrap().unwrap();

        feed.publish(&CollectionPath::new("boards"), 1);

        let woke =
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.next_snapshot()).await;
        assert!(woke.is_err(), "boards write must not wake a tasks subscriber");
    }

    #[tokio::test]
    async fn test_channels_live_only_while_watched() {
        let (feed, _) = counting_feed();
        let empty = || {
            Ok(Snapshot {
                documents: Vec::new(),
                sequence: 0,
            })
        };

        for i in 0..1000 {
            feed.publish(&CollectionPath::new(format!("chats/c{i}/messages")), 1);
        }
        assert_eq!(feed.channel_count(), 0);

        let boards = CollectionPath::new("boards");
        let a = feed.subscribe(&boards, empty);
        let mut b = feed.subscribe(&boards, empty);
        assert_eq!(feed.channel_count(), 1);

        drop(a);
        assert_eq!(feed.channel_count(), 1);
        b.next_snapshot().await.unwrap().unwrap();
        feed.publish(&boards, 1);
        assert!(b.next_snapshot().await.unwrap().is_ok());

        b.unsubscribe();
        assert_eq!(feed.channel_count(), 0);
        assert_eq!(feed.active(), 0);
    }

    #[tokio::test]
    async fn test_dropping_feed_ends_subscriptions() {
        let (feed, _) = counting_feed();
        let mut sub = feed.subscribe(&CollectionPath::new("boards"), || {
            Ok(Snapshot {
                documents: Vec::new(),
                sequence: 0,
            })
        });
        sub.next_snapshot().await.unwrap().unwrap();

        drop(feed);
        assert!(sub.next_snapshot().await.is_none());
    }
}
