// ── Snapshot store ──
//
// Holds the latest successful poll result. Each refresh replaces the
// snapshot wholesale; subscribers are woken through a `watch` channel.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use pvs_api::Snapshot;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Latest snapshot plus "data updated" notification.
pub struct SnapshotStore {
    current: watch::Sender<Option<Arc<Snapshot>>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    /// Replace the stored snapshot and wake every subscriber.
    pub fn replace(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    /// The latest snapshot, if any poll has succeeded yet.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.current.subscribe())
    }
}

// ── SnapshotStream ──────────────────────────────────────────────────

/// A subscription to snapshot replacements.
///
/// Offers the value seen at creation, the latest value, and change
/// notification via [`changed`](Self::changed) or as a `Stream`.
pub struct SnapshotStream {
    current: Option<Arc<Snapshot>>,
    receiver: watch::Receiver<Option<Arc<Snapshot>>>,
}

impl SnapshotStream {
    fn new(mut receiver: watch::Receiver<Option<Arc<Snapshot>>>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or by the last `changed()`.
    pub fn current(&self) -> Option<&Arc<Snapshot>> {
        self.current.as_ref()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next replacement.
    /// Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            self.receiver.changed().await.ok()?;
            let next = self.receiver.borrow_and_update().clone();
            if let Some(snapshot) = next {
                self.current = Some(Arc::clone(&snapshot));
                return Some(snapshot);
            }
        }
    }

    /// Convert into a `Stream` of replacements, starting with the current value.
    pub fn into_stream(self) -> SnapshotWatchStream {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct SnapshotWatchStream {
    inner: WatchStream<Option<Arc<Snapshot>>>,
}

impl Stream for SnapshotWatchStream {
    type Item = Option<Arc<Snapshot>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn starts_empty() {
        assert!(SnapshotStore::new().current().is_none());
    }

    #[tokio::test]
    async fn replace_wakes_subscribers() {
        let store = SnapshotStore::new();
        let mut sub = store.subscribe();
        assert!(sub.current().is_none());

        let first = store.replace(Snapshot::empty());
        let seen = sub.changed().await.unwrap();
        assert!(Arc::ptr_eq(&seen, &first));
        assert!(Arc::ptr_eq(sub.current().unwrap(), &first));

        let second = store.replace(Snapshot::empty());
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&store.current().unwrap(), &second));
        assert!(Arc::ptr_eq(&sub.latest().unwrap(), &second));
    }

    #[tokio::test]
    async fn changed_ends_when_store_dropped() {
        let store = SnapshotStore::new();
        let mut sub = store.subscribe();
        drop(store);
        assert!(sub.changed().await.is_none());
    }

    #[tokio::test]
    async fn stream_yields_current_then_updates() {
        use futures_util::StreamExt;

        let store = SnapshotStore::new();
        let first = store.replace(Snapshot::empty());
        let mut stream = store.subscribe().into_stream();

        let initial = stream.next().await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&initial, &first));

        let second = store.replace(Snapshot::empty());
        let next = stream.next().await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&next, &second));
    }
}
