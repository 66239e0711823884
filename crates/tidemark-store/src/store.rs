//! The store gateway trait.
//!
//! [`EventStore`] is the narrow seam between the query engine and whatever
//! holds the journal: a paged range read over sorted sets and a pub/sub
//! subscription. Everything above it (cursoring, buffering, filtering,
//! notification handling) lives in the query crate; everything below it
//! (connection management, wire protocol) lives in a backend.

use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::StoreError;

/// Paged range reads and change subscriptions over the backing store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns the values whose score lies in the closed interval
    /// `[lo, hi]`, in ascending score order.
    ///
    /// An empty interval (`lo > hi`) or an unknown key yields an empty vec.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on read failure; partial success is not defined.
    async fn range(&self, key: &str, lo: u64, hi: u64) -> Result<Vec<Bytes>, StoreError>;

    /// Opens a pub/sub subscription on `channel`.
    ///
    /// Messages published after this call resolves are delivered through the
    /// returned listener. Dropping the listener releases the subscription.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the subscription cannot be established.
    async fn subscribe(&self, channel: &str) -> Result<NotificationListener, StoreError>;
}

/// Receiving half of a pub/sub subscription.
///
/// Wraps an unbounded channel of raw payloads. Backends that bridge from an
/// external client attach a forwarding task, aborted when the listener is
/// dropped so delivery stops with the subscriber.
pub struct NotificationListener {
    rx: mpsc::UnboundedReceiver<Bytes>,
    forwarder: Option<tokio::task::JoinHandle<()>>,
}

impl NotificationListener {
    /// Creates a listener over a raw receiver.
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self {
            rx,
            forwarder: None,
        }
    }

    /// Creates a listener whose messages are produced by a forwarding task.
    ///
    /// The task is aborted when the listener is dropped.
    #[must_use]
    pub fn with_forwarder(
        rx: mpsc::UnboundedReceiver<Bytes>,
        forwarder: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            forwarder: Some(forwarder),
        }
    }

    /// Polls for the next notification payload.
    ///
    /// Returns `Poll::Ready(None)` once the publishing side is gone, which
    /// callers treat as liveness loss rather than failure.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }

    /// Receives the next notification payload.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

impl std::fmt::Debug for NotificationListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationListener")
            .field("forwarder", &self.forwarder.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_delivers_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listener = NotificationListener::new(rx);

        tx.send(Bytes::from("1")).unwrap();
        tx.send(Bytes::from("2")).unwrap();

        assert_eq!(listener.recv().await, Some(Bytes::from("1")));
        assert_eq!(listener.recv().await, Some(Bytes::from("2")));
    }

    #[tokio::test]
    async fn test_listener_ends_when_publisher_gone() {
        let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
        let mut listener = NotificationListener::new(rx);
        drop(tx);
        assert_eq!(listener.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_aborts_forwarder() {
        let (_tx, rx) = mpsc::unbounded_channel::<Bytes>();
        let task = tokio::spawn(async {
            std::future::pending::<()>().await;
        });
        let handle = task.abort_handle();

        drop(NotificationListener::with_forwarder(rx, task));

        // The aborted task settles; give the runtime a tick to observe it.
        tokio::task::yield_now().await;
        assert!(handle.is_finished());
    }
}
