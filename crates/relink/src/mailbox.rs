//! Outbound command mailbox
//!
//! A thread-safe FIFO shared between any number of producers (callers of
//! [`Connector::enqueue`](crate::Connector::enqueue)) and the single session
//! that consumes it. Waiting for an item is cancel-aware so that `stop()`
//! unblocks a session parked on an empty mailbox.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{SessionError, SessionResult};

/// Unbounded multi-producer FIFO queue of outbound items.
pub struct Mailbox<T> {
    tx: flume::Sender<T>,
    rx: flume::Receiver<T>,
}

impl<T> Mailbox<T> {
    /// Create an empty mailbox
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    /// Append an item. Never blocks.
    pub fn put(&self, item: T) {
        // The mailbox owns the receiver, so the channel cannot be disconnected
        let _ = self.tx.send(item);
    }

    /// Take the oldest item if one is queued
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next item.
    ///
    /// Resolves to [`SessionError::Cancelled`] as soon as `cancel` fires, even
    /// when items are queued.
    pub async fn take(&self, cancel: &CancellationToken) -> SessionResult<T> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SessionError::Cancelled),
            item = self.rx.recv_async() => item.map_err(|_| SessionError::Cancelled),
        }
    }

    /// Wait up to `timeout` for the next item; `Ok(None)` when nothing arrived.
    pub async fn take_timeout(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> SessionResult<Option<T>> {
        match tokio::time::timeout(timeout, self.take(cancel)).await {
            Ok(item) => item.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Discard every queued item, returning how many were dropped.
    ///
    /// The queue is swapped out under a single lock, so concurrent `put`s land
    /// either entirely before or entirely after the clear.
    pub fn clear(&self) -> usize {
        self.rx.drain().count()
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").field("len", &self.len()).finish()
    }
}
