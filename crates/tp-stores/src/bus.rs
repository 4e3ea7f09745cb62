use std::sync::{Arc, Mutex};

/// A broadcast-style snapshot bus built on top of flume channels.
///
/// Each call to [`subscribe`](Self::subscribe) creates a new receiver that
/// will receive every snapshot published after the subscription was
/// created. Dropping the receiver detaches the subscriber; it is pruned on
/// the next publish, so no delivery happens after detach. The bus is
/// thread-safe and clones cheaply.
pub struct SnapshotBus<T> {
    inner: Arc<Mutex<Vec<flume::Sender<T>>>>,
}

impl<T: Clone> SnapshotBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        let mut senders = self.inner.lock().expect("SnapshotBus lock poisoned");
        senders.push(tx);
        rx
    }

    /// Publish a snapshot to all current subscribers, in registration
    /// order, at most once each. Disconnected subscribers are pruned.
    pub fn publish(&self, snapshot: T) {
        let mut senders = self.inner.lock().expect("SnapshotBus lock poisoned");
        senders.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        let senders = self.inner.lock().expect("SnapshotBus lock poisoned");
        senders.len()
    }
}

impl<T> Clone for SnapshotBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for SnapshotBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
