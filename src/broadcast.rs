// =============================================================================
// Broadcast Hub: fan-out of stream messages to every connected listener
// =============================================================================
//
// Every listener owns a bounded outbound queue. `publish` serialises the
// message once, snapshots the current membership under a read lock, and
// `try_send`s into each queue without ever awaiting. A listener whose queue is
// full (too slow) or closed (gone) is dropped on the spot; the rest of the
// fan-out carries on and `publish` itself never fails.
//
// Each queue is FIFO, so successive publishes reach a given listener in call
// order. Across listeners there is no ordering.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SimError;
use crate::types::StreamMessage;

/// Opaque identity of one connected listener.
pub type ListenerId = Uuid;

/// Default depth of each listener's outbound queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

struct Listener {
    tx: mpsc::Sender<Arc<str>>,
    connected_at: Instant,
}

impl Listener {
    #[cfg(test)]
    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving side of a listener, handed to the transport that pumps messages
/// out to the client.
///
/// Once the hub drops the listener (explicitly or after a failed delivery)
/// `recv` drains whatever is still queued and then returns `None`.
pub struct ListenerHandle {
    id: ListenerId,
    rx: mpsc::Receiver<Arc<str>>,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next serialised message.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Next already-queued message, if any.
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

pub struct BroadcastHub {
    listeners: RwLock<HashMap<ListenerId, Listener>>,
    queue_depth: usize,
    messages_published: AtomicU64,
}

impl BroadcastHub {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
            messages_published: AtomicU64::new(0),
        }
    }

    /// Add a new listener to the active set.
    pub fn register(&self) -> ListenerHandle {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let id = Uuid::new_v4();

        let total = {
            let mut listeners = self.listeners.write();
            listeners.insert(
                id,
                Listener {
                    tx,
                    connected_at: Instant::now(),
                },
            );
            listeners.len()
        };

        info!(listener = %id, total, "listener registered");
        ListenerHandle { id, rx }
    }

    /// Remove a listener. Unknown or already-removed ids are a no-op.
    ///
    /// Returns `true` when a listener was actually removed.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.listeners.write().remove(&id);
        match removed {
            Some(listener) => {
                info!(
                    listener = %id,
                    connected_secs = listener.connected_at.elapsed().as_secs(),
                    "listener unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Deliver `message` to every listener registered right now.
    ///
    /// Returns how many listeners accepted it.
    pub fn publish(&self, message: &StreamMessage) -> usize {
        match serde_json::to_string(message) {
            Ok(json) => self.publish_raw(Arc::from(json)),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to serialise stream message");
                0
            }
        }
    }

    /// Deliver an already serialised payload to every registered listener.
    pub fn publish_raw(&self, payload: Arc<str>) -> usize {
        let targets: Vec<(ListenerId, mpsc::Sender<Arc<str>>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, l)| (*id, l.tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    let reason = match e {
                        TrySendError::Full(_) => "queue full",
                        TrySendError::Closed(_) => "connection closed",
                    };
                    failed.push(SimError::ListenerSendFailure {
                        listener: id,
                        reason: reason.to_string(),
                    });
                }
            }
        }

        if !failed.is_empty() {
            let mut listeners = self.listeners.write();
            for err in &failed {
                if let SimError::ListenerSendFailure { listener, .. } = err {
                    listeners.remove(listener);
                }
                debug!(error = %err, "dropping listener");
            }
        }

        self.messages_published.fetch_add(1, Ordering::Relaxed);
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    #[cfg(test)]
    pub fn is_registered(&self, id: ListenerId) -> bool {
        self.listeners
            .read()
            .get(&id)
            .is_some_and(Listener::is_alive)
    }

    /// Number of `publish` calls so far.
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

// =============================================================================
// Tests
// =============================================================================
