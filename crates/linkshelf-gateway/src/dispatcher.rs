use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use linkshelf_types::events::{ChangeEvent, ChangeKind, ChangeRecord, Topic};
use linkshelf_types::models::{InboxMessage, Reaction};

/// Fans row-level change events out to every connected client. Each
/// connection filters by the topics it subscribed to.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for change events — every connection receives every event
    broadcast_tx: broadcast::Sender<ChangeEvent>,

    connections: AtomicUsize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to change events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event. Delivery is best effort; with nobody listening the
    /// event is dropped.
    pub fn publish(&self, event: ChangeEvent) {
        trace!("publish {:?} on {}", event.kind, event.topic);
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub fn inbox_changed(&self, kind: ChangeKind, message: InboxMessage) {
        self.publish(ChangeEvent {
            topic: Topic::Inbox {
                recipient_id: message.recipient_id,
            },
            kind,
            record: ChangeRecord::InboxMessage(message),
        });
    }

    pub fn reaction_changed(&self, kind: ChangeKind, reaction: Reaction) {
        self.publish(ChangeEvent {
            topic: Topic::Reactions {
                target: reaction.target,
            },
            kind,
            record: ChangeRecord::Reaction(reaction),
        });
    }

    pub(crate) fn connection_opened(&self, user_id: Uuid) -> usize {
        let n = self.inner.connections.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("{} connected, {} open connections", user_id, n);
        n
    }

    pub(crate) fn connection_closed(&self) {
        self.inner.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::Relaxed)
    }
}
