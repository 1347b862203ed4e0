//! Subscriber registry and scope fan-out.
//!
//! Each subscriber gets a bounded mpsc channel for backpressure. The
//! receiver end is drained by the WebSocket write loop; the hub keeps the
//! sender and never awaits it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use opwatch_core::ServerMessage;
use tokio::sync::mpsc;
use tracing::debug;

use super::config::ConnectionConfig;
use crate::traits::{ProgressPublisher, PublishError};

/// Unique identifier for a subscriber, assigned by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

/// Message to be written to a subscriber's socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// A JSON text frame.
    Text(Arc<str>),
    /// A close frame with an optional reason.
    Close(Option<String>),
}

/// Handle to a single subscriber.
#[derive(Debug)]
pub struct SubscriberHandle {
    pub id: SubscriberId,
    /// Scope whose notifications this subscriber receives.
    pub scope: String,
    pub tx: mpsc::Sender<OutboundMessage>,
    pub connected_at: Instant,
}

impl SubscriberHandle {
    /// Attempts to enqueue a message without blocking.
    ///
    /// Returns `false` if the channel is full or the subscriber is gone.
    #[must_use]
    pub fn try_send(&self, msg: OutboundMessage) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Returns `false` once the write loop has dropped its receiver.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Thread-safe registry of scope subscribers.
///
/// Publishing walks the registry without holding any lock across an await,
/// so a slow subscriber costs at most a dropped message.
#[derive(Debug)]
pub struct ScopeHub {
    subscribers: DashMap<SubscriberId, Arc<SubscriberHandle>>,
    next_id: AtomicU64,
}

impl ScopeHub {
    /// Creates an empty hub. Subscriber ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a subscriber for `scope`, returning its handle and the
    /// receiver the write loop should drain.
    pub fn register(
        &self,
        scope: impl Into<String>,
        config: &ConnectionConfig,
    ) -> (Arc<SubscriberHandle>, mpsc::Receiver<OutboundMessage>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(config.outbound_channel_capacity);

        let handle = Arc::new(SubscriberHandle {
            id,
            scope: scope.into(),
            tx,
            connected_at: Instant::now(),
        });

        self.subscribers.insert(id, Arc::clone(&handle));
        metrics::gauge!("opwatch_subscribers").set(self.count() as f64);
        (handle, rx)
    }

    pub fn remove(&self, id: SubscriberId) -> Option<Arc<SubscriberHandle>> {
        let removed = self.subscribers.remove(&id).map(|(_, handle)| handle);
        metrics::gauge!("opwatch_subscribers").set(self.count() as f64);
        removed
    }

    pub fn get(&self, id: SubscriberId) -> Option<Arc<SubscriberHandle>> {
        self.subscribers.get(&id).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn count_for_scope(&self, scope: &str) -> usize {
        self.subscribers
            .iter()
            .filter(|entry| entry.value().scope == scope)
            .count()
    }

    /// Sends an already-encoded frame to every subscriber of `scope`.
    ///
    /// Returns the number of subscribers that accepted it. Full channels
    /// drop the frame; closed channels are skipped.
    pub fn broadcast(&self, scope: &str, text: &Arc<str>) -> usize {
        let mut delivered = 0;
        for entry in &self.subscribers {
            let handle = entry.value();
            if handle.scope != scope {
                continue;
            }
            if handle.try_send(OutboundMessage::Text(Arc::clone(text))) {
                delivered += 1;
            } else if handle.is_connected() {
                debug!(subscriber = handle.id.0, scope, "subscriber backlog full, dropping message");
                metrics::counter!("opwatch_messages_dropped_total").increment(1);
            }
        }
        delivered
    }

    /// Removes and returns all subscribers. Used during graceful shutdown.
    pub fn drain_all(&self) -> Vec<Arc<SubscriberHandle>> {
        let keys: Vec<SubscriberId> = self
            .subscribers
            .iter()
            .map(|entry| *entry.key())
            .collect();

        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, handle)) = self.subscribers.remove(&key) {
                handles.push(handle);
            }
        }
        metrics::gauge!("opwatch_subscribers").set(0.0);
        handles
    }
}

impl Default for ScopeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressPublisher for ScopeHub {
    fn publish(&self, scope: &str, message: &ServerMessage) -> Result<(), PublishError> {
        let text: Arc<str> = message.to_json()?.into();
        let delivered = self.broadcast(scope, &text);
        metrics::counter!("opwatch_messages_published_total").increment(delivered as u64);
        Ok(())
    }
}
