//! Event fanout broker
//!
//! Every observer session owns a bounded queue. [`EventBroker::broadcast`]
//! serializes a payload once and offers it to each queue without waiting: a
//! full queue means that subscriber misses this payload, nobody else is
//! affected. Delivery is at-most-once with per-subscriber FIFO order.

use serde::Serialize;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default per-subscriber queue depth
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// A serialized JSON payload shared by every queue it was offered to
pub type Payload = Arc<str>;

type Registry = HashMap<Uuid, mpsc::Sender<Payload>>;

#[derive(Debug)]
struct BrokerInner {
    subscribers: RwLock<Registry>,
    capacity: usize,
}

impl BrokerInner {
    // Registry updates are single insert/remove calls, so a poisoned lock
    // still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, id: &Uuid) {
        let mut subscribers = self.write();
        if subscribers.remove(id).is_some() {
            info!(
                subscriber = %id,
                subscribers = subscribers.len(),
                "Observer disconnected"
            );
        }
    }
}

/// Registry of observer sessions with non-blocking multicast
///
/// Cheap to clone; clones share one registry.
#[derive(Debug, Clone)]
pub struct EventBroker {
    inner: Arc<BrokerInner>,
}

impl EventBroker {
    /// Create a broker whose subscribers each get a queue of `capacity` payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                subscribers: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new observer session
    ///
    /// The returned [`Subscription`] deregisters itself when dropped, so a
    /// session ending on any path releases its queue.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.capacity);

        let mut subscribers = self.inner.write();
        subscribers.insert(id, tx);
        info!(
            subscriber = %id,
            subscribers = subscribers.len(),
            "Observer connected"
        );

        Subscription {
            id,
            rx,
            broker: Arc::clone(&self.inner),
            active: true,
        }
    }

    /// Serialize `payload` once and offer it to every registered subscriber
    ///
    /// Never blocks. Returns how many subscribers accepted the payload. If
    /// serialization fails nobody receives it and the failure is logged.
    pub fn broadcast<T: Serialize + ?Sized>(&self, payload: &T) -> usize {
        let data: Payload = match serde_json::to_string(payload) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast payload");
                return 0;
            }
        };
        self.broadcast_raw(data)
    }

    /// Offer an already serialized payload to every registered subscriber
    pub fn broadcast_raw(&self, data: Payload) -> usize {
        let subscribers = self.inner.read();
        let mut delivered = 0;

        for (id, tx) in subscribers.iter() {
            match tx.try_send(Arc::clone(&data)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = %id, "Subscriber queue full, dropping payload");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = %id, "Subscriber queue closed");
                }
            }
        }

        delivered
    }

    /// Deregister a session; equivalent to [`Subscription::unsubscribe`]
    ///
    /// A subscription issued by another broker is left untouched.
    pub fn unsubscribe(&self, subscription: &mut Subscription) {
        if !Arc::ptr_eq(&self.inner, &subscription.broker) {
            warn!(subscriber = %subscription.id, "Subscription belongs to another broker");
            return;
        }
        subscription.unsubscribe();
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().len()
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

/// One observer's handle on the broker
///
/// Yields queued payloads in broadcast order. Implements [`Stream`] so it can
/// feed an SSE response directly.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<Payload>,
    broker: Arc<BrokerInner>,
    active: bool,
}

impl Subscription {
    /// Session ID, used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next payload; `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Take the next payload if one is queued
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }

    /// Deregister from the broker and close the queue. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.rx.close();
        self.broker.remove(&self.id);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Stream for Subscription {
    type Item = Payload;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Payload>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
