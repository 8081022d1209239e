//! Subscription hub: fans committed events out to watchers.
//!
//! The hub does not serialize anything by itself. [`SubscriptionHub::publish`]
//! must be called while the store's write guard is held and
//! [`SubscriptionHub::register`] while at least its read guard is held; that
//! shared exclusion is what makes "snapshot, then every later event" exact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::audit::StoreAuditLogger;
use crate::config::{Backpressure, StoreConfig};

use super::error::StoreError;
use super::event::{Event, WatchEvent};

type SubscriberMap = HashMap<u64, Subscriber>;

pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: StoreConfig,
    audit: Arc<StoreAuditLogger>,
    subscribers: Mutex<SubscriberMap>,
    next_subscriber: AtomicU64,
    /// Set by `close`; later registrations end immediately.
    closed: AtomicBool,
    /// Index of the last published event, 0 before the first.
    last_index: AtomicU64,
}

impl HubInner {
    fn subscribers(&self) -> MutexGuard<'_, SubscriberMap> {
        // A panic while holding the lock cannot leave the map half-updated
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Subscriber {
    tx: SubscriberTx,
    overflowed: Arc<AtomicBool>,
}

enum SubscriberTx {
    Bounded(mpsc::Sender<WatchEvent>),
    Unbounded(mpsc::UnboundedSender<WatchEvent>),
}

enum SubscriberRx {
    Bounded(mpsc::Receiver<WatchEvent>),
    Unbounded(mpsc::UnboundedReceiver<WatchEvent>),
}

enum Delivery {
    Queued,
    Full,
    Closed,
}

impl SubscriberTx {
    fn deliver(&self, event: WatchEvent) -> Delivery {
        match self {
            SubscriberTx::Bounded(tx) => match tx.try_send(event) {
                Ok(()) => Delivery::Queued,
                Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
                Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
            },
            SubscriberTx::Unbounded(tx) => match tx.send(event) {
                Ok(()) => Delivery::Queued,
                Err(_) => Delivery::Closed,
            },
        }
    }
}

impl SubscriberRx {
    async fn recv(&mut self) -> Option<WatchEvent> {
        match self {
            SubscriberRx::Bounded(rx) => rx.recv().await,
            SubscriberRx::Unbounded(rx) => rx.recv().await,
        }
    }
}

impl SubscriptionHub {
    pub fn new(config: StoreConfig, audit: Arc<StoreAuditLogger>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                audit,
                subscribers: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                last_index: AtomicU64::new(0),
            }),
        }
    }

    /// Index of the last published event.
    pub fn last_index(&self) -> u64 {
        self.inner.last_index.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }

    /// Attach a new subscriber that receives every event published after
    /// this call.
    pub fn register(&self) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let overflowed = Arc::new(AtomicBool::new(false));

        let (tx, rx) = match self.inner.config.backpressure {
            Backpressure::Disconnect => {
                let (tx, rx) = mpsc::channel(self.inner.config.subscriber_buffer.max(1));
                (SubscriberTx::Bounded(tx), SubscriberRx::Bounded(rx))
            }
            Backpressure::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (SubscriberTx::Unbounded(tx), SubscriberRx::Unbounded(rx))
            }
        };

        if self.inner.closed.load(Ordering::Acquire) {
            // Dropping `tx` here ends the subscription on its first recv
            debug!(subscriber = id, "Hub closed, subscription ends immediately");
        } else {
            self.inner.subscribers().insert(
                id,
                Subscriber {
                    tx,
                    overflowed: overflowed.clone(),
                },
            );
            debug!(subscriber = id, "Subscriber registered");
        }

        Subscription {
            id,
            rx,
            overflowed,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Assign the next indices to `events` and queue them for every
    /// subscriber. Returns the index of the last event published.
    pub fn publish(&self, events: Vec<Event>) -> u64 {
        let mut subscribers = self.inner.subscribers();
        let mut index = self.last_index();

        for event in events {
            index += 1;
            let mut dropped = Vec::new();

            for (id, subscriber) in subscribers.iter() {
                let watch_event = WatchEvent {
                    index,
                    event: event.clone(),
                };
                match subscriber.tx.deliver(watch_event) {
                    Delivery::Queued => {}
                    Delivery::Full => {
                        subscriber.overflowed.store(true, Ordering::Release);
                        dropped.push((*id, true));
                    }
                    Delivery::Closed => dropped.push((*id, false)),
                }
            }

            for (id, overflowed) in dropped {
                subscribers.remove(&id);
                if overflowed {
                    warn!(subscriber = id, index, "Subscriber queue full, disconnecting");
                    self.inner.audit.subscriber_dropped(id, index);
                } else {
                    debug!(subscriber = id, "Subscriber gone, removing");
                }
            }
        }

        self.inner.last_index.store(index, Ordering::Release);
        index
    }

    /// Deregister every subscriber. Their streams drain what is already
    /// queued and then end without error.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let dropped = std::mem::take(&mut *self.inner.subscribers());
        debug!(subscribers = dropped.len(), "Subscription hub closed");
    }
}

/// A registered watcher. Dropping it deregisters it from the hub.
pub struct Subscription {
    id: u64,
    rx: SubscriberRx,
    overflowed: Arc<AtomicBool>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event in commit order.
    ///
    /// Returns `Some(Err(ResourceExhausted))` once, after the queued events,
    /// if the hub disconnected this subscriber on overflow; `None` when the
    /// hub has shut down.
    pub async fn recv(&mut self) -> Option<Result<WatchEvent, StoreError>> {
        match self.rx.recv().await {
            Some(event) => Some(Ok(event)),
            None if self.overflowed.swap(false, Ordering::AcqRel) => {
                Some(Err(StoreError::ResourceExhausted(format!(
                    "subscriber {} fell behind and was disconnected",
                    self.id
                ))))
            }
            None => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade()
            && hub.subscribers().remove(&self.id).is_some()
        {
            debug!(subscriber = self.id, "Subscriber deregistered");
        }
    }
}
