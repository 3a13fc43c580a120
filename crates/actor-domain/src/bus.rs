//! # Event Bus
//!
//! Persists events, delivers committed ones to subscribers and undoes a saga
//! on failure.
//!
//! Saving and publishing are separate steps: events are saved as they are
//! applied and only published once their saga commits, so subscribers never see
//! an event that is later rolled back.
//!
//! [`DefaultEventBus`] persists through an [`EventStore`] and fans events out to
//! in-process handlers. A networked bus implements the same [`EventBus`] trait.

use crate::error::StorageError;
use crate::event::{Event, EventPattern};
use crate::store::EventStore;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Callback invoked for every matching published event.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identifies a handler registered with [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    /// Persists the event without notifying anyone.
    async fn save(&self, event: &Event) -> Result<(), StorageError>;

    /// Notifies subscribers of an event whose saga has committed.
    async fn publish(&self, event: &Event) -> Result<(), StorageError>;

    /// Removes every event of the saga and returns what was removed.
    async fn rollback(&self, saga_id: &str) -> Result<Vec<Event>, StorageError>;

    fn on(&self, pattern: EventPattern, handler: EventHandler) -> SubscriptionId;

    /// Returns `false` when the id was not registered.
    fn off(&self, id: SubscriptionId) -> bool;

    /// Waits for the next matching event. `None` on timeout.
    async fn once(&self, pattern: EventPattern, timeout: Option<Duration>) -> Option<Event>;
}

struct Subscription {
    id: SubscriptionId,
    pattern: EventPattern,
    handler: EventHandler,
}

/// In-process bus backed by an [`EventStore`].
pub struct DefaultEventBus {
    store: Arc<dyn EventStore>,
    subscriptions: RwLock<Vec<Subscription>>,
    waiters: Mutex<Vec<(EventPattern, oneshot::Sender<Event>)>>,
    next_id: AtomicU64,
}

impl DefaultEventBus {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            subscriptions: RwLock::new(Vec::new()),
            waiters: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn notify(&self, event: &Event) {
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.pattern.matches(event))
            .map(|s| s.handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }

        let mut waiters = self.waiters.lock();
        let pending = std::mem::take(&mut *waiters);
        for (pattern, tx) in pending {
            if tx.is_closed() {
                continue;
            }
            if pattern.matches(event) {
                let _ = tx.send(event.clone());
            } else {
                waiters.push((pattern, tx));
            }
        }
    }
}

#[async_trait]
impl EventBus for DefaultEventBus {
    async fn save(&self, event: &Event) -> Result<(), StorageError> {
        self.store.save_events(std::slice::from_ref(event)).await
    }

    async fn publish(&self, event: &Event) -> Result<(), StorageError> {
        debug!(
            actor_type = %event.actor_type,
            actor_id = %event.actor_id,
            event_type = %event.event_type,
            index = event.index,
            "Published"
        );
        self.notify(event);
        Ok(())
    }

    async fn rollback(&self, saga_id: &str) -> Result<Vec<Event>, StorageError> {
        let removed = self.store.remove_events_by_saga(saga_id).await?;
        info!(saga_id, removed = removed.len(), "Saga rolled back");
        Ok(removed)
    }

    fn on(&self, pattern: EventPattern, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            pattern,
            handler,
        });
        id
    }

    fn off(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    async fn once(&self, pattern: EventPattern, timeout: Option<Duration>) -> Option<Event> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push((pattern, tx));
        match timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await.ok()?.ok(),
            None => rx.await.ok(),
        }
    }
}
