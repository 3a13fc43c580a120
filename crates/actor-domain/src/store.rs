//! # Event Store
//!
//! The persistence seam. The domain only needs append/read of events and snapshots
//! per actor, plus removal of a saga's events for rollback. [`InMemoryEventStore`] is
//! the process-local default; durable backends implement [`EventStore`].

use crate::error::StorageError;
use crate::event::{Event, Snap};
use async_trait::async_trait;
use parking_lot::RwLock;

/// Durable append-only event log plus periodic snapshots, keyed by actor id.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    async fn create_snap(&self, snap: &Snap) -> Result<(), StorageError>;

    /// The most recently created snapshot of the actor.
    async fn get_latest_snapshot(&self, actor_id: &str) -> Result<Option<Snap>, StorageError>;

    /// Events of the snapshot's actor recorded after it, ordered by index.
    async fn get_events_by_snapshot(&self, snap_id: &str) -> Result<Vec<Event>, StorageError>;

    /// The `ordinal`-th snapshot of the actor (0 is the creation snapshot).
    async fn get_snapshot_by_index(
        &self,
        actor_id: &str,
        ordinal: usize,
    ) -> Result<Option<Snap>, StorageError>;

    /// Every event of the actor, ordered by index.
    async fn get_events(&self, actor_id: &str) -> Result<Vec<Event>, StorageError>;

    async fn save_events(&self, events: &[Event]) -> Result<(), StorageError>;

    /// Removes every event of the saga and returns what was removed.
    async fn remove_events_by_saga(&self, saga_id: &str) -> Result<Vec<Event>, StorageError>;
}

/// Process-local store.
///
/// Nothing survives the process; the store is meant for tests, demos and
/// single-node setups where the store is rebuilt on start.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    snaps: RwLock<Vec<Snap>>,
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn snapshot_count(&self, actor_id: &str) -> usize {
        self.snaps
            .read()
            .iter()
            .filter(|s| s.actor_id == actor_id)
            .count()
    }

    fn events_from(&self, actor_id: &str, from: u64) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .iter()
            .filter(|e| e.actor_id == actor_id && e.index >= from)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.index);
        events
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create_snap(&self, snap: &Snap) -> Result<(), StorageError> {
        self.snaps.write().push(snap.clone());
        Ok(())
    }

    async fn get_latest_snapshot(&self, actor_id: &str) -> Result<Option<Snap>, StorageError> {
        Ok(self
            .snaps
            .read()
            .iter()
            .rev()
            .find(|s| s.actor_id == actor_id)
            .cloned())
    }

    async fn get_events_by_snapshot(&self, snap_id: &str) -> Result<Vec<Event>, StorageError> {
        let (actor_id, from) = {
            let snaps = self.snaps.read();
            let snap = snaps
                .iter()
                .find(|s| s.id == snap_id)
                .ok_or_else(|| StorageError::SnapshotNotFound(snap_id.to_string()))?;
            (snap.actor_id.clone(), snap.index)
        };
        Ok(self.events_from(&actor_id, from))
    }

    async fn get_snapshot_by_index(
        &self,
        actor_id: &str,
        ordinal: usize,
    ) -> Result<Option<Snap>, StorageError> {
        Ok(self
            .snaps
            .read()
            .iter()
            .filter(|s| s.actor_id == actor_id)
            .nth(ordinal)
            .cloned())
    }

    async fn get_events(&self, actor_id: &str) -> Result<Vec<Event>, StorageError> {
        Ok(self.events_from(actor_id, 0))
    }

    async fn save_events(&self, events: &[Event]) -> Result<(), StorageError> {
        self.events.write().extend(events.iter().cloned());
        Ok(())
    }

    async fn remove_events_by_saga(&self, saga_id: &str) -> Result<Vec<Event>, StorageError> {
        let mut events = self.events.write();
        let (removed, kept): (Vec<Event>, Vec<Event>) =
            events.drain(..).partition(|e| e.saga_id == saga_id);
        *events = kept;
        Ok(removed)
    }
}
