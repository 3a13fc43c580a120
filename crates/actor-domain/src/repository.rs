//! # Repository
//!
//! One [`Repository`] per actor type. It owns the live cache, writes every
//! snapshot of its type and is the only place actors are rebuilt from storage.
//!
//! ## Lookup order
//!
//! 1. the cache;
//! 2. the latest snapshot plus the events after it, upgraded first when the
//!    snapshot was written by an older version of the type.
//!
//! A rebuilt cell is cached, so every caller of the same id shares one cell and
//! therefore one set of run gates. Only current-version cells are ever cached.
//! A rebuild that overlaps a [`Repository::clear`] is discarded and loaded
//! again, so a cell read before a rollback removed its events is never cached.
//!
//! ## Snapshots
//!
//! A snapshot is only written from a cell with no uncommitted saga folded in.
//!
//! ## Notifications
//!
//! Observers get [`RepositoryEvent`]s on a broadcast channel. Sending never waits
//! for receivers; a lagging receiver loses the oldest notifications.

use crate::actor::ActorCell;
use crate::config::DomainConfig;
use crate::entity::ActorEntity;
use crate::error::{DomainError, DomainResult, StorageError};
use crate::event::{ActorId, Event, Snap};
use crate::history::HistoryCursor;
use crate::rehydrate::{rehydrate, rehydrate_json, OldClassRegistry};
use crate::store::EventStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Cache lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEvent {
    Created(ActorId),
    /// The actor was rebuilt from storage into the cache.
    Reborn(ActorId),
    Cleared(ActorId),
}

pub struct Repository<A: ActorEntity> {
    store: Arc<dyn EventStore>,
    old_classes: Arc<OldClassRegistry>,
    config: DomainConfig,
    cache: RwLock<HashMap<ActorId, Arc<ActorCell<A>>>>,
    /// Bumped under the cache write lock by every `clear`.
    clears: AtomicU64,
    notifications: broadcast::Sender<RepositoryEvent>,
}

impl<A: ActorEntity> Repository<A> {
    pub fn new(
        store: Arc<dyn EventStore>,
        old_classes: Arc<OldClassRegistry>,
        config: DomainConfig,
    ) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            store,
            old_classes,
            config,
            cache: RwLock::new(HashMap::new()),
            clears: AtomicU64::new(0),
            notifications,
        }
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    /// Mints an id, writes the creation snapshot and caches the new actor.
    pub async fn create(&self, params: A::Create) -> DomainResult<Arc<ActorCell<A>>> {
        let id = Uuid::new_v4().to_string();
        let entity = A::from_create_params(&id, params).map_err(DomainError::business)?;
        let state = serde_json::to_value(&entity).map_err(StorageError::from)?;
        self.store
            .create_snap(&Snap::new(A::TYPE, id.as_str(), A::VERSION, state, 0))
            .await?;

        let cell = Arc::new(ActorCell::new(id.as_str(), entity, 0, 0));
        self.cache.write().insert(id.clone(), cell.clone());
        info!(actor_type = A::TYPE, %id, "Created");
        let _ = self.notifications.send(RepositoryEvent::Created(id));
        Ok(cell)
    }

    /// Returns the live actor, rebuilding it from storage on a cache miss.
    ///
    /// Every miss sends [`RepositoryEvent::Reborn`] before storage is read.
    /// `None` when no snapshot of this type exists for `id`.
    pub async fn get(&self, id: &str) -> DomainResult<Option<Arc<ActorCell<A>>>> {
        let cached = self.cache.read().get(id).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        let _ = self.notifications.send(RepositoryEvent::Reborn(id.to_string()));

        loop {
            let clears = self.clears.load(Ordering::Acquire);
            let Some(cell) = self.load(id).await? else {
                return Ok(None);
            };

            let inserted = {
                let mut cache = self.cache.write();
                if let Some(cached) = cache.get(id) {
                    return Ok(Some(cached.clone()));
                }
                if self.clears.load(Ordering::Acquire) == clears {
                    let cell = Arc::new(cell);
                    cache.insert(id.to_string(), cell.clone());
                    Some(cell)
                } else {
                    None
                }
            };
            match inserted {
                Some(cell) => {
                    debug!(actor_type = A::TYPE, %id, "Reborn");
                    return Ok(Some(cell));
                }
                None => debug!(actor_type = A::TYPE, %id, "Cleared during rebuild, reloading"),
            }
        }
    }

    /// Rebuilds the actor from its latest snapshot and the events after it.
    async fn load(&self, id: &str) -> DomainResult<Option<ActorCell<A>>> {
        let Some(snap) = self.store.get_latest_snapshot(id).await? else {
            return Ok(None);
        };
        if snap.actor_type != A::TYPE {
            return Ok(None);
        }
        let events = self.store.get_events_by_snapshot(&snap.id).await?;

        let cell = if snap.actor_version == A::VERSION {
            let (entity, next) = rehydrate::<A>(&snap, &events)?;
            ActorCell::new(id, entity, next, snap.index)
        } else {
            self.upgrade(&snap, &events).await?
        };
        Ok(Some(cell))
    }

    /// Replays an old-version snapshot with its registered class, converts it
    /// with [`ActorEntity::upgrade`] and persists the result as a new snapshot.
    async fn upgrade(&self, snap: &Snap, events: &[Event]) -> DomainResult<ActorCell<A>> {
        let replay = self
            .old_classes
            .lookup(A::TYPE, &snap.actor_version)
            .ok_or_else(|| {
                DomainError::Upgrade(format!(
                    "no class registered for {} version {}",
                    A::TYPE,
                    snap.actor_version
                ))
            })?;
        let old = replay(snap, events)?;
        let entity = A::upgrade(old).map_err(|e| DomainError::Upgrade(e.to_string()))?;

        let next = events
            .iter()
            .filter(|e| e.index >= snap.index)
            .map(|e| e.index + 1)
            .max()
            .unwrap_or(snap.index);
        let state = serde_json::to_value(&entity).map_err(StorageError::from)?;
        self.store
            .create_snap(&Snap::new(A::TYPE, snap.actor_id.as_str(), A::VERSION, state, next))
            .await?;

        info!(
            actor_type = A::TYPE,
            id = %snap.actor_id,
            from = %snap.actor_version,
            to = A::VERSION,
            "Upgraded"
        );
        Ok(ActorCell::new(snap.actor_id.as_str(), entity, next, next))
    }

    /// Evicts the actor from the cache.
    ///
    /// Rebuilds already in flight are invalidated even when `id` is not cached.
    pub fn clear(&self, id: &str) {
        let mut cache = self.cache.write();
        self.clears.fetch_add(1, Ordering::AcqRel);
        let removed = cache.remove(id).is_some();
        drop(cache);
        if removed {
            debug!(actor_type = A::TYPE, %id, "Cleared");
            let _ = self.notifications.send(RepositoryEvent::Cleared(id.to_string()));
        }
    }

    /// Whether the actor is live in the cache. Does not touch storage.
    pub fn exist(&self, id: &str) -> bool {
        self.cache.read().contains_key(id)
    }

    /// Whether `cell` is still the cached cell for its id.
    pub(crate) fn is_current(&self, cell: &Arc<ActorCell<A>>) -> bool {
        self.cache
            .read()
            .get(cell.id())
            .is_some_and(|cached| Arc::ptr_eq(cached, cell))
    }

    pub fn get_cache_actor_ids(&self) -> Vec<ActorId> {
        self.cache.read().keys().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.notifications.subscribe()
    }

    /// Cursor over the history since the earliest snapshot of the current version.
    pub async fn get_history(&self, id: &str) -> DomainResult<HistoryCursor> {
        // Loading first makes sure an old-version actor has a current snapshot.
        if self.get(id).await?.is_none() {
            return Err(DomainError::not_found(A::TYPE, id));
        }

        let mut ordinal = 0;
        let snap = loop {
            match self.store.get_snapshot_by_index(id, ordinal).await? {
                Some(snap) if snap.actor_version == A::VERSION => break snap,
                Some(_) => ordinal += 1,
                None => return Err(DomainError::not_found(A::TYPE, id)),
            }
        };
        let events = self.store.get_events_by_snapshot(&snap.id).await?;
        Ok(HistoryCursor::new(snap, events, rehydrate_json::<A>)?)
    }

    /// Marks the events of `saga_id` on the actor as committed, then writes a
    /// snapshot when enough events were folded since the last one.
    ///
    /// Skipped while another saga still has uncommitted events in the actor.
    pub async fn snapshot_if_due(&self, id: &str, saga_id: &str) -> DomainResult<bool> {
        let Some(cell) = self.cache.read().get(id).cloned() else {
            return Ok(false);
        };
        cell.settle(saga_id);
        if !cell.snapshot_due(self.config.snapshot_interval) {
            return Ok(false);
        }
        let Some((state, index)) = cell.snapshot_state().map_err(StorageError::from)? else {
            debug!(actor_type = A::TYPE, %id, "Snapshot deferred, saga in flight");
            return Ok(false);
        };
        self.store
            .create_snap(&Snap::new(A::TYPE, id, A::VERSION, state, index))
            .await?;
        cell.mark_snapshot(index);
        debug!(actor_type = A::TYPE, %id, index, "Snapshot written");
        Ok(true)
    }
}
