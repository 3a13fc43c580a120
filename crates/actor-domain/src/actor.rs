//! # Live Actor Cell
//!
//! This module defines [`ActorCell`], the in-memory home of one live actor. The
//! repository caches cells; handles never hold them.
//!
//! A cell carries three independent pieces of state:
//!
//! - the entity plus the index of the next event, behind a short-lived `RwLock`
//!   that is never held across an `.await`;
//! - the business lock ([`LockData`]), a keyed, expiring token that makes calls
//!   with a different key wait;
//! - one run gate per lock scope, an async mutex held for the whole method body so
//!   that two calls in the same scope never run concurrently.

use crate::entity::EventSourced;
use crate::event::{ActorId, Event};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Request to take an actor's lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockData {
    pub key: String,
    /// Falls back to `DomainConfig::lock_timeout` when `None`.
    pub timeout: Option<Duration>,
}

impl LockData {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
struct LockState {
    key: String,
    acquired_at: DateTime<Utc>,
    expires_at: Instant,
}

struct Live<A> {
    entity: A,
    next_index: u64,
    /// Sagas with events folded into `entity` that are not committed yet.
    open_sagas: HashSet<String>,
}

/// One live actor.
pub struct ActorCell<A: EventSourced> {
    id: ActorId,
    live: RwLock<Live<A>>,
    snapshot_index: AtomicU64,
    lock: Mutex<Option<LockState>>,
    released: Notify,
    gates: Mutex<HashMap<Option<String>, Arc<tokio::sync::Mutex<()>>>>,
}

impl<A: EventSourced> ActorCell<A> {
    /// `next_index` is the index the next event will get; `snapshot_index` is the
    /// index stored in the snapshot the cell was built from.
    pub fn new(id: impl Into<ActorId>, entity: A, next_index: u64, snapshot_index: u64) -> Self {
        Self {
            id: id.into(),
            live: RwLock::new(Live {
                entity,
                next_index,
                open_sagas: HashSet::new(),
            }),
            snapshot_index: AtomicU64::new(snapshot_index),
            lock: Mutex::new(None),
            released: Notify::new(),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn next_index(&self) -> u64 {
        self.live.read().next_index
    }

    /// Reads the entity without cloning it.
    pub fn view<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.live.read().entity)
    }

    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.live.read().entity)
    }

    /// Serialized state together with the index it corresponds to.
    ///
    /// `None` while any saga still has uncommitted events folded into the state.
    pub(crate) fn snapshot_state(
        &self,
    ) -> Result<Option<(serde_json::Value, u64)>, serde_json::Error> {
        let live = self.live.read();
        if !live.open_sagas.is_empty() {
            return Ok(None);
        }
        Ok(Some((serde_json::to_value(&live.entity)?, live.next_index)))
    }

    /// Builds the next event with `make(index)` and folds it in, atomically.
    /// The event stays uncommitted until [`ActorCell::settle`] is called for `saga_id`.
    pub(crate) fn fold(&self, saga_id: &str, make: impl FnOnce(u64) -> Event) -> Event {
        let mut live = self.live.write();
        let event = make(live.next_index);
        live.entity.when(&event);
        live.next_index += 1;
        if !live.open_sagas.contains(saga_id) {
            live.open_sagas.insert(saga_id.to_string());
        }
        event
    }

    /// Marks the events of `saga_id` as committed.
    pub(crate) fn settle(&self, saga_id: &str) {
        self.live.write().open_sagas.remove(saga_id);
    }

    /// Whether some saga has uncommitted events in this cell.
    pub fn has_open_sagas(&self) -> bool {
        !self.live.read().open_sagas.is_empty()
    }

    /// Whether at least `interval` events were folded past the last snapshot.
    pub(crate) fn snapshot_due(&self, interval: u64) -> bool {
        interval > 0
            && self.next_index() >= self.snapshot_index.load(Ordering::Acquire) + interval
    }

    pub(crate) fn mark_snapshot(&self, index: u64) {
        self.snapshot_index.store(index, Ordering::Release);
    }

    // --- Business lock ---

    /// Takes the lock. Succeeds when free, expired, or already held by the same key.
    pub fn lock(&self, data: &LockData, default_timeout: Duration) -> bool {
        let mut lock = self.lock.lock();
        let now = Instant::now();
        match lock.as_ref() {
            Some(held) if held.key != data.key && held.expires_at > now => false,
            _ => {
                *lock = Some(LockState {
                    key: data.key.clone(),
                    acquired_at: Utc::now(),
                    expires_at: now + data.timeout.unwrap_or(default_timeout),
                });
                debug!(id = %self.id, key = %data.key, "Locked");
                true
            }
        }
    }

    /// Releases the lock when `key` holds it.
    pub fn unlock(&self, key: &str) -> bool {
        let mut lock = self.lock.lock();
        if lock.as_ref().is_some_and(|held| held.key == key) {
            *lock = None;
            drop(lock);
            debug!(id = %self.id, key, "Unlocked");
            self.released.notify_waiters();
            true
        } else {
            false
        }
    }

    /// True when another key holds an unexpired lock.
    pub fn is_locked(&self, key: Option<&str>) -> bool {
        let mut lock = self.lock.lock();
        match lock.as_ref() {
            Some(held) if held.expires_at <= Instant::now() => {
                *lock = None;
                false
            }
            Some(held) => key != Some(held.key.as_str()),
            None => false,
        }
    }

    /// Key and acquisition time of the current holder, if any.
    pub fn lock_holder(&self) -> Option<(String, DateTime<Utc>)> {
        self.lock
            .lock()
            .as_ref()
            .filter(|held| held.expires_at > Instant::now())
            .map(|held| (held.key.clone(), held.acquired_at))
    }

    /// Waits until [`ActorCell::is_locked`] is false for `key`.
    ///
    /// Wakes on `unlock` and otherwise re-checks every `poll` (which also
    /// catches expiry). Waits without bound.
    pub async fn wait_unlocked(&self, key: Option<&str>, poll: Duration) {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if !self.is_locked(key) {
                return;
            }
            debug!(id = %self.id, ?key, "Lock held, waiting");
            tokio::select! {
                _ = &mut released => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Run gate for one lock scope.
    pub(crate) fn gate(&self, key: Option<&str>) -> Arc<tokio::sync::Mutex<()>> {
        self.gates
            .lock()
            .entry(key.map(str::to_string))
            .or_default()
            .clone()
    }
}
