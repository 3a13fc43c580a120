//! # Rehydration
//!
//! Rebuilds an actor from a snapshot plus the events recorded after it. This is the
//! single definition of "what the actor looks like after N events": the repository,
//! the version upgrade and the history cursor all go through it.

use crate::entity::EventSourced;
use crate::error::StorageError;
use crate::event::{Event, Snap};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Type-erased replay, used for historical versions and history cursors.
pub type ReplayFn = fn(&Snap, &[Event]) -> Result<Value, StorageError>;

/// Parses `snap.state` as `A` and folds `events` in index order.
///
/// Events below `snap.index` are already part of the snapshot and are skipped.
/// Returns the actor and the index of the next event it expects.
pub fn rehydrate<A: EventSourced>(snap: &Snap, events: &[Event]) -> Result<(A, u64), StorageError> {
    let mut actor: A = serde_json::from_value(snap.state.clone())?;
    let mut ordered: Vec<&Event> = events.iter().filter(|e| e.index >= snap.index).collect();
    ordered.sort_by_key(|e| e.index);

    let mut next = snap.index;
    for event in ordered {
        actor.when(event);
        next = event.index + 1;
    }
    Ok((actor, next))
}

/// [`rehydrate`] returning the serialized state.
pub fn rehydrate_json<A: EventSourced>(snap: &Snap, events: &[Event]) -> Result<Value, StorageError> {
    let (actor, _) = rehydrate::<A>(snap, events)?;
    Ok(serde_json::to_value(&actor)?)
}

/// Replay functions of historical actor versions, keyed by type then version.
#[derive(Default)]
pub struct OldClassRegistry {
    classes: RwLock<HashMap<String, HashMap<String, ReplayFn>>>,
}

impl OldClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: EventSourced>(&self) {
        self.classes
            .write()
            .entry(A::TYPE.to_string())
            .or_default()
            .insert(A::VERSION.to_string(), rehydrate_json::<A>);
    }

    pub fn lookup(&self, actor_type: &str, version: &str) -> Option<ReplayFn> {
        self.classes
            .read()
            .get(actor_type)
            .and_then(|versions| versions.get(version))
            .copied()
    }
}
