//! # Events and Snapshots
//!
//! The persisted records of the domain. An [`Event`] is an immutable fact about one
//! actor; a [`Snap`] is the compacted state of an actor after `index` events.
//! Replaying the events recorded after a snapshot onto that snapshot reproduces the
//! actor exactly (see [`crate::rehydrate`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable, opaque actor identifier assigned at creation.
pub type ActorId = String;

/// An immutable fact recorded against one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub actor_id: ActorId,
    pub actor_type: String,
    /// Correlates every event produced while serving one top-level invocation.
    pub saga_id: String,
    /// Per-actor sequence number, starting at 0.
    pub index: u64,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        actor_type: impl Into<String>,
        actor_id: impl Into<ActorId>,
        saga_id: impl Into<String>,
        index: u64,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id: actor_id.into(),
            actor_type: actor_type.into(),
            saga_id: saga_id.into(),
            index,
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// A point-in-time serialization of an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snap {
    pub id: String,
    pub actor_id: ActorId,
    pub actor_type: String,
    /// Code version of the actor type when the snapshot was taken.
    pub actor_version: String,
    pub state: Value,
    /// Number of events already folded into `state`.
    pub index: u64,
    pub created_at: DateTime<Utc>,
}

impl Snap {
    pub fn new(
        actor_type: impl Into<String>,
        actor_id: impl Into<ActorId>,
        actor_version: impl Into<String>,
        state: Value,
        index: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id: actor_id.into(),
            actor_type: actor_type.into(),
            actor_version: actor_version.into(),
            state,
            index,
            created_at: Utc::now(),
        }
    }
}

/// Selects published events for `on`/`once`/`subscribe`.
///
/// ```rust
/// use actor_domain::EventPattern;
///
/// let any_increment = EventPattern::from("increment");
/// let one_counter = EventPattern::new("increment").actor_type("Counter").actor_id("c1");
/// assert_ne!(any_increment, one_counter);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventPattern {
    /// `None` matches every event type.
    pub event_type: Option<String>,
    pub actor_type: Option<String>,
    pub actor_id: Option<ActorId>,
}

impl EventPattern {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            ..Self::default()
        }
    }

    /// Matches every event.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn actor_type(mut self, actor_type: impl Into<String>) -> Self {
        self.actor_type = Some(actor_type.into());
        self
    }

    pub fn actor_id(mut self, actor_id: impl Into<ActorId>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.event_type.as_deref().map_or(true, |t| t == event.event_type)
            && self.actor_type.as_deref().map_or(true, |t| t == event.actor_type)
            && self.actor_id.as_deref().map_or(true, |id| id == event.actor_id)
    }
}

impl From<&str> for EventPattern {
    fn from(event_type: &str) -> Self {
        Self::new(event_type)
    }
}
