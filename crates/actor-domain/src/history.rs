//! Step-through view of an actor's past states.

use crate::error::StorageError;
use crate::event::{Event, Snap};
use crate::rehydrate::ReplayFn;
use serde_json::Value;

/// Cursor over a snapshot and the events recorded after it.
///
/// `index` counts how many of those events are folded into `data`. A fresh
/// cursor sits at the latest state. A move that would leave `1..=len` is not
/// performed and marks the cursor `done`.
pub struct HistoryCursor {
    snap: Snap,
    events: Vec<Event>,
    replay: ReplayFn,
    index: usize,
    data: Value,
    done: bool,
}

impl std::fmt::Debug for HistoryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryCursor")
            .field("actor_id", &self.snap.actor_id)
            .field("index", &self.index)
            .field("len", &self.events.len())
            .field("done", &self.done)
            .finish()
    }
}

impl HistoryCursor {
    pub fn new(snap: Snap, events: Vec<Event>, replay: ReplayFn) -> Result<Self, StorageError> {
        let data = replay(&snap, &events)?;
        Ok(Self {
            index: events.len(),
            snap,
            events,
            replay,
            data,
            done: false,
        })
    }

    /// Number of events folded into [`HistoryCursor::data`].
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// State after the first `index` events.
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn snapshot(&self) -> &Snap {
        &self.snap
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The event folded last, if any.
    pub fn current_event(&self) -> Option<&Event> {
        self.index.checked_sub(1).and_then(|i| self.events.get(i))
    }

    /// Moves one event forward. Returns whether the cursor moved.
    pub fn next(&mut self) -> Result<bool, StorageError> {
        self.seek(self.index + 1)
    }

    /// Moves one event back. Returns whether the cursor moved.
    pub fn prev(&mut self) -> Result<bool, StorageError> {
        match self.index.checked_sub(1) {
            Some(target) => self.seek(target),
            None => {
                self.done = true;
                Ok(false)
            }
        }
    }

    /// Jumps to the state after `index` events.
    pub fn seek(&mut self, index: usize) -> Result<bool, StorageError> {
        if index < 1 || index > self.events.len() {
            self.done = true;
            return Ok(false);
        }
        self.data = (self.replay)(&self.snap, &self.events[..index])?;
        self.index = index;
        self.done = false;
        Ok(true)
    }
}
