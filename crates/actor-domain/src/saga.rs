//! # Sagas
//!
//! A saga correlates every event produced while serving one top-level call,
//! including the nested calls it makes through its [`Service`](crate::Service).
//! The context travels with handles obtained from the service so nested calls
//! join the saga instead of starting their own.

use crate::domain::Domain;
use crate::event::{ActorId, Event};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

type GateKey = (String, ActorId, Option<String>);

/// An actor touched by the saga, with the node that hosts it.
#[derive(Clone)]
pub(crate) struct Touched {
    pub domain: Domain,
    pub actor_type: String,
    pub id: ActorId,
}

struct SagaInner {
    id: String,
    touched: Mutex<Vec<Touched>>,
    held: Mutex<HashSet<GateKey>>,
    /// Saved events held back from subscribers until the saga commits.
    pending: Mutex<Vec<(Domain, Event)>>,
}

/// Shared state of one saga.
#[derive(Clone)]
pub struct SagaContext {
    inner: Arc<SagaInner>,
}

impl std::fmt::Debug for SagaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaContext").field("id", &self.inner.id).finish()
    }
}

impl SagaContext {
    /// Starts a saga with a fresh id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SagaInner {
                id: id.into(),
                touched: Mutex::new(Vec::new()),
                held: Mutex::new(HashSet::new()),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Records that an event was applied to an actor hosted by `domain`.
    pub(crate) fn touch(&self, domain: &Domain, actor_type: &str, id: &str) {
        let mut touched = self.inner.touched.lock();
        if !touched
            .iter()
            .any(|t| t.domain.is_same(domain) && t.actor_type == actor_type && t.id == id)
        {
            touched.push(Touched {
                domain: domain.clone(),
                actor_type: actor_type.to_string(),
                id: id.to_string(),
            });
        }
    }

    pub(crate) fn touched(&self) -> Vec<Touched> {
        self.inner.touched.lock().clone()
    }

    /// Queues a saved event for publication on `domain`'s bus at commit.
    pub(crate) fn record(&self, domain: &Domain, event: Event) {
        self.inner.pending.lock().push((domain.clone(), event));
    }

    /// Drains the queued events in apply order.
    pub(crate) fn take_pending(&self) -> Vec<(Domain, Event)> {
        std::mem::take(&mut *self.inner.pending.lock())
    }

    /// Takes the run gate for `(actor_type, id, key)` unless this saga already
    /// holds it further up the call stack.
    pub(crate) async fn enter(
        &self,
        actor_type: &str,
        id: &str,
        key: Option<&str>,
        gate: Arc<tokio::sync::Mutex<()>>,
    ) -> GateGuard {
        let entry = (actor_type.to_string(), id.to_string(), key.map(str::to_string));
        if self.inner.held.lock().contains(&entry) {
            return GateGuard {
                release: None,
                _guard: None,
            };
        }
        let guard = gate.lock_owned().await;
        self.inner.held.lock().insert(entry.clone());
        GateGuard {
            release: Some((self.clone(), entry)),
            _guard: Some(guard),
        }
    }
}

impl Default for SagaContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a run gate for the duration of one method body.
pub(crate) struct GateGuard {
    release: Option<(SagaContext, GateKey)>,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl GateGuard {
    pub(crate) fn is_reentrant(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if let Some((saga, entry)) = self.release.take() {
            saga.inner.held.lock().remove(&entry);
        }
    }
}
