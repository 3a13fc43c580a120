//! # Service Context
//!
//! The [`Service`] handed to every method body. It is the only way a method can
//! change its actor: [`Service::apply`] folds an event into the live state and
//! saves it under the current saga. Subscribers hear about it once the saga
//! commits. Handles obtained through the service
//! carry the saga along, so nested calls commit or roll back together.

use crate::actor::ActorCell;
use crate::domain::Domain;
use crate::entity::ActorEntity;
use crate::error::DomainResult;
use crate::event::Event;
use crate::handle::Handle;
use crate::saga::SagaContext;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Per-invocation context bound to one actor, one method and one saga.
pub struct Service<A: ActorEntity> {
    domain: Domain,
    cell: Arc<ActorCell<A>>,
    method: String,
    saga: SagaContext,
    key: Option<String>,
    applied: AtomicBool,
}

impl<A: ActorEntity> Service<A> {
    pub(crate) fn new(
        domain: Domain,
        cell: Arc<ActorCell<A>>,
        method: impl Into<String>,
        saga: SagaContext,
        key: Option<String>,
    ) -> Self {
        Self {
            domain,
            cell,
            method: method.into(),
            saga,
            key,
            applied: AtomicBool::new(false),
        }
    }

    /// Applies an event to the actor and saves it.
    ///
    /// The fold and the index assignment happen under the actor's state lock;
    /// saving happens after it is released. Publication waits for the commit.
    pub async fn apply(&self, event_type: &str, payload: impl Serialize) -> DomainResult<Event> {
        let payload = serde_json::to_value(payload).map_err(crate::error::StorageError::from)?;
        let saga_id = self.saga.id();
        let event = self.cell.fold(saga_id, |index| {
            Event::new(A::TYPE, self.cell.id(), saga_id, index, event_type, payload)
        });
        self.applied.store(true, Ordering::Release);
        self.saga.touch(&self.domain, A::TYPE, self.cell.id());
        debug!(
            actor_type = A::TYPE,
            id = %self.cell.id(),
            event_type,
            index = event.index,
            saga_id,
            "Applied"
        );
        self.domain.bus().save(&event).await?;
        self.saga.record(&self.domain, event.clone());
        Ok(event)
    }

    /// Applies an event named after the running method.
    pub async fn emit(&self, payload: impl Serialize) -> DomainResult<Event> {
        self.apply(&self.method, payload).await
    }

    /// Creates an actor of another (or the same) type.
    ///
    /// Creation is immediate and is not undone if the saga rolls back.
    pub async fn create(&self, actor_type: &str, data: Value) -> DomainResult<Handle> {
        self.domain
            .create_in(actor_type, data, Some(self.saga.clone()))
            .await
    }

    /// Resolves an actor whose calls join this saga.
    pub async fn get(&self, actor_type: &str, id: &str) -> DomainResult<Handle> {
        self.domain
            .resolve(actor_type, id, Some(self.saga.clone()), None)
            .await
    }

    /// Like [`Service::get`], calling with a lock key.
    pub async fn get_with_key(
        &self,
        actor_type: &str,
        id: &str,
        key: impl Into<String>,
    ) -> DomainResult<Handle> {
        self.domain
            .resolve(actor_type, id, Some(self.saga.clone()), Some(key.into()))
            .await
    }

    /// Copy of the current state.
    pub fn state(&self) -> A {
        self.cell.view(A::clone)
    }

    pub fn view<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        self.cell.view(f)
    }

    pub fn id(&self) -> &str {
        self.cell.id()
    }

    pub fn saga_id(&self) -> &str {
        self.saga.id()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Lock key the call runs under.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Whether the body has applied at least one event.
    pub fn applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }
}
