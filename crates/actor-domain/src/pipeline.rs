//! # Invocation Pipeline
//!
//! Every method call on an actor goes through [`intercept`]:
//!
//! ```text
//! PENDING_LOCK ──▶ RUNNING ──▶ APPLYING ──▶ COMMITTED
//!                     │
//!                     └──▶ ROLLING_BACK ──▶ FAILED
//! ```
//!
//! 1. Unknown method names are rejected before anything else happens.
//! 2. The call waits while another key holds the actor's business lock.
//! 3. The run gate for the call's lock scope is taken, unless the saga already
//!    holds it (re-entrant call).
//! 4. The body runs with a [`Service`]. If it applied nothing, an event named
//!    after the method is applied with an empty payload.
//! 5. A root call commits the saga; a failing call rolls it back.
//!
//! The module also defines [`ActorRepository`], the type-erased face of a
//! [`Repository`] that the domain keeps in its registry.

use crate::actor::LockData;
use crate::domain::Domain;
use crate::entity::ActorEntity;
use crate::error::{DomainError, DomainResult, StorageError};
use crate::event::ActorId;
use crate::handle::ActorView;
use crate::history::HistoryCursor;
use crate::repository::{Repository, RepositoryEvent};
use crate::saga::SagaContext;
use crate::service::Service;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Repository operations the domain needs without knowing the actor type.
#[async_trait]
pub trait ActorRepository: Send + Sync {
    fn actor_type(&self) -> &'static str;

    /// Runs the pre-create hook and creates an actor from JSON params.
    async fn create_json(&self, domain: &Domain, data: Value) -> DomainResult<ActorId>;

    /// Whether the actor exists, loading it into the cache if needed.
    async fn contains(&self, id: &str) -> DomainResult<bool>;

    async fn view(&self, id: &str) -> DomainResult<ActorView>;

    async fn invoke(
        &self,
        domain: &Domain,
        id: &str,
        method: &str,
        args: Vec<Value>,
        saga: Option<SagaContext>,
        key: Option<String>,
    ) -> DomainResult<Value>;

    async fn trigger(
        &self,
        domain: &Domain,
        id: &str,
        tag: &str,
        saga: Option<SagaContext>,
    ) -> DomainResult<()>;

    async fn lock(&self, id: &str, data: &LockData) -> DomainResult<bool>;

    async fn unlock(&self, id: &str, key: &str) -> DomainResult<bool>;

    async fn is_locked(&self, id: &str, key: Option<&str>) -> DomainResult<bool>;

    fn clear(&self, id: &str);

    fn exist(&self, id: &str) -> bool;

    fn cache_ids(&self) -> Vec<ActorId>;

    async fn history(&self, id: &str) -> DomainResult<HistoryCursor>;

    /// Commit step for one actor touched by the finished saga `saga_id`.
    async fn commit(&self, id: &str, saga_id: &str) -> DomainResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent>;
}

#[async_trait]
impl<A: ActorEntity> ActorRepository for Repository<A> {
    fn actor_type(&self) -> &'static str {
        A::TYPE
    }

    async fn create_json(&self, domain: &Domain, data: Value) -> DomainResult<ActorId> {
        let params: A::Create = serde_json::from_value(data)
            .map_err(|e| DomainError::InvalidArgument(format!("{} create params: {e}", A::TYPE)))?;
        let params = A::create_before(params, domain)
            .await
            .map_err(DomainError::business)?;
        let cell = self.create(params).await?;
        Ok(cell.id().to_string())
    }

    async fn contains(&self, id: &str) -> DomainResult<bool> {
        Ok(self.get(id).await?.is_some())
    }

    async fn view(&self, id: &str) -> DomainResult<ActorView> {
        let cell = self
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::TYPE, id))?;
        Ok(ActorView {
            id: id.to_string(),
            actor_type: A::TYPE.to_string(),
            version: A::VERSION.to_string(),
            tags: A::tags().iter().map(|t| t.to_string()).collect(),
            methods: A::methods().iter().map(|m| m.to_string()).collect(),
            data: cell.json().map_err(StorageError::from)?,
        })
    }

    async fn invoke(
        &self,
        domain: &Domain,
        id: &str,
        method: &str,
        args: Vec<Value>,
        saga: Option<SagaContext>,
        key: Option<String>,
    ) -> DomainResult<Value> {
        intercept(self, domain, id, method, args, saga, key).await
    }

    async fn trigger(
        &self,
        domain: &Domain,
        id: &str,
        tag: &str,
        saga: Option<SagaContext>,
    ) -> DomainResult<()> {
        trigger(self, domain, id, tag, saga).await
    }

    async fn lock(&self, id: &str, data: &LockData) -> DomainResult<bool> {
        let cell = self
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::TYPE, id))?;
        Ok(cell.lock(data, self.config().lock_timeout()))
    }

    async fn unlock(&self, id: &str, key: &str) -> DomainResult<bool> {
        let cell = self
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::TYPE, id))?;
        Ok(cell.unlock(key))
    }

    async fn is_locked(&self, id: &str, key: Option<&str>) -> DomainResult<bool> {
        let cell = self
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::TYPE, id))?;
        Ok(cell.is_locked(key))
    }

    fn clear(&self, id: &str) {
        Repository::clear(self, id)
    }

    fn exist(&self, id: &str) -> bool {
        Repository::exist(self, id)
    }

    fn cache_ids(&self) -> Vec<ActorId> {
        self.get_cache_actor_ids()
    }

    async fn history(&self, id: &str) -> DomainResult<HistoryCursor> {
        self.get_history(id).await
    }

    async fn commit(&self, id: &str, saga_id: &str) -> DomainResult<()> {
        self.snapshot_if_due(id, saga_id).await.map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        Repository::subscribe(self)
    }
}

/// Runs one method call on actor `id`.
#[tracing::instrument(
    name = "invoke",
    skip(repo, domain, args, saga),
    fields(actor_type = A::TYPE, saga_id = tracing::field::Empty)
)]
pub async fn intercept<A: ActorEntity>(
    repo: &Repository<A>,
    domain: &Domain,
    id: &str,
    method: &str,
    args: Vec<Value>,
    saga: Option<SagaContext>,
    key: Option<String>,
) -> DomainResult<Value> {
    if !A::methods().contains(&method) {
        return Err(DomainError::UnknownMethod {
            actor_type: A::TYPE.to_string(),
            method: method.to_string(),
        });
    }

    let root = saga.is_none();
    let saga = saga.unwrap_or_default();
    tracing::Span::current().record("saga_id", saga.id());

    // A rollback may evict the cell while we wait on its gate; the next
    // holder must then start over on the rebuilt cell.
    let (cell, _gate) = loop {
        let cell = repo
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(A::TYPE, id))?;
        debug!(state = "PENDING_LOCK");
        cell.wait_unlocked(key.as_deref(), domain.config().lock_poll_interval())
            .await;
        let gate = saga
            .enter(A::TYPE, id, key.as_deref(), cell.gate(key.as_deref()))
            .await;
        if gate.is_reentrant() || repo.is_current(&cell) {
            break (cell, gate);
        }
        debug!("Actor evicted while waiting, reloading");
    };

    debug!(state = "RUNNING");
    let svc = Service::new(domain.clone(), cell, method, saga.clone(), key);
    let outcome = async {
        let value = A::invoke(&svc, method, args)
            .await
            .map_err(DomainError::business)?;
        debug!(state = "APPLYING");
        if !svc.applied() {
            svc.apply(method, Value::Object(Map::new())).await?;
        }
        Ok::<_, DomainError>(value)
    }
    .await;

    match outcome {
        Ok(value) => {
            if root {
                domain.commit_saga(&saga).await;
            }
            debug!(state = "COMMITTED");
            Ok(value)
        }
        Err(error) => {
            warn!(%error, state = "ROLLING_BACK", "Method failed");
            let error = domain.rollback_saga(&saga, error).await;
            debug!(state = "FAILED");
            Err(error)
        }
    }
}

/// Applies tag event `tag` to actor `id` without taking the run gate.
///
/// The tag commits on its own even while other sagas are running on the actor;
/// the snapshot it may trigger waits until those sagas settle.
pub async fn trigger<A: ActorEntity>(
    repo: &Repository<A>,
    domain: &Domain,
    id: &str,
    tag: &str,
    saga: Option<SagaContext>,
) -> DomainResult<()> {
    if !A::tags().contains(&tag) {
        return Err(DomainError::UnknownMethod {
            actor_type: A::TYPE.to_string(),
            method: tag.to_string(),
        });
    }
    let cell = repo
        .get(id)
        .await?
        .ok_or_else(|| DomainError::not_found(A::TYPE, id))?;

    let root = saga.is_none();
    let saga = saga.unwrap_or_default();
    let svc = Service::new(domain.clone(), cell, tag, saga.clone(), None);
    match svc.apply(tag, Value::Null).await {
        Ok(_) => {
            if root {
                domain.commit_saga(&saga).await;
            }
            info!(actor_type = A::TYPE, %id, tag, "Triggered");
            Ok(())
        }
        Err(error) => Err(domain.rollback_saga(&saga, error).await),
    }
}
