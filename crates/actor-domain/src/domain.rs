//! # Domain
//!
//! The [`Domain`] is the entry point of a node: it owns the repositories of every
//! registered actor type, the historical-version registry, the event store, the
//! bus and the optional cluster resolver. It is cheap to clone; all clones share
//! the same node.
//!
//! ```rust
//! use actor_domain::{Domain, DomainConfig};
//!
//! let domain = Domain::builder()
//!     .config(DomainConfig { node_id: Some("node-a".into()), ..DomainConfig::default() })
//!     .build();
//! assert_eq!(domain.id(), "node-a");
//! ```

use crate::bus::{DefaultEventBus, EventBus, SubscriptionId};
use crate::cluster::ClusterResolver;
use crate::config::DomainConfig;
use crate::entity::{ActorEntity, EventSourced};
use crate::error::{DomainError, DomainResult, StorageError};
use crate::event::{ActorId, Event, EventPattern};
use crate::handle::{Handle, LocalActorRef};
use crate::history::HistoryCursor;
use crate::pipeline::ActorRepository;
use crate::rehydrate::OldClassRegistry;
use crate::repository::{Repository, RepositoryEvent};
use crate::saga::SagaContext;
use crate::store::{EventStore, InMemoryEventStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct DomainInner {
    id: String,
    config: DomainConfig,
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    repositories: RwLock<HashMap<&'static str, Arc<dyn ActorRepository>>>,
    old_classes: Arc<OldClassRegistry>,
    cluster: Option<Arc<dyn ClusterResolver>>,
}

/// One node of the actor runtime.
#[derive(Clone)]
pub struct Domain {
    inner: Arc<DomainInner>,
}

/// Non-owning reference to a [`Domain`].
#[derive(Clone)]
pub struct WeakDomain(Weak<DomainInner>);

impl WeakDomain {
    pub fn upgrade(&self) -> Option<Domain> {
        self.0.upgrade().map(|inner| Domain { inner })
    }
}

/// Where [`Domain::subscribe`] delivers matching events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTarget {
    pub actor_type: String,
    pub actor_id: ActorId,
    /// Called with the event, as JSON, as its only argument.
    pub method: String,
}

#[derive(Default)]
pub struct DomainBuilder {
    config: DomainConfig,
    store: Option<Arc<dyn EventStore>>,
    bus: Option<Arc<dyn EventBus>>,
    cluster: Option<Arc<dyn ClusterResolver>>,
}

impl DomainBuilder {
    pub fn config(mut self, config: DomainConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to a [`DefaultEventBus`] over the event store.
    pub fn event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterResolver>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn build(self) -> Domain {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryEventStore::new()));
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(DefaultEventBus::new(store.clone())));
        let id = self
            .config
            .node_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!(node_id = %id, "Domain built");
        Domain {
            inner: Arc::new(DomainInner {
                id,
                config: self.config,
                store,
                bus,
                repositories: RwLock::new(HashMap::new()),
                old_classes: Arc::new(OldClassRegistry::new()),
                cluster: self.cluster,
            }),
        }
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

impl Domain {
    /// In-memory domain with the default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DomainBuilder {
        DomainBuilder::default()
    }

    /// Node id, as published to the cluster layer.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &DomainConfig {
        &self.inner.config
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.inner.store
    }

    pub(crate) fn bus(&self) -> &Arc<dyn EventBus> {
        &self.inner.bus
    }

    /// Whether both handles point at the same node.
    pub fn is_same(&self, other: &Domain) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakDomain {
        WeakDomain(Arc::downgrade(&self.inner))
    }

    // --- Registration ---

    /// Registers the current version of an actor type.
    ///
    /// With a cluster configured, ids of created actors are forwarded to
    /// [`ClusterResolver::add_id`] from a background task, which needs a running
    /// tokio runtime.
    pub fn register<A: ActorEntity>(&self) {
        let repository = Arc::new(Repository::<A>::new(
            self.inner.store.clone(),
            self.inner.old_classes.clone(),
            self.inner.config.clone(),
        ));

        if let Some(cluster) = &self.inner.cluster {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(forward_created_ids(
                        repository.subscribe(),
                        cluster.clone(),
                        self.inner.id.clone(),
                    ));
                }
                Err(_) => warn!(
                    actor_type = A::TYPE,
                    "No tokio runtime, created ids are not forwarded to the cluster"
                ),
            }
        }

        if self
            .inner
            .repositories
            .write()
            .insert(A::TYPE, repository)
            .is_some()
        {
            warn!(actor_type = A::TYPE, "Actor type registered twice, replacing");
        }
        info!(actor_type = A::TYPE, version = A::VERSION, "Registered");
    }

    /// Registers a historical version used to replay snapshots it wrote.
    pub fn register_old<A: EventSourced>(&self) {
        self.inner.old_classes.register::<A>();
        debug!(actor_type = A::TYPE, version = A::VERSION, "Registered old version");
    }

    pub(crate) fn repository(&self, actor_type: &str) -> DomainResult<Arc<dyn ActorRepository>> {
        self.inner
            .repositories
            .read()
            .get(actor_type)
            .cloned()
            .ok_or_else(|| DomainError::UnknownType(actor_type.to_string()))
    }

    pub fn is_registered(&self, actor_type: &str) -> bool {
        self.inner.repositories.read().contains_key(actor_type)
    }

    /// Lifecycle notifications of one actor type's cache.
    pub fn repository_events(
        &self,
        actor_type: &str,
    ) -> DomainResult<tokio::sync::broadcast::Receiver<RepositoryEvent>> {
        Ok(self.repository(actor_type)?.subscribe())
    }

    // --- Actors ---

    /// Creates an actor from JSON creation params.
    pub async fn create(&self, actor_type: &str, data: Value) -> DomainResult<Handle> {
        self.create_in(actor_type, data, None).await
    }

    pub(crate) async fn create_in(
        &self,
        actor_type: &str,
        data: Value,
        saga: Option<SagaContext>,
    ) -> DomainResult<Handle> {
        let id = self.repository(actor_type)?.create_json(self, data).await?;
        Ok(self.local_handle(actor_type, &id, saga, None))
    }

    /// Resolves an actor here, then through the cluster.
    pub async fn get(&self, actor_type: &str, id: &str) -> DomainResult<Handle> {
        self.resolve(actor_type, id, None, None).await
    }

    /// Resolves an actor on this node only.
    ///
    /// `None` when the type is not registered here or the actor does not exist.
    pub async fn get_local(&self, actor_type: &str, id: &str) -> DomainResult<Option<Handle>> {
        let Ok(repository) = self.repository(actor_type) else {
            return Ok(None);
        };
        if repository.contains(id).await? {
            Ok(Some(self.local_handle(actor_type, id, None, None)))
        } else {
            Ok(None)
        }
    }

    pub(crate) async fn resolve(
        &self,
        actor_type: &str,
        id: &str,
        saga: Option<SagaContext>,
        key: Option<String>,
    ) -> DomainResult<Handle> {
        if self.get_local(actor_type, id).await?.is_some() {
            return Ok(self.local_handle(actor_type, id, saga, key));
        }
        let Some(cluster) = &self.inner.cluster else {
            return Err(DomainError::not_found(actor_type, id));
        };
        let remote = cluster
            .get_actor(
                actor_type,
                id,
                saga.as_ref().map(SagaContext::id),
                key.as_deref(),
            )
            .await?;
        debug!(actor_type, %id, "Resolved through cluster");
        Ok(Handle::new(remote, saga, key))
    }

    fn local_handle(
        &self,
        actor_type: &str,
        id: &str,
        saga: Option<SagaContext>,
        key: Option<String>,
    ) -> Handle {
        Handle::new(
            Arc::new(LocalActorRef::new(self.clone(), actor_type, id)),
            saga,
            key,
        )
    }

    /// Evicts an actor from the cache. The next access rebuilds it from storage.
    pub fn clear(&self, actor_type: &str, id: &str) {
        if let Ok(repository) = self.repository(actor_type) {
            repository.clear(id);
        }
    }

    pub fn exist(&self, actor_type: &str, id: &str) -> bool {
        self.repository(actor_type)
            .map(|repository| repository.exist(id))
            .unwrap_or(false)
    }

    pub fn get_cache_actor_ids(&self, actor_type: &str) -> DomainResult<Vec<ActorId>> {
        Ok(self.repository(actor_type)?.cache_ids())
    }

    pub async fn get_history(&self, actor_type: &str, id: &str) -> DomainResult<HistoryCursor> {
        self.repository(actor_type)?.history(id).await
    }

    // --- Events ---

    /// Calls `handler` for every published event matching `pattern`.
    pub fn on(
        &self,
        pattern: impl Into<EventPattern>,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.bus.on(pattern.into(), Arc::new(handler))
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.inner.bus.off(id)
    }

    /// Waits for the next event matching `pattern`.
    pub async fn once(
        &self,
        pattern: impl Into<EventPattern>,
        timeout: Option<Duration>,
    ) -> DomainResult<Event> {
        let pattern = pattern.into();
        let description = format!("{pattern:?}");
        self.inner
            .bus
            .once(pattern, timeout)
            .await
            .ok_or(DomainError::Timeout(description))
    }

    /// Delivers every event matching `pattern` to `target.method`, until
    /// `timeout` elapses when one is given.
    ///
    /// Each delivery is its own root call; failures are logged.
    pub async fn subscribe(
        &self,
        pattern: impl Into<EventPattern>,
        target: SubscriptionTarget,
        timeout: Option<Duration>,
    ) -> SubscriptionId {
        let weak = self.downgrade();
        let target = Arc::new(target);
        let id = self.on(pattern, move |event: &Event| {
            let Some(domain) = weak.upgrade() else {
                return;
            };
            let target = target.clone();
            let event = event.clone();
            tokio::spawn(async move {
                let payload = match serde_json::to_value(&event) {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(%error, "Failed to serialize event for subscriber");
                        return;
                    }
                };
                let delivery = async {
                    domain
                        .get(&target.actor_type, &target.actor_id)
                        .await?
                        .call(&target.method, vec![payload])
                        .await
                }
                .await;
                if let Err(error) = delivery {
                    warn!(
                        %error,
                        actor_type = %target.actor_type,
                        actor_id = %target.actor_id,
                        method = %target.method,
                        "Subscription delivery failed"
                    );
                }
            });
        });

        if let Some(limit) = timeout {
            let weak = self.downgrade();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                if let Some(domain) = weak.upgrade() {
                    domain.off(id);
                    debug!(?id, "Subscription expired");
                }
            });
        }
        id
    }

    // --- Sagas ---

    /// Commit step of a successful root call.
    ///
    /// Settles every touched actor on the node hosting it, then publishes the
    /// saga's events to subscribers in apply order.
    pub(crate) async fn commit_saga(&self, saga: &SagaContext) {
        for touched in saga.touched() {
            let Ok(repository) = touched.domain.repository(&touched.actor_type) else {
                continue;
            };
            if let Err(error) = repository.commit(&touched.id, saga.id()).await {
                warn!(
                    %error,
                    actor_type = %touched.actor_type,
                    id = %touched.id,
                    "Snapshot failed"
                );
            }
        }
        info!(saga_id = %saga.id(), "Committed");

        for (domain, event) in saga.take_pending() {
            if let Err(error) = domain.bus().publish(&event).await {
                warn!(%error, event_type = %event.event_type, "Publish failed");
            }
        }
    }

    /// Undoes a failed saga and returns the error to report.
    ///
    /// Events are removed from the store before the touched actors are evicted,
    /// so a reload can no longer observe them.
    pub(crate) async fn rollback_saga(&self, saga: &SagaContext, error: DomainError) -> DomainError {
        let discarded = saga.take_pending().len();
        let result = async {
            self.rollback_local(saga.id()).await?;
            if let Some(cluster) = &self.inner.cluster {
                cluster.rollback(saga.id()).await?;
            }
            Ok::<(), StorageError>(())
        }
        .await;
        for touched in saga.touched() {
            touched.domain.clear(&touched.actor_type, &touched.id);
        }
        debug!(saga_id = %saga.id(), discarded, "Discarded unpublished events");

        match result {
            Ok(()) => {
                info!(saga_id = %saga.id(), "Rolled back");
                error
            }
            Err(rollback) => {
                warn!(saga_id = %saga.id(), error = %rollback, "Rollback failed");
                DomainError::RollbackFailed {
                    source: Box::new(error),
                    rollback,
                }
            }
        }
    }

    /// Removes the saga's events on this node and evicts the actors they touched.
    pub async fn rollback_local(&self, saga_id: &str) -> Result<Vec<Event>, StorageError> {
        let removed = self.inner.bus.rollback(saga_id).await?;
        for event in &removed {
            self.clear(&event.actor_type, &event.actor_id);
        }
        Ok(removed)
    }
}

async fn forward_created_ids(
    mut notifications: tokio::sync::broadcast::Receiver<RepositoryEvent>,
    cluster: Arc<dyn ClusterResolver>,
    node_id: String,
) {
    loop {
        match notifications.recv().await {
            Ok(RepositoryEvent::Created(actor_id)) => {
                if let Err(error) = cluster.add_id(&node_id, &actor_id).await {
                    warn!(%error, %actor_id, "Failed to publish actor id to cluster");
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Cluster id forwarding lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
