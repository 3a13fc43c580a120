//! # Cluster Resolution
//!
//! When an actor is not found locally the domain asks its [`ClusterResolver`].
//! A resolver returns an [`ActorRef`] with the same contract as a local one, so
//! callers cannot tell where the actor lives.
//!
//! [`LocalCluster`] connects several domains of the same process. It is the
//! reference resolver and what the tests use; networked resolvers implement the
//! trait over their own transport.

use crate::domain::{Domain, WeakDomain};
use crate::error::{DomainError, DomainResult, StorageError};
use crate::event::ActorId;
use crate::handle::ActorRef;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait ClusterResolver: Send + Sync + 'static {
    /// Finds an actor on another node.
    ///
    /// `saga_id` and `key` describe the call the reference is resolved for.
    async fn get_actor(
        &self,
        actor_type: &str,
        id: &str,
        saga_id: Option<&str>,
        key: Option<&str>,
    ) -> DomainResult<Arc<dyn ActorRef>>;

    /// Records that `node_id` hosts `actor_id`.
    async fn add_id(&self, node_id: &str, actor_id: &str) -> DomainResult<()>;

    /// Rolls the saga back on every other node.
    async fn rollback(&self, _saga_id: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-process cluster of domains.
///
/// Peers are held weakly; a dropped domain simply stops answering.
#[derive(Default)]
pub struct LocalCluster {
    peers: RwLock<Vec<WeakDomain>>,
    owners: RwLock<HashMap<ActorId, String>>,
}

impl LocalCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a domain to the cluster.
    pub fn join(&self, domain: &Domain) {
        self.peers.write().push(domain.downgrade());
    }

    /// Node recorded as hosting `actor_id`.
    pub fn owner_of(&self, actor_id: &str) -> Option<String> {
        self.owners.read().get(actor_id).cloned()
    }

    fn live_peers(&self) -> Vec<Domain> {
        self.peers
            .read()
            .iter()
            .filter_map(WeakDomain::upgrade)
            .collect()
    }
}

#[async_trait]
impl ClusterResolver for LocalCluster {
    async fn get_actor(
        &self,
        actor_type: &str,
        id: &str,
        _saga_id: Option<&str>,
        _key: Option<&str>,
    ) -> DomainResult<Arc<dyn ActorRef>> {
        let mut peers = self.live_peers();
        // Try the recorded owner first.
        if let Some(owner) = self.owner_of(id) {
            peers.sort_by_key(|peer| peer.id() != owner);
        }
        for peer in peers {
            if let Some(handle) = peer.get_local(actor_type, id).await? {
                debug!(actor_type, %id, node = %peer.id(), "Resolved on peer");
                return Ok(handle.actor_ref());
            }
        }
        Err(DomainError::not_found(actor_type, id))
    }

    async fn add_id(&self, node_id: &str, actor_id: &str) -> DomainResult<()> {
        self.owners
            .write()
            .insert(actor_id.to_string(), node_id.to_string());
        Ok(())
    }

    async fn rollback(&self, saga_id: &str) -> Result<(), StorageError> {
        for peer in self.live_peers() {
            peer.rollback_local(saga_id).await?;
        }
        Ok(())
    }
}
