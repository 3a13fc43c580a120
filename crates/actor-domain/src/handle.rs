//! # Handles
//!
//! A [`Handle`] is what callers hold instead of an actor. It stores the actor's
//! type and id (plus the saga and lock key its calls run under) and routes every
//! access through an [`ActorRef`]: a [`LocalActorRef`] for actors of this node,
//! or whatever the cluster layer returns for remote ones. Handles never own
//! actor state, so they stay valid across cache eviction.
//!
//! ## Member dispatch
//!
//! [`Handle::member`] classifies a property name, in this order:
//!
//! | name | result |
//! |------|--------|
//! | `lock`, `unlock`, `is_locked` | [`Member::LockControl`] |
//! | a method of the actor | [`Member::Method`], callable through the pipeline |
//! | a tag of the actor | the tag event is applied, [`Member::Triggered`] |
//! | a data field, or `id`/`type`/`version`/`tags` | [`Member::Field`] |
//! | anything else | [`Member::Absent`] |

use crate::actor::LockData;
use crate::domain::Domain;
use crate::error::{DomainError, DomainResult};
use crate::event::ActorId;
use crate::saga::SagaContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Serialized picture of an actor, as seen through a handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorView {
    pub id: ActorId,
    pub actor_type: String,
    pub version: String,
    pub tags: Vec<String>,
    pub methods: Vec<String>,
    pub data: Value,
}

impl ActorView {
    /// A data field, falling back to the raw `id`, `type`, `version` and `tags`.
    pub fn field(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.data.get(name) {
            return Some(value.clone());
        }
        match name {
            "id" => Some(Value::String(self.id.clone())),
            "type" => Some(Value::String(self.actor_type.clone())),
            "version" => Some(Value::String(self.version.clone())),
            "tags" => Some(Value::from(self.tags.clone())),
            _ => None,
        }
    }
}

/// Routing target of a [`Handle`].
///
/// Implemented by [`LocalActorRef`] and by cluster resolvers for actors that
/// live on another node.
#[async_trait]
pub trait ActorRef: Send + Sync {
    fn actor_type(&self) -> &str;

    fn id(&self) -> &str;

    async fn view(&self) -> DomainResult<ActorView>;

    /// Runs `method` through the invocation pipeline.
    async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        saga: Option<SagaContext>,
        key: Option<String>,
    ) -> DomainResult<Value>;

    /// Applies the tag event `tag` without waiting on the run gate.
    async fn trigger(&self, tag: &str, saga: Option<SagaContext>) -> DomainResult<()>;

    async fn lock(&self, data: LockData) -> DomainResult<bool>;

    async fn unlock(&self, key: &str) -> DomainResult<bool>;

    async fn is_locked(&self, key: Option<&str>) -> DomainResult<bool>;
}

/// [`ActorRef`] for an actor registered on this node.
pub struct LocalActorRef {
    domain: Domain,
    actor_type: String,
    id: ActorId,
}

impl LocalActorRef {
    pub fn new(domain: Domain, actor_type: impl Into<String>, id: impl Into<ActorId>) -> Self {
        Self {
            domain,
            actor_type: actor_type.into(),
            id: id.into(),
        }
    }
}

#[async_trait]
impl ActorRef for LocalActorRef {
    fn actor_type(&self) -> &str {
        &self.actor_type
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn view(&self) -> DomainResult<ActorView> {
        self.domain
            .repository(&self.actor_type)?
            .view(&self.id)
            .await
    }

    async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        saga: Option<SagaContext>,
        key: Option<String>,
    ) -> DomainResult<Value> {
        self.domain
            .repository(&self.actor_type)?
            .invoke(&self.domain, &self.id, method, args, saga, key)
            .await
    }

    async fn trigger(&self, tag: &str, saga: Option<SagaContext>) -> DomainResult<()> {
        self.domain
            .repository(&self.actor_type)?
            .trigger(&self.domain, &self.id, tag, saga)
            .await
    }

    async fn lock(&self, data: LockData) -> DomainResult<bool> {
        self.domain
            .repository(&self.actor_type)?
            .lock(&self.id, &data)
            .await
    }

    async fn unlock(&self, key: &str) -> DomainResult<bool> {
        self.domain
            .repository(&self.actor_type)?
            .unlock(&self.id, key)
            .await
    }

    async fn is_locked(&self, key: Option<&str>) -> DomainResult<bool> {
        self.domain
            .repository(&self.actor_type)?
            .is_locked(&self.id, key)
            .await
    }
}

/// Result of [`Handle::member`].
#[derive(Debug, Clone)]
pub enum Member {
    LockControl,
    Method(MethodRef),
    /// A tag event was applied.
    Triggered,
    Field(Value),
    Absent,
}

/// A method bound to a handle.
#[derive(Debug, Clone)]
pub struct MethodRef {
    handle: Handle,
    name: String,
}

impl MethodRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, args: Vec<Value>) -> DomainResult<Value> {
        self.handle.call(&self.name, args).await
    }
}

/// Proxy for one actor.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<dyn ActorRef>,
    saga: Option<SagaContext>,
    key: Option<String>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("actor_type", &self.inner.actor_type())
            .field("id", &self.inner.id())
            .field("saga", &self.saga)
            .field("key", &self.key)
            .finish()
    }
}

impl Handle {
    pub fn new(inner: Arc<dyn ActorRef>, saga: Option<SagaContext>, key: Option<String>) -> Self {
        Self { inner, saga, key }
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn actor_type(&self) -> &str {
        self.inner.actor_type()
    }

    /// Saga the handle's calls join, if it was obtained inside a method body.
    pub fn saga_id(&self) -> Option<&str> {
        self.saga.as_ref().map(SagaContext::id)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Same actor, calling under `key`.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            inner: self.inner.clone(),
            saga: self.saga.clone(),
            key: Some(key.into()),
        }
    }

    pub fn actor_ref(&self) -> Arc<dyn ActorRef> {
        self.inner.clone()
    }

    pub async fn view(&self) -> DomainResult<ActorView> {
        self.inner.view().await
    }

    /// Serialized state of the actor.
    pub async fn json(&self) -> DomainResult<Value> {
        Ok(self.inner.view().await?.data)
    }

    pub async fn field(&self, name: &str) -> DomainResult<Option<Value>> {
        Ok(self.inner.view().await?.field(name))
    }

    /// Classifies `prop` and performs its side effect for tags.
    pub async fn member(&self, prop: &str) -> DomainResult<Member> {
        if matches!(prop, "lock" | "unlock" | "is_locked") {
            return Ok(Member::LockControl);
        }
        let view = self.inner.view().await?;
        if view.methods.iter().any(|m| m == prop) {
            return Ok(Member::Method(MethodRef {
                handle: self.clone(),
                name: prop.to_string(),
            }));
        }
        if view.tags.iter().any(|t| t == prop) {
            self.inner.trigger(prop, self.saga.clone()).await?;
            return Ok(Member::Triggered);
        }
        Ok(view.field(prop).map_or(Member::Absent, Member::Field))
    }

    /// Calls `method` with positional JSON arguments.
    #[tracing::instrument(skip(self, args), fields(actor_type = %self.actor_type(), id = %self.id()))]
    pub async fn call(&self, method: &str, args: Vec<Value>) -> DomainResult<Value> {
        self.inner
            .call(method, args, self.saga.clone(), self.key.clone())
            .await
    }

    /// [`Handle::call`] decoding the result as `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> DomainResult<T> {
        let value = self.call(method, args).await?;
        serde_json::from_value(value)
            .map_err(|e| DomainError::InvalidArgument(format!("result of {method}: {e}")))
    }

    /// Applies a tag event directly.
    pub async fn trigger(&self, tag: &str) -> DomainResult<()> {
        self.inner.trigger(tag, self.saga.clone()).await
    }

    pub async fn lock(&self, data: LockData) -> DomainResult<bool> {
        self.inner.lock(data).await
    }

    pub async fn unlock(&self, key: &str) -> DomainResult<bool> {
        self.inner.unlock(key).await
    }

    pub async fn is_locked(&self, key: Option<&str>) -> DomainResult<bool> {
        self.inner.is_locked(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_field_falls_back_to_raw_fields() {
        let view = ActorView {
            id: "c1".into(),
            actor_type: "Counter".into(),
            version: "2".into(),
            tags: vec!["reset".into()],
            methods: vec!["increment".into()],
            data: json!({ "count": 3, "id": "c1" }),
        };
        assert_eq!(view.field("count"), Some(json!(3)));
        assert_eq!(view.field("type"), Some(json!("Counter")));
        assert_eq!(view.field("version"), Some(json!("2")));
        assert_eq!(view.field("tags"), Some(json!(["reset"])));
        assert_eq!(view.field("missing"), None);
    }
}
