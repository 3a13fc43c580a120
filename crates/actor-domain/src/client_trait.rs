//! # ActorClient Trait
//!
//! Provides a common interface for typed actor clients, adding default `view`,
//! `lock` and `unlock` methods built on top of a [`Handle`].
use crate::{ActorView, DomainError, Handle, LockData};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Trait for typed clients wrapping the handle of one actor.
///
/// This trait reduces boilerplate by providing default implementations for
/// the operations every actor supports, so a client only adds its
/// business methods.
///
/// # Example
///
/// ```rust
/// use actor_domain::{ActorClient, DomainError, Handle};
///
/// #[derive(Debug, thiserror::Error)]
/// enum CounterError {
///     #[error(transparent)]
///     Domain(#[from] DomainError),
/// }
///
/// struct CounterClient {
///     handle: Handle,
/// }
///
/// impl ActorClient for CounterClient {
///     type Error = CounterError;
///
///     fn handle(&self) -> &Handle {
///         &self.handle
///     }
/// }
///
/// impl CounterClient {
///     async fn increment(&self) -> Result<i64, CounterError> {
///         self.call("increment", vec![]).await
///     }
/// }
/// ```
#[async_trait]
pub trait ActorClient: Send + Sync {
    /// The actor-specific error type.
    type Error: From<DomainError> + Send + Sync;

    /// Access the handle of the wrapped actor.
    fn handle(&self) -> &Handle;

    /// Map domain errors to the specific actor error type.
    fn map_error(e: DomainError) -> Self::Error {
        e.into()
    }

    fn id(&self) -> &str {
        self.handle().id()
    }

    /// Calls a method and decodes its result.
    #[tracing::instrument(skip(self, args), fields(id = %self.id()))]
    async fn call<T>(&self, method: &str, args: Vec<Value>) -> Result<T, Self::Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        tracing::debug!("Sending request");
        self.handle()
            .call_as(method, args)
            .await
            .map_err(Self::map_error)
    }

    /// Fetch the actor's current view.
    #[tracing::instrument(skip(self), fields(id = %self.id()))]
    async fn view(&self) -> Result<ActorView, Self::Error> {
        tracing::debug!("Sending request");
        self.handle().view().await.map_err(Self::map_error)
    }

    #[tracing::instrument(skip(self), fields(id = %self.id()))]
    async fn lock(&self, data: LockData) -> Result<bool, Self::Error> {
        self.handle().lock(data).await.map_err(Self::map_error)
    }

    #[tracing::instrument(skip(self), fields(id = %self.id()))]
    async fn unlock(&self, key: &str) -> Result<bool, Self::Error> {
        self.handle().unlock(key).await.map_err(Self::map_error)
    }
}
