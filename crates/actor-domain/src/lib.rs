//! # Actor Domain
//!
//! An event-sourced actor runtime. Actors are plain serde structs whose state only
//! changes through method calls; every change is recorded as an [`Event`],
//! periodically compacted into a [`Snap`], and replayed to rebuild the actor after
//! eviction or restart. Actors living on other nodes are reached through the same
//! [`Handle`] API via a [`ClusterResolver`].
//!
//! ## Architecture Overview
//!
//! The crate separates concerns into layers, leaves first:
//!
//! 1. **Storage** ([`EventStore`], [`InMemoryEventStore`]) - append-only events and snapshots
//! 2. **Replay** ([`rehydrate()`]) - snapshot + events → actor
//! 3. **Repository** ([`Repository`]) - one per actor type: cache, creation, upgrade, history
//! 4. **Pipeline** ([`pipeline`]) - lock wait, run gate, [`Service`] injection, commit or rollback
//! 5. **Domain** ([`Domain`]) - registries, resolution, events, sagas
//! 6. **Cluster** ([`ClusterResolver`], [`LocalCluster`]) - actors on other nodes
//!
//! You write the business logic once, in [`EventSourced::when`] and
//! [`ActorEntity::invoke`]; the runtime handles persistence, serialization of
//! concurrent calls and saga rollback.
//!
//! ## Defining an Actor
//!
//! ```rust
//! use actor_domain::{arg, ActorEntity, Domain, DomainError, Event, EventSourced, Service};
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//! use serde_json::{json, Value};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! impl EventSourced for Counter {
//!     const TYPE: &'static str = "Counter";
//!     const VERSION: &'static str = "1";
//!
//!     fn when(&mut self, event: &Event) {
//!         match event.event_type.as_str() {
//!             "increment" => self.count += 1,
//!             "add" => self.count += event.payload.as_i64().unwrap_or(0),
//!             _ => {}
//!         }
//!     }
//! }
//!
//! #[async_trait]
//! impl ActorEntity for Counter {
//!     type Create = Value;
//!     type Error = DomainError;
//!
//!     fn from_create_params(_id: &str, _params: Value) -> Result<Self, DomainError> {
//!         Ok(Self { count: 0 })
//!     }
//!
//!     fn methods() -> &'static [&'static str] {
//!         &["increment", "add"]
//!     }
//!
//!     async fn invoke(svc: &Service<Self>, method: &str, args: Vec<Value>) -> Result<Value, DomainError> {
//!         match method {
//!             // No event applied: the pipeline applies `increment` itself.
//!             "increment" => Ok(Value::Null),
//!             "add" => {
//!                 svc.emit(arg::<i64>(&args, 0)?).await?;
//!                 Ok(json!(svc.view(|c| c.count)))
//!             }
//!             _ => unreachable!("pipeline rejects unknown methods"),
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let domain = Domain::new();
//!     domain.register::<Counter>();
//!
//!     let counter = domain.create("Counter", json!({})).await.unwrap();
//!     counter.call("increment", vec![]).await.unwrap();
//!     let count = counter.call("add", vec![json!(5)]).await.unwrap();
//!     assert_eq!(count, json!(6));
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - Calls on one actor run one at a time, in the actor's run gate
//! - Calls under a lock key run in their own gate, so different keys overlap
//! - A call made from inside a method joins the caller's saga and skips gates
//!   the saga already holds
//! - Actor state sits behind a short synchronous lock that is never held
//!   across an `.await`
//!
//! ## Testing
//!
//! The [`mock`] module provides a [`MockClusterResolver`](mock::MockClusterResolver)
//! with expectation builders and a [`FailingEventStore`](mock::FailingEventStore)
//! for failure injection.

pub mod actor;
pub mod bus;
pub mod client_trait;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod entity;
pub mod error;
pub mod event;
pub mod handle;
pub mod history;
pub mod mock;
pub mod pipeline;
pub mod rehydrate;
pub mod repository;
pub mod saga;
pub mod service;
pub mod store;
pub mod tracing;

// Re-export core types for convenience
pub use actor::{ActorCell, LockData};
pub use bus::{DefaultEventBus, EventBus, EventHandler, SubscriptionId};
pub use client_trait::ActorClient;
pub use cluster::{ClusterResolver, LocalCluster};
pub use config::DomainConfig;
pub use domain::{Domain, DomainBuilder, SubscriptionTarget, WeakDomain};
pub use entity::{arg, ActorEntity, EventSourced};
pub use error::{ConfigError, DomainError, DomainResult, StorageError};
pub use event::{ActorId, Event, EventPattern, Snap};
pub use handle::{ActorRef, ActorView, Handle, LocalActorRef, Member, MethodRef};
pub use history::HistoryCursor;
pub use rehydrate::{rehydrate, rehydrate_json, OldClassRegistry, ReplayFn};
pub use repository::{Repository, RepositoryEvent};
pub use saga::SagaContext;
pub use service::Service;
pub use store::{EventStore, InMemoryEventStore};
