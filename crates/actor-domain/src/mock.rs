//! # Mocks & Testing Guide
//!
//! Test doubles for the seams of a [`Domain`](crate::Domain):
//!
//! - [`MockClusterResolver`] answers `get_actor` from queued expectations and
//!   records `add_id` / `rollback` calls.
//! - [`MockActorRef`] is a scripted remote actor.
//! - [`FailingEventStore`] wraps an [`InMemoryEventStore`] and fails or stalls on demand.
//!
//! ## When to use Mocks vs Real Domains
//!
//! | Feature | Mocks | Real domain |
//! |---------|-------|-------------|
//! | **Speed** | Instant | Fast (in-memory store) |
//! | **Remote actors** | Scripted ([`MockActorRef`]) | A second domain behind a [`LocalCluster`](crate::LocalCluster) |
//! | **Error Injection** | Easy (`return_err`, [`FailingEventStore`]) | Hard |
//! | **Use Case** | Resolution and failure paths | Full sagas across nodes |
//!
//! ## Testing Strategies
//!
//! <details>
//! <summary><b>Pattern 0: Remote Resolution (Pure Mock)</b></summary>
//!
//! ```rust
//! use actor_domain::mock::{MockActorRef, MockClusterResolver};
//! use actor_domain::{ActorView, Domain};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cluster = Arc::new(MockClusterResolver::new());
//!     let remote = Arc::new(MockActorRef::new(ActorView {
//!         id: "c9".into(),
//!         actor_type: "Counter".into(),
//!         version: "2".into(),
//!         tags: vec![],
//!         methods: vec!["increment".into()],
//!         data: json!({ "count": 41 }),
//!     }));
//!     remote.expect_call("increment").return_ok(json!(42));
//!     cluster.expect_get_actor("Counter", "c9").return_ok(remote.clone());
//!
//!     let domain = Domain::builder().cluster(cluster.clone()).build();
//!     let handle = domain.get("Counter", "c9").await.unwrap();
//!     assert_eq!(handle.call("increment", vec![]).await.unwrap(), json!(42));
//!
//!     cluster.verify();
//!     remote.verify();
//! }
//! ```
//! </details>
//!
//! <details>
//! <summary><b>Pattern 1: Storage Failure Injection</b></summary>
//!
//! ```rust
//! use actor_domain::mock::FailingEventStore;
//! use actor_domain::Domain;
//! use std::sync::Arc;
//!
//! let store = Arc::new(FailingEventStore::new());
//! let domain = Domain::builder().event_store(store.clone()).build();
//! store.fail_rollbacks(true);
//! // A failing method on `domain` now surfaces `DomainError::RollbackFailed`.
//! ```
//! </details>
//!
//! <details>
//! <summary><b>Pattern 2: Full Cluster Test</b></summary>
//!
//! Two domains joined to one [`LocalCluster`](crate::LocalCluster); see
//! `tests/cluster_test.rs`.
//! </details>

use crate::actor::LockData;
use crate::cluster::ClusterResolver;
use crate::error::{DomainError, DomainResult, StorageError};
use crate::event::{Event, Snap};
use crate::handle::{ActorRef, ActorView};
use crate::saga::SagaContext;
use crate::store::{EventStore, InMemoryEventStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// CLUSTER RESOLVER
// =============================================================================

struct GetActorExpectation {
    actor_type: String,
    id: String,
    response: DomainResult<Arc<dyn ActorRef>>,
}

/// A cluster resolver with expectation tracking for fluent testing.
///
/// `get_actor` calls must arrive in the order they were expected; a call with
/// no matching expectation panics.
#[derive(Default)]
pub struct MockClusterResolver {
    expectations: Arc<Mutex<VecDeque<GetActorExpectation>>>,
    added: Mutex<Vec<(String, String)>>,
    rollbacks: Mutex<Vec<String>>,
    rollback_error: Mutex<Option<String>>,
}

impl MockClusterResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects a `get_actor` call.
    pub fn expect_get_actor(&self, actor_type: &str, id: &str) -> GetActorExpectationBuilder {
        GetActorExpectationBuilder {
            actor_type: actor_type.to_string(),
            id: id.to_string(),
            expectations: self.expectations.clone(),
        }
    }

    /// Makes every `rollback` fail with a backend error.
    pub fn fail_rollback(&self, message: impl Into<String>) {
        *self.rollback_error.lock() = Some(message.into());
    }

    /// `(node_id, actor_id)` pairs received through `add_id`.
    pub fn added_ids(&self) -> Vec<(String, String)> {
        self.added.lock().clone()
    }

    /// Saga ids received through `rollback`.
    pub fn rollbacks(&self) -> Vec<String> {
        self.rollbacks.lock().clone()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().len();
        if remaining > 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }
}

#[async_trait]
impl ClusterResolver for MockClusterResolver {
    async fn get_actor(
        &self,
        actor_type: &str,
        id: &str,
        _saga_id: Option<&str>,
        _key: Option<&str>,
    ) -> DomainResult<Arc<dyn ActorRef>> {
        let expectation = self.expectations.lock().pop_front();
        match expectation {
            Some(exp) if exp.actor_type == actor_type && exp.id == id => exp.response,
            Some(exp) => panic!(
                "Unexpected get_actor({actor_type}, {id}), expected ({}, {})",
                exp.actor_type, exp.id
            ),
            None => panic!("Unexpected get_actor({actor_type}, {id})"),
        }
    }

    async fn add_id(&self, node_id: &str, actor_id: &str) -> DomainResult<()> {
        self.added
            .lock()
            .push((node_id.to_string(), actor_id.to_string()));
        Ok(())
    }

    async fn rollback(&self, saga_id: &str) -> Result<(), StorageError> {
        self.rollbacks.lock().push(saga_id.to_string());
        match self.rollback_error.lock().clone() {
            Some(message) => Err(StorageError::Backend(message)),
            None => Ok(()),
        }
    }
}

/// Builder for `get_actor` expectations.
pub struct GetActorExpectationBuilder {
    actor_type: String,
    id: String,
    expectations: Arc<Mutex<VecDeque<GetActorExpectation>>>,
}

impl GetActorExpectationBuilder {
    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, actor: Arc<dyn ActorRef>) {
        self.push(Ok(actor));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: DomainError) {
        self.push(Err(error));
    }

    fn push(self, response: DomainResult<Arc<dyn ActorRef>>) {
        self.expectations.lock().push_back(GetActorExpectation {
            actor_type: self.actor_type,
            id: self.id,
            response,
        });
    }
}

// =============================================================================
// ACTOR REF
// =============================================================================

struct CallExpectation {
    method: String,
    response: DomainResult<Value>,
}

/// A scripted remote actor.
///
/// `view` returns the fixed view; `call` answers from queued expectations;
/// `trigger` and the lock operations are recorded and succeed.
pub struct MockActorRef {
    view: ActorView,
    expectations: Arc<Mutex<VecDeque<CallExpectation>>>,
    calls: Mutex<Vec<(String, Vec<Value>, Option<String>)>>,
    triggered: Mutex<Vec<String>>,
}

impl MockActorRef {
    pub fn new(view: ActorView) -> Self {
        Self {
            view,
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            calls: Mutex::new(Vec::new()),
            triggered: Mutex::new(Vec::new()),
        }
    }

    /// Expects a call of `method`.
    pub fn expect_call(&self, method: &str) -> CallExpectationBuilder {
        CallExpectationBuilder {
            method: method.to_string(),
            expectations: self.expectations.clone(),
        }
    }

    /// `(method, args, saga_id)` of every call received.
    pub fn calls(&self) -> Vec<(String, Vec<Value>, Option<String>)> {
        self.calls.lock().clone()
    }

    pub fn triggered(&self) -> Vec<String> {
        self.triggered.lock().clone()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().len();
        if remaining > 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }
}

#[async_trait]
impl ActorRef for MockActorRef {
    fn actor_type(&self) -> &str {
        &self.view.actor_type
    }

    fn id(&self) -> &str {
        &self.view.id
    }

    async fn view(&self) -> DomainResult<ActorView> {
        Ok(self.view.clone())
    }

    async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        saga: Option<SagaContext>,
        _key: Option<String>,
    ) -> DomainResult<Value> {
        self.calls.lock().push((
            method.to_string(),
            args,
            saga.as_ref().map(|s| s.id().to_string()),
        ));
        let expectation = self.expectations.lock().pop_front();
        match expectation {
            Some(exp) if exp.method == method => exp.response,
            Some(exp) => panic!("Unexpected call {method}, expected {}", exp.method),
            None => panic!("Unexpected call {method}"),
        }
    }

    async fn trigger(&self, tag: &str, _saga: Option<SagaContext>) -> DomainResult<()> {
        self.triggered.lock().push(tag.to_string());
        Ok(())
    }

    async fn lock(&self, _data: LockData) -> DomainResult<bool> {
        Ok(true)
    }

    async fn unlock(&self, _key: &str) -> DomainResult<bool> {
        Ok(true)
    }

    async fn is_locked(&self, _key: Option<&str>) -> DomainResult<bool> {
        Ok(false)
    }
}

/// Builder for `call` expectations.
pub struct CallExpectationBuilder {
    method: String,
    expectations: Arc<Mutex<VecDeque<CallExpectation>>>,
}

impl CallExpectationBuilder {
    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, value: Value) {
        self.push(Ok(value));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: DomainError) {
        self.push(Err(error));
    }

    fn push(self, response: DomainResult<Value>) {
        self.expectations.lock().push_back(CallExpectation {
            method: self.method,
            response,
        });
    }
}

// =============================================================================
// EVENT STORE
// =============================================================================

/// [`InMemoryEventStore`] that can be told to fail or to stall.
#[derive(Default)]
pub struct FailingEventStore {
    inner: InMemoryEventStore,
    fail_saves: AtomicBool,
    fail_rollbacks: AtomicBool,
    load_delay: Mutex<Option<Duration>>,
    rollback_delay: Mutex<Option<Duration>>,
}

impl FailingEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollbacks(&self, fail: bool) {
        self.fail_rollbacks.store(fail, Ordering::SeqCst);
    }

    /// `get_events_by_snapshot` reads, then waits `delay` before returning
    /// what it read.
    pub fn delay_loads(&self, delay: Duration) {
        *self.load_delay.lock() = Some(delay);
    }

    /// `remove_events_by_saga` waits `delay` before removing anything.
    pub fn delay_rollbacks(&self, delay: Duration) {
        *self.rollback_delay.lock() = Some(delay);
    }

    pub fn inner(&self) -> &InMemoryEventStore {
        &self.inner
    }
}

async fn stall(delay: &Mutex<Option<Duration>>) {
    let delay = *delay.lock();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn create_snap(&self, snap: &Snap) -> Result<(), StorageError> {
        self.inner.create_snap(snap).await
    }

    async fn get_latest_snapshot(&self, actor_id: &str) -> Result<Option<Snap>, StorageError> {
        self.inner.get_latest_snapshot(actor_id).await
    }

    async fn get_events_by_snapshot(&self, snap_id: &str) -> Result<Vec<Event>, StorageError> {
        let events = self.inner.get_events_by_snapshot(snap_id).await;
        stall(&self.load_delay).await;
        events
    }

    async fn get_snapshot_by_index(
        &self,
        actor_id: &str,
        ordinal: usize,
    ) -> Result<Option<Snap>, StorageError> {
        self.inner.get_snapshot_by_index(actor_id, ordinal).await
    }

    async fn get_events(&self, actor_id: &str) -> Result<Vec<Event>, StorageError> {
        self.inner.get_events(actor_id).await
    }

    async fn save_events(&self, events: &[Event]) -> Result<(), StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("save_events disabled".into()));
        }
        self.inner.save_events(events).await
    }

    async fn remove_events_by_saga(&self, saga_id: &str) -> Result<Vec<Event>, StorageError> {
        if self.fail_rollbacks.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("remove_events_by_saga disabled".into()));
        }
        stall(&self.rollback_delay).await;
        self.inner.remove_events_by_saga(saga_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view() -> ActorView {
        ActorView {
            id: "r1".into(),
            actor_type: "Remote".into(),
            version: "1".into(),
            tags: vec![],
            methods: vec!["ping".into()],
            data: json!({}),
        }
    }

    #[tokio::test]
    async fn test_expectations_are_consumed_in_order() {
        let cluster = MockClusterResolver::new();
        let remote: Arc<dyn ActorRef> = Arc::new(MockActorRef::new(view()));
        cluster.expect_get_actor("Remote", "r1").return_ok(remote);
        cluster
            .expect_get_actor("Remote", "r2")
            .return_err(DomainError::not_found("Remote", "r2"));

        assert!(cluster.get_actor("Remote", "r1", None, None).await.is_ok());
        let err = cluster.get_actor("Remote", "r2", None, None).await.err().unwrap();
        assert!(err.is_not_found());
        cluster.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Not all expectations were met")]
    async fn test_verify_panics_on_leftovers() {
        let remote = MockActorRef::new(view());
        remote.expect_call("ping").return_ok(json!("pong"));
        remote.verify();
    }

    #[tokio::test]
    async fn test_failing_store_toggles() {
        let store = FailingEventStore::new();
        let event = Event::new("Remote", "r1", "s", 0, "ping", json!({}));
        store.fail_saves(true);
        assert!(store.save_events(&[event.clone()]).await.is_err());
        store.fail_saves(false);
        store.save_events(&[event]).await.unwrap();
        assert_eq!(store.inner().event_count(), 1);
    }
}
