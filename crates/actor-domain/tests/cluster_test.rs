mod common;

use actor_domain::mock::{FailingEventStore, MockActorRef, MockClusterResolver};
use actor_domain::{ActorView, Domain, DomainConfig, DomainError, LocalCluster};
use common::{count, eventually, Counter, CounterError};
use serde_json::json;
use std::sync::Arc;

fn node(name: &str, cluster: Arc<LocalCluster>) -> Domain {
    let domain = Domain::builder()
        .config(DomainConfig {
            node_id: Some(name.to_string()),
            ..DomainConfig::default()
        })
        .cluster(cluster.clone())
        .build();
    domain.register::<Counter>();
    cluster.join(&domain);
    domain
}

fn remote_view(id: &str) -> ActorView {
    ActorView {
        id: id.to_string(),
        actor_type: "Counter".into(),
        version: "2".into(),
        tags: vec!["reset".into()],
        methods: vec!["increment".into()],
        data: json!({ "count": 41 }),
    }
}

#[tokio::test]
async fn test_actor_on_peer_is_resolved_transparently() {
    let cluster = LocalCluster::new();
    let a = node("node-a", cluster.clone());
    let b = node("node-b", cluster.clone());

    let remote = b.create("Counter", json!({ "start": 10 })).await.unwrap();
    let seen_from_a = a.get("Counter", remote.id()).await.unwrap();
    seen_from_a.call("increment", vec![]).await.unwrap();

    assert_eq!(count(&seen_from_a).await, 11);
    assert!(b.exist("Counter", remote.id()));
    assert!(!a.exist("Counter", remote.id()));

    let owner_known = eventually(|| {
        let cluster = cluster.clone();
        let id = remote.id().to_string();
        async move { cluster.owner_of(&id).as_deref() == Some("node-b") }
    })
    .await;
    assert!(owner_known);
}

#[tokio::test]
async fn test_saga_rolls_back_across_nodes() {
    let cluster = LocalCluster::new();
    let a = node("node-a", cluster.clone());
    let b = node("node-b", cluster.clone());

    let local = a.create("Counter", json!({})).await.unwrap();
    let remote = b.create("Counter", json!({})).await.unwrap();

    local
        .call("add_to", vec![json!(remote.id()), json!(3)])
        .await
        .unwrap();
    assert_eq!(count(&remote).await, 3);

    let err = local
        .call("add_to", vec![json!(remote.id()), json!(-2)])
        .await
        .unwrap_err();
    assert!(matches!(
        err.business_ref::<CounterError>(),
        Some(CounterError::Negative(-2))
    ));
    assert_eq!(count(&local).await, 3);
    assert_eq!(count(&remote).await, 3);
    assert_eq!(
        b.event_store().get_events(remote.id()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_missing_everywhere_is_not_found() {
    let cluster = LocalCluster::new();
    let a = node("node-a", cluster.clone());
    let _b = node("node-b", cluster.clone());
    let err = a.get("Counter", "nowhere").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_mock_resolver_serves_remote_actor() {
    let cluster = Arc::new(MockClusterResolver::new());
    let remote = Arc::new(MockActorRef::new(remote_view("r1")));
    remote.expect_call("increment").return_ok(json!(42));
    cluster.expect_get_actor("Counter", "r1").return_ok(remote.clone());

    let domain = Domain::builder().cluster(cluster.clone()).build();
    domain.register::<Counter>();

    let handle = domain.get("Counter", "r1").await.unwrap();
    assert_eq!(handle.call("increment", vec![]).await.unwrap(), json!(42));
    assert_eq!(handle.field("count").await.unwrap(), Some(json!(41)));
    handle.trigger("reset").await.unwrap();

    assert_eq!(remote.triggered(), vec!["reset".to_string()]);
    assert_eq!(remote.calls()[0].0, "increment");
    cluster.verify();
    remote.verify();
}

#[tokio::test]
async fn test_mock_resolver_errors_surface() {
    let cluster = Arc::new(MockClusterResolver::new());
    cluster
        .expect_get_actor("Counter", "r1")
        .return_err(DomainError::Timeout("node-b".into()));

    let domain = Domain::builder().cluster(cluster.clone()).build();
    let err = domain.get("Counter", "r1").await.unwrap_err();
    assert!(matches!(err, DomainError::Timeout(_)));
    cluster.verify();
}

#[tokio::test]
async fn test_created_ids_are_published_to_cluster() {
    let cluster = Arc::new(MockClusterResolver::new());
    let domain = Domain::builder()
        .config(DomainConfig {
            node_id: Some("node-a".into()),
            ..DomainConfig::default()
        })
        .cluster(cluster.clone())
        .build();
    domain.register::<Counter>();

    let counter = domain.create("Counter", json!({})).await.unwrap();
    let published = eventually(|| {
        let cluster = cluster.clone();
        let expected = ("node-a".to_string(), counter.id().to_string());
        async move { cluster.added_ids().contains(&expected) }
    })
    .await;
    assert!(published);
}

#[tokio::test]
async fn test_failed_call_fans_out_rollback() {
    let cluster = Arc::new(MockClusterResolver::new());
    let domain = Domain::builder().cluster(cluster.clone()).build();
    domain.register::<Counter>();
    let counter = domain.create("Counter", json!({})).await.unwrap();

    counter.call("fail", vec![]).await.unwrap_err();
    assert_eq!(cluster.rollbacks().len(), 1);

    cluster.fail_rollback("node-b unreachable");
    let err = counter.call("boom", vec![]).await.unwrap_err();
    assert!(matches!(err, DomainError::RollbackFailed { .. }));
    assert!(err.to_string().contains("node-b unreachable"));
}

#[tokio::test]
async fn test_local_rollback_failure_skips_fan_out() {
    let store = Arc::new(FailingEventStore::new());
    let cluster = Arc::new(MockClusterResolver::new());
    let domain = Domain::builder()
        .event_store(store.clone())
        .cluster(cluster.clone())
        .build();
    domain.register::<Counter>();
    let counter = domain.create("Counter", json!({})).await.unwrap();

    store.fail_rollbacks(true);
    let err = counter.call("fail", vec![]).await.unwrap_err();
    assert!(matches!(err, DomainError::RollbackFailed { .. }));
    assert!(cluster.rollbacks().is_empty());
}
