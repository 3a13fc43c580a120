mod common;

use actor_domain::mock::FailingEventStore;
use actor_domain::{
    Domain, DomainConfig, DomainError, Event, EventPattern, EventStore, InMemoryEventStore,
    LockData, Member, Snap, SubscriptionTarget,
};
use common::{count, counter_domain, eventually, Counter, CounterError, CounterV1};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_counter_survives_cache_eviction() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({})).await.unwrap();

    for _ in 0..3 {
        counter.call("increment", vec![]).await.unwrap();
    }
    domain.clear("Counter", counter.id());
    assert!(!domain.exist("Counter", counter.id()));

    let reloaded = domain.get("Counter", counter.id()).await.unwrap();
    assert_eq!(count(&reloaded).await, 3);
}

#[tokio::test]
async fn test_failed_calls_leave_no_trace() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({})).await.unwrap();
    counter.call("increment", vec![]).await.unwrap();

    let err = counter.call("fail", vec![]).await.unwrap_err();
    assert!(matches!(
        err.business_ref::<CounterError>(),
        Some(CounterError::Failed)
    ));
    assert_eq!(count(&counter).await, 1);

    let err = counter.call("boom", vec![]).await.unwrap_err();
    assert!(matches!(
        err.business_ref::<CounterError>(),
        Some(CounterError::Boom)
    ));
    assert_eq!(count(&counter).await, 1);

    let events = domain.event_store().get_events(counter.id()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "increment");
}

#[tokio::test]
async fn test_subscribers_only_see_committed_events() {
    let domain = counter_domain();
    let a = domain.create("Counter", json!({})).await.unwrap();
    let b = domain.create("Counter", json!({})).await.unwrap();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = seen.clone();
    domain.on(EventPattern::any(), move |event| {
        log.lock().push(event.event_type.clone());
    });
    let waiter = {
        let domain = domain.clone();
        tokio::spawn(async move { domain.once("fail", Some(Duration::from_millis(200))).await })
    };
    tokio::task::yield_now().await;

    assert!(a.call("fail", vec![]).await.is_err());
    assert!(a.call("add_to", vec![json!(b.id()), json!(-5)]).await.is_err());
    assert!(seen.lock().is_empty(), "rolled back events reached a handler");
    assert!(matches!(waiter.await.unwrap(), Err(DomainError::Timeout(_))));

    a.call("add_to", vec![json!(b.id()), json!(2)]).await.unwrap();
    assert_eq!(*seen.lock(), vec!["add_to".to_string(), "add".to_string()]);
}

#[tokio::test]
async fn test_tag_commit_never_snapshots_an_open_saga() {
    let store = Arc::new(InMemoryEventStore::new());
    let domain = Domain::builder()
        .config(DomainConfig {
            snapshot_interval: 1,
            ..DomainConfig::default()
        })
        .event_store(store.clone())
        .build();
    domain.register::<Counter>();
    let counter = domain.create("Counter", json!({ "start": 5 })).await.unwrap();

    let failing = {
        let counter = counter.clone();
        tokio::spawn(async move { counter.call("slow_fail", vec![json!(50), json!(100)]).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    counter.trigger("touch").await.unwrap();
    assert_eq!(store.snapshot_count(counter.id()), 1, "snapshot taken mid-saga");

    assert!(failing.await.unwrap().is_err());
    domain.clear("Counter", counter.id());
    assert_eq!(count(&counter).await, 5);
    assert_eq!(counter.field("observed").await.unwrap(), Some(json!(1)));

    counter.call("increment", vec![]).await.unwrap();
    let latest = store.get_latest_snapshot(counter.id()).await.unwrap().unwrap();
    assert_eq!(latest.state["count"], json!(6));
}

#[tokio::test(start_paused = true)]
async fn test_reload_racing_a_rollback_is_not_cached() {
    let store = Arc::new(FailingEventStore::new());
    let domain = Domain::builder().event_store(store.clone()).build();
    domain.register::<Counter>();
    let counter = domain.create("Counter", json!({})).await.unwrap();
    counter.call("increment", vec![]).await.unwrap();

    store.delay_loads(Duration::from_millis(30));
    store.delay_rollbacks(Duration::from_millis(10));
    let reader = {
        let domain = domain.clone();
        let id = counter.id().to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            domain.get("Counter", &id).await.map(|_| ())
        })
    };

    assert!(counter.call("fail", vec![]).await.is_err());
    reader.await.unwrap().unwrap();
    assert_eq!(count(&counter).await, 1);
    let events = domain.event_store().get_events(counter.id()).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_create_then_get_round_trip() {
    let domain = counter_domain();
    let created = domain.create("Counter", json!({ "start": 5 })).await.unwrap();
    let fetched = domain.get("Counter", created.id()).await.unwrap();
    assert_eq!(created.json().await.unwrap(), fetched.json().await.unwrap());

    domain.clear("Counter", created.id());
    let rebuilt = domain.get("Counter", created.id()).await.unwrap();
    assert_eq!(rebuilt.json().await.unwrap(), json!({ "count": 5, "observed": 0 }));
}

#[tokio::test]
async fn test_create_errors() {
    let domain = counter_domain();

    let err = domain.create("Counter", json!({ "start": -1 })).await.unwrap_err();
    assert!(matches!(
        err.business_ref::<CounterError>(),
        Some(CounterError::InvalidStart)
    ));

    let err = domain.create("Counter", json!("nonsense")).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidArgument(_)));

    let err = domain.create("Unknown", json!({})).await.unwrap_err();
    assert!(matches!(err, DomainError::UnknownType(_)));
}

#[tokio::test]
async fn test_lookup_errors() {
    let domain = counter_domain();
    let err = domain.get("Counter", "missing").await.unwrap_err();
    assert!(err.is_not_found());

    let counter = domain.create("Counter", json!({})).await.unwrap();
    let err = counter.call("explode", vec![]).await.unwrap_err();
    assert!(matches!(err, DomainError::UnknownMethod { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_are_serialized() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({})).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let counter = counter.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                counter.call("increment", vec![]).await
            } else {
                counter.call("slow_increment", vec![json!(2)]).await
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(count(&counter).await, 20);
    let indexes: Vec<u64> = domain
        .event_store()
        .get_events(counter.id())
        .await
        .unwrap()
        .iter()
        .map(|e| e.index)
        .collect();
    assert_eq!(indexes, (0..20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_saga_commits_together() {
    let domain = counter_domain();
    let a = domain.create("Counter", json!({})).await.unwrap();
    let b = domain.create("Counter", json!({})).await.unwrap();

    let result = a.call("add_to", vec![json!(b.id()), json!(4)]).await.unwrap();
    assert_eq!(result, json!(4));
    assert_eq!(count(&b).await, 4);

    let store = domain.event_store();
    let a_events = store.get_events(a.id()).await.unwrap();
    let b_events = store.get_events(b.id()).await.unwrap();
    assert_eq!(a_events.len(), 1);
    assert_eq!(b_events.len(), 1);
    assert_eq!(a_events[0].saga_id, b_events[0].saga_id);
}

#[tokio::test]
async fn test_saga_rolls_back_every_actor() {
    let domain = counter_domain();
    let a = domain.create("Counter", json!({})).await.unwrap();
    let b = domain.create("Counter", json!({})).await.unwrap();

    let err = a
        .call("add_to", vec![json!(b.id()), json!(-5)])
        .await
        .unwrap_err();
    assert!(matches!(
        err.business_ref::<CounterError>(),
        Some(CounterError::Negative(-5))
    ));

    assert_eq!(count(&a).await, 0);
    assert_eq!(count(&b).await, 0);
    let store = domain.event_store();
    assert!(store.get_events(a.id()).await.unwrap().is_empty());
    assert!(store.get_events(b.id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reentrant_call_does_not_deadlock() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({ "start": 1 })).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), counter.call("double", vec![]))
        .await
        .expect("re-entrant call deadlocked")
        .unwrap();
    assert_eq!(result, json!(4));
}

#[tokio::test]
async fn test_old_version_is_upgraded_once() {
    let store = Arc::new(InMemoryEventStore::new());
    store
        .create_snap(&Snap::new("Counter", "legacy", "1", json!({ "value": 7 }), 0))
        .await
        .unwrap();
    store
        .save_events(&[Event::new("Counter", "legacy", "s0", 0, "increment", json!({}))])
        .await
        .unwrap();

    let domain = Domain::builder().event_store(store.clone()).build();
    domain.register::<Counter>();
    domain.register_old::<CounterV1>();

    let counter = domain.get("Counter", "legacy").await.unwrap();
    assert_eq!(count(&counter).await, 8);
    let upgraded = store.get_latest_snapshot("legacy").await.unwrap().unwrap();
    assert_eq!(upgraded.actor_version, "2");
    assert_eq!(upgraded.index, 1);

    counter.call("increment", vec![]).await.unwrap();
    let events = store.get_events("legacy").await.unwrap();
    assert_eq!(events.last().unwrap().index, 1);

    domain.clear("Counter", "legacy");
    let again = domain.get("Counter", "legacy").await.unwrap();
    assert_eq!(count(&again).await, 9);
    assert_eq!(store.snapshot_count("legacy"), 2, "no second upgrade");
}

#[tokio::test]
async fn test_upgrade_without_old_class_fails() {
    let store = Arc::new(InMemoryEventStore::new());
    store
        .create_snap(&Snap::new("Counter", "legacy", "1", json!({ "value": 7 }), 0))
        .await
        .unwrap();
    let domain = Domain::builder().event_store(store).build();
    domain.register::<Counter>();

    let err = domain.get("Counter", "legacy").await.unwrap_err();
    assert!(matches!(err, DomainError::Upgrade(_)));
}

#[tokio::test]
async fn test_snapshots_are_written_on_commit() {
    let store = Arc::new(InMemoryEventStore::new());
    let domain = Domain::builder()
        .config(DomainConfig {
            snapshot_interval: 2,
            ..DomainConfig::default()
        })
        .event_store(store.clone())
        .build();
    domain.register::<Counter>();

    let counter = domain.create("Counter", json!({})).await.unwrap();
    for _ in 0..3 {
        counter.call("increment", vec![]).await.unwrap();
    }
    assert_eq!(store.snapshot_count(counter.id()), 2);
    let latest = store.get_latest_snapshot(counter.id()).await.unwrap().unwrap();
    assert_eq!(latest.index, 2);

    domain.clear("Counter", counter.id());
    assert_eq!(count(&counter).await, 3);
}

#[tokio::test]
async fn test_history_cursor_walks_back() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({})).await.unwrap();
    for amount in [1, 2, 3] {
        counter.call("add", vec![json!(amount)]).await.unwrap();
    }

    let mut history = domain.get_history("Counter", counter.id()).await.unwrap();
    assert_eq!(history.index(), 3);
    assert_eq!(history.data()["count"], 6);

    assert!(history.prev().unwrap());
    assert_eq!(history.data()["count"], 3);
    assert!(history.prev().unwrap());
    assert_eq!(history.data()["count"], 1);
    assert!(!history.prev().unwrap());
    assert!(history.done());

    assert!(history.seek(3).unwrap());
    assert_eq!(history.data()["count"], 6);

    let err = domain.get_history("Counter", "missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn test_lock_blocks_other_keys_until_unlock() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({})).await.unwrap();
    let lock = LockData::new("k").with_timeout(Duration::from_secs(3600));
    assert!(counter.lock(lock).await.unwrap());
    assert!(counter.is_locked(None).await.unwrap());
    assert!(!counter.is_locked(Some("k")).await.unwrap());

    let blocked = {
        let counter = counter.clone();
        tokio::spawn(async move { counter.call("increment", vec![]).await })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!blocked.is_finished());

    counter.with_key("k").call("increment", vec![]).await.unwrap();
    assert_eq!(count(&counter).await, 1);

    assert!(!counter.unlock("other").await.unwrap());
    assert!(counter.unlock("k").await.unwrap());
    blocked.await.unwrap().unwrap();
    assert_eq!(count(&counter).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_lock_stops_blocking() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({})).await.unwrap();
    let lock = LockData::new("k").with_timeout(Duration::from_secs(3));
    assert!(counter.lock(lock).await.unwrap());

    let started = tokio::time::Instant::now();
    counter.call("increment", vec![]).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(count(&counter).await, 1);
}

#[tokio::test]
async fn test_member_dispatch() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({ "start": 9 })).await.unwrap();

    assert!(matches!(
        counter.member("lock").await.unwrap(),
        Member::LockControl
    ));
    match counter.member("increment").await.unwrap() {
        Member::Method(method) => {
            method.call(vec![]).await.unwrap();
        }
        other => panic!("expected a method, got {other:?}"),
    }
    assert_eq!(count(&counter).await, 10);

    assert!(matches!(
        counter.member("reset").await.unwrap(),
        Member::Triggered
    ));
    assert_eq!(count(&counter).await, 0);
    let events = domain.event_store().get_events(counter.id()).await.unwrap();
    assert_eq!(events.last().unwrap().event_type, "reset");

    assert!(matches!(
        counter.member("count").await.unwrap(),
        Member::Field(v) if v == json!(0)
    ));
    assert!(matches!(
        counter.member("type").await.unwrap(),
        Member::Field(v) if v == json!("Counter")
    ));
    assert!(matches!(
        counter.member("nothing").await.unwrap(),
        Member::Absent
    ));
}

#[tokio::test]
async fn test_on_and_off() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({})).await.unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let hits = seen.clone();
    let id = domain.on(
        EventPattern::new("increment").actor_id(counter.id()),
        move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        },
    );

    counter.call("increment", vec![]).await.unwrap();
    counter.call("add", vec![json!(2)]).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(domain.off(id));
    counter.call("increment", vec![]).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_once_waits_for_next_event() {
    let domain = counter_domain();
    let counter = domain.create("Counter", json!({})).await.unwrap();

    let waiter = {
        let domain = domain.clone();
        tokio::spawn(async move { domain.once("add", Some(Duration::from_secs(5))).await })
    };
    tokio::task::yield_now().await;

    counter.call("increment", vec![]).await.unwrap();
    counter.call("add", vec![json!(3)]).await.unwrap();
    let event = waiter.await.unwrap().unwrap();
    assert_eq!(event.payload["amount"], 3);
}

#[tokio::test(start_paused = true)]
async fn test_once_times_out() {
    let domain = counter_domain();
    let err = domain
        .once("increment", Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Timeout(_)));
}

#[tokio::test]
async fn test_subscribe_delivers_to_target_method() {
    let domain = counter_domain();
    let source = domain.create("Counter", json!({})).await.unwrap();
    let sink = domain.create("Counter", json!({})).await.unwrap();

    domain
        .subscribe(
            EventPattern::new("increment").actor_id(source.id()),
            SubscriptionTarget {
                actor_type: "Counter".into(),
                actor_id: sink.id().to_string(),
                method: "observe".into(),
            },
            None,
        )
        .await;

    source.call("increment", vec![]).await.unwrap();
    source.call("increment", vec![]).await.unwrap();

    let delivered = eventually(|| {
        let sink = sink.clone();
        async move { sink.field("observed").await.unwrap() == Some(json!(2)) }
    })
    .await;
    assert!(delivered);
}

#[tokio::test]
async fn test_rollback_failure_keeps_both_errors() {
    let store = Arc::new(FailingEventStore::new());
    let domain = Domain::builder().event_store(store.clone()).build();
    domain.register::<Counter>();
    let counter = domain.create("Counter", json!({})).await.unwrap();

    store.fail_rollbacks(true);
    let err = counter.call("fail", vec![]).await.unwrap_err();
    assert!(matches!(err, DomainError::RollbackFailed { .. }));
    assert!(matches!(
        err.business_ref::<CounterError>(),
        Some(CounterError::Failed)
    ));
}

#[tokio::test]
async fn test_publish_failure_rolls_back() {
    let store = Arc::new(FailingEventStore::new());
    let domain = Domain::builder().event_store(store.clone()).build();
    domain.register::<Counter>();
    let counter = domain.create("Counter", json!({})).await.unwrap();

    store.fail_saves(true);
    let err = counter.call("increment", vec![]).await.unwrap_err();
    assert!(matches!(err, DomainError::Storage(_)));

    store.fail_saves(false);
    assert_eq!(count(&counter).await, 0, "folded state was evicted");
}
