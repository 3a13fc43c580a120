#![allow(dead_code)]

use actor_domain::{arg, ActorEntity, Domain, DomainError, Event, EventSourced, Handle, Service};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

// --- Test Entity ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
    #[serde(default)]
    pub observed: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CounterCreate {
    #[serde(default)]
    pub start: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("boom")]
    Boom,
    #[error("failed after applying")]
    Failed,
    #[error("negative amount {0}")]
    Negative(i64),
    #[error("start must not be negative")]
    InvalidStart,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl EventSourced for Counter {
    const TYPE: &'static str = "Counter";
    const VERSION: &'static str = "2";

    fn when(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "increment" => self.count += 1,
            "add" | "add_to" => self.count += event.payload["amount"].as_i64().unwrap_or(0),
            "fail" => self.count += 100,
            "reset" => self.count = 0,
            "observe" | "touch" => self.observed += 1,
            _ => {}
        }
    }
}

#[async_trait]
impl ActorEntity for Counter {
    type Create = CounterCreate;
    type Error = CounterError;

    fn from_create_params(_id: &str, params: CounterCreate) -> Result<Self, CounterError> {
        Ok(Self {
            count: params.start,
            observed: 0,
        })
    }

    async fn create_before(
        params: CounterCreate,
        _domain: &Domain,
    ) -> Result<CounterCreate, CounterError> {
        if params.start < 0 {
            return Err(CounterError::InvalidStart);
        }
        Ok(params)
    }

    fn methods() -> &'static [&'static str] {
        &[
            "increment",
            "add",
            "add_to",
            "fail",
            "boom",
            "double",
            "slow_increment",
            "slow_fail",
            "observe",
        ]
    }

    fn tags() -> &'static [&'static str] {
        &["reset", "touch"]
    }

    async fn invoke(
        svc: &Service<Self>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, CounterError> {
        match method {
            "increment" => Ok(Value::Null),
            "add" => {
                let amount: i64 = arg(&args, 0)?;
                svc.emit(json!({ "amount": amount })).await?;
                Ok(json!(svc.view(|c| c.count)))
            }
            "add_to" => {
                let other: String = arg(&args, 0)?;
                let amount: i64 = arg(&args, 1)?;
                svc.emit(json!({ "amount": amount })).await?;
                svc.get(Self::TYPE, &other)
                    .await?
                    .call("add", vec![json!(amount)])
                    .await?;
                if amount < 0 {
                    return Err(CounterError::Negative(amount));
                }
                Ok(json!(svc.view(|c| c.count)))
            }
            "fail" => {
                svc.emit(json!({})).await?;
                Err(CounterError::Failed)
            }
            "boom" => Err(CounterError::Boom),
            "double" => {
                // Re-enters this actor inside the same saga.
                svc.get(Self::TYPE, svc.id())
                    .await?
                    .call("increment", vec![])
                    .await?;
                let count = svc.view(|c| c.count);
                svc.apply("add", json!({ "amount": count })).await?;
                Ok(json!(svc.view(|c| c.count)))
            }
            "slow_increment" => {
                let millis: u64 = arg(&args, 0)?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
                svc.apply("increment", json!({})).await?;
                Ok(json!(svc.view(|c| c.count)))
            }
            "slow_fail" => {
                // Holds the saga open with an applied event, then fails.
                let amount: i64 = arg(&args, 0)?;
                let millis: u64 = arg(&args, 1)?;
                svc.apply("add", json!({ "amount": amount })).await?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Err(CounterError::Failed)
            }
            "observe" => {
                let event: Event = arg(&args, 0)?;
                svc.emit(json!({ "event_type": event.event_type })).await?;
                Ok(Value::Null)
            }
            _ => Err(DomainError::UnknownMethod {
                actor_type: Self::TYPE.to_string(),
                method: method.to_string(),
            }
            .into()),
        }
    }

    fn upgrade(old: Value) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let count = old["value"].as_i64().ok_or("missing value")?;
        Ok(Self { count, observed: 0 })
    }
}

/// First schema of `Counter`, kept to replay snapshots it wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterV1 {
    pub value: i64,
}

impl EventSourced for CounterV1 {
    const TYPE: &'static str = "Counter";
    const VERSION: &'static str = "1";

    fn when(&mut self, event: &Event) {
        if event.event_type == "increment" {
            self.value += 1;
        }
    }
}

pub fn counter_domain() -> Domain {
    let domain = Domain::new();
    domain.register::<Counter>();
    domain
}

pub async fn count(handle: &Handle) -> i64 {
    handle
        .field("count")
        .await
        .unwrap()
        .and_then(|v| v.as_i64())
        .unwrap()
}

/// Polls `check` until it holds, yielding to spawned tasks in between.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
