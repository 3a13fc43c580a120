use actor_domain::{arg, ActorEntity, DomainError, Event, EventSourced, Service};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A named counter.
///
/// # Actor Domain
/// Version `"2"` of the `Counter` type. Snapshots written by version `"1"`
/// ([`CounterV1`]) are replayed with the old fold and then converted through
/// [`ActorEntity::upgrade`], which renames `value` to `count`.
///
/// Members:
/// - `increment()` / `add(amount)` return the new count
/// - `reset` is a tag: reading it applies a `reset` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub label: String,
    pub count: i64,
}

/// Payload for creating a new counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounterCreate {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub start: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("Amount must not be negative, got {0}")]
    NegativeAmount(i64),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl EventSourced for Counter {
    const TYPE: &'static str = "Counter";
    const VERSION: &'static str = "2";

    fn when(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "increment" => self.count += 1,
            "add" => self.count += event.payload["amount"].as_i64().unwrap_or(0),
            "reset" => self.count = 0,
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
            label: params.label,
            count: params.start,
        })
    }

    fn methods() -> &'static [&'static str] {
        &["increment", "add"]
    }

    fn tags() -> &'static [&'static str] {
        &["reset"]
    }

    async fn invoke(
        svc: &Service<Self>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, CounterError> {
        match method {
            "increment" => {
                svc.emit(json!({})).await?;
            }
            "add" => {
                let amount: i64 = arg(&args, 0)?;
                if amount < 0 {
                    return Err(CounterError::NegativeAmount(amount));
                }
                svc.emit(json!({ "amount": amount })).await?;
            }
            _ => {
                return Err(DomainError::UnknownMethod {
                    actor_type: Self::TYPE.to_string(),
                    method: method.to_string(),
                }
                .into())
            }
        }
        Ok(json!(svc.view(|c| c.count)))
    }

    fn upgrade(old: Value) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let old: CounterV1 = serde_json::from_value(old)?;
        Ok(Self {
            label: old.label,
            count: old.value,
        })
    }
}

/// Version `"1"` of `Counter`, kept so its snapshots can still be replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterV1 {
    #[serde(default)]
    pub label: String,
    pub value: i64,
}

impl EventSourced for CounterV1 {
    const TYPE: &'static str = "Counter";
    const VERSION: &'static str = "1";

    fn when(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "increment" => self.value += 1,
            "add" => self.value += event.payload["amount"].as_i64().unwrap_or(0),
            _ => {}
        }
    }
}
