//! # Counter Client
//!
//! Provides a high‑level API for interacting with a `Counter` actor.
use crate::model::{Counter, CounterCreate, CounterError};
use actor_domain::{ActorClient, Domain, DomainError, EventSourced, Handle};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

/// Client for interacting with one Counter actor.
#[derive(Clone)]
pub struct CounterClient {
    handle: Handle,
}

impl CounterClient {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    #[instrument(skip(domain))]
    pub async fn create(domain: &Domain, params: CounterCreate) -> Result<Self, CounterError> {
        debug!("Sending request");
        let data = serde_json::to_value(params)
            .map_err(|e| DomainError::InvalidArgument(e.to_string()))?;
        let handle = domain.create(Counter::TYPE, data).await?;
        Ok(Self::new(handle))
    }

    pub async fn connect(domain: &Domain, id: &str) -> Result<Self, CounterError> {
        Ok(Self::new(domain.get(Counter::TYPE, id).await?))
    }

    pub async fn increment(&self) -> Result<i64, CounterError> {
        self.call("increment", vec![]).await
    }

    pub async fn add(&self, amount: i64) -> Result<i64, CounterError> {
        self.call("add", vec![json!(amount)]).await
    }

    #[instrument(skip(self), fields(id = %self.id()))]
    pub async fn reset(&self) -> Result<(), CounterError> {
        debug!("Sending request");
        Ok(self.handle.trigger("reset").await?)
    }

    pub async fn count(&self) -> Result<i64, CounterError> {
        let view = self.view().await?;
        Ok(view.field("count").and_then(|v| v.as_i64()).unwrap_or(0))
    }
}

#[async_trait]
impl ActorClient for CounterClient {
    type Error = CounterError;

    fn handle(&self) -> &Handle {
        &self.handle
    }
}
