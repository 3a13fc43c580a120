//! # Account Client
//!
//! Provides a high‑level API for interacting with an `Account` actor.
//! Errors raised by the account come back as [`AccountError`] variants, including
//! those raised by the target account of a transfer.
use crate::model::{Account, AccountCreate, AccountError};
use actor_domain::{ActorClient, Domain, DomainError, EventSourced, Handle};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument};

/// Client for interacting with one Account actor.
#[derive(Clone, Debug)]
pub struct AccountClient {
    handle: Handle,
}

impl AccountClient {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Opens an account. Validation happens in `Account::create_before`.
    #[instrument(skip(domain))]
    pub async fn open(domain: &Domain, params: AccountCreate) -> Result<Self, AccountError> {
        debug!("Sending request");
        let data = serde_json::to_value(params)
            .map_err(|e| DomainError::InvalidArgument(e.to_string()))?;
        let handle = domain.create(Account::TYPE, data).await?;
        info!(id = %handle.id(), "Account opened");
        Ok(Self::new(handle))
    }

    pub async fn connect(domain: &Domain, id: &str) -> Result<Self, AccountError> {
        Ok(Self::new(domain.get(Account::TYPE, id).await?))
    }

    pub async fn deposit(&self, amount: i64) -> Result<i64, AccountError> {
        self.call("deposit", vec![json!(amount)]).await
    }

    pub async fn withdraw(&self, amount: i64) -> Result<i64, AccountError> {
        self.call("withdraw", vec![json!(amount)]).await
    }

    /// Moves `amount` to the account `to`, returning this account's new balance.
    pub async fn transfer(&self, to: &str, amount: i64) -> Result<i64, AccountError> {
        self.call("transfer", vec![json!(to), json!(amount)]).await
    }

    #[instrument(skip(self), fields(id = %self.id()))]
    pub async fn freeze(&self) -> Result<(), AccountError> {
        debug!("Sending request");
        Ok(self.handle.trigger("freeze").await?)
    }

    pub async fn unfreeze(&self) -> Result<(), AccountError> {
        let _: serde_json::Value = self.call("unfreeze", vec![]).await?;
        Ok(())
    }

    pub async fn balance(&self) -> Result<i64, AccountError> {
        let view = self.view().await?;
        Ok(view.field("balance").and_then(|v| v.as_i64()).unwrap_or(0))
    }

    pub async fn is_frozen(&self) -> Result<bool, AccountError> {
        let view = self.view().await?;
        Ok(view.field("frozen").and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

#[async_trait]
impl ActorClient for AccountClient {
    type Error = AccountError;

    fn handle(&self) -> &Handle {
        &self.handle
    }
}
