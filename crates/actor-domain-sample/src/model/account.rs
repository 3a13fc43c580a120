use actor_domain::{arg, ActorEntity, Domain, DomainError, Event, EventSourced, Service};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A bank account holding a balance in cents.
///
/// # Actor Domain
/// See [`impl ActorEntity for Account`](#impl-ActorEntity-for-Account) for:
/// - Creation parameters ([`AccountCreate`]), validated in `create_before`
/// - `deposit(amount)`, `withdraw(amount)` and `unfreeze()`
/// - `transfer(to, amount)`, which calls `deposit` on the target account inside
///   the same saga, so a failed deposit also undoes the withdrawal
/// - the `freeze` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub owner: String,
    pub balance: i64,
    #[serde(default)]
    pub frozen: bool,
}

/// Payload for opening an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCreate {
    pub owner: String,
    #[serde(default)]
    pub initial: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Owner must not be empty")]
    MissingOwner,
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },
    #[error("Account is frozen")]
    Frozen,
    #[error(transparent)]
    Domain(DomainError),
}

/// Unwraps an `AccountError` raised by another account in a nested call, so
/// `transfer` reports the target's failure as-is.
impl From<DomainError> for AccountError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Business(inner) => match inner.downcast::<AccountError>() {
                Ok(account) => *account,
                Err(other) => AccountError::Domain(DomainError::Business(other)),
            },
            other => AccountError::Domain(other),
        }
    }
}

impl Account {
    fn ensure_open(&self) -> Result<(), AccountError> {
        if self.frozen {
            return Err(AccountError::Frozen);
        }
        Ok(())
    }

    fn ensure_covers(&self, amount: i64) -> Result<(), AccountError> {
        if amount > self.balance {
            return Err(AccountError::InsufficientFunds {
                balance: self.balance,
                requested: amount,
            });
        }
        Ok(())
    }
}

fn positive(args: &[Value], index: usize) -> Result<i64, AccountError> {
    let amount: i64 = arg(args, index)?;
    if amount <= 0 {
        return Err(AccountError::InvalidAmount(amount));
    }
    Ok(amount)
}

impl EventSourced for Account {
    const TYPE: &'static str = "Account";
    const VERSION: &'static str = "1";

    fn when(&mut self, event: &Event) {
        let amount = event.payload["amount"].as_i64().unwrap_or(0);
        match event.event_type.as_str() {
            "deposit" => self.balance += amount,
            "withdraw" | "transfer" => self.balance -= amount,
            "freeze" => self.frozen = true,
            "unfreeze" => self.frozen = false,
            _ => {}
        }
    }
}

#[async_trait]
impl ActorEntity for Account {
    type Create = AccountCreate;
    type Error = AccountError;

    fn from_create_params(_id: &str, params: AccountCreate) -> Result<Self, AccountError> {
        Ok(Self {
            owner: params.owner,
            balance: params.initial,
            frozen: false,
        })
    }

    async fn create_before(
        mut params: AccountCreate,
        _domain: &Domain,
    ) -> Result<AccountCreate, AccountError> {
        params.owner = params.owner.trim().to_string();
        if params.owner.is_empty() {
            return Err(AccountError::MissingOwner);
        }
        if params.initial < 0 {
            return Err(AccountError::InvalidAmount(params.initial));
        }
        Ok(params)
    }

    fn methods() -> &'static [&'static str] {
        &["deposit", "withdraw", "transfer", "unfreeze"]
    }

    fn tags() -> &'static [&'static str] {
        &["freeze"]
    }

    async fn invoke(
        svc: &Service<Self>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, AccountError> {
        match method {
            "deposit" => {
                let amount = positive(&args, 0)?;
                svc.view(Account::ensure_open)?;
                svc.emit(json!({ "amount": amount })).await?;
            }
            "withdraw" => {
                let amount = positive(&args, 0)?;
                svc.view(|a| a.ensure_open().and_then(|_| a.ensure_covers(amount)))?;
                svc.emit(json!({ "amount": amount })).await?;
            }
            "transfer" => {
                let to: String = arg(&args, 0)?;
                let amount = positive(&args, 1)?;
                svc.view(|a| a.ensure_open().and_then(|_| a.ensure_covers(amount)))?;
                svc.emit(json!({ "amount": amount, "to": to })).await?;
                svc.get(Self::TYPE, &to)
                    .await?
                    .call("deposit", vec![json!(amount)])
                    .await?;
            }
            // No event applied here: the pipeline records `unfreeze` itself.
            "unfreeze" => return Ok(Value::Null),
            _ => {
                return Err(DomainError::UnknownMethod {
                    actor_type: Self::TYPE.to_string(),
                    method: method.to_string(),
                }
                .into())
            }
        }
        Ok(json!(svc.view(|a| a.balance)))
    }
}
