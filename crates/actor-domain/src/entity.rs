//! # Actor Traits
//!
//! The contract every actor type must satisfy to be managed by a
//! [`Repository`](crate::repository::Repository).
//!
//! It is split in two:
//!
//! - [`EventSourced`] is the replay half: a type tag, a code version and the `when`
//!   fold. Historical versions of an actor only implement this trait and are
//!   registered with [`Domain::register_old`](crate::Domain::register_old).
//! - [`ActorEntity`] is the live half: creation, the method table, tags and the
//!   `invoke` dispatch used by the invocation pipeline.
//!
//! State is serialized with `serde`, so `parse`/`json` come for free.
//!
//! # Provided Methods (Hooks)
//! - [`ActorEntity::create_before`] runs before creation and may rewrite the params.
//! - [`ActorEntity::tags`] defaults to no triggerable members.
//! - [`ActorEntity::upgrade`] defaults to reparsing the old JSON unchanged.

use crate::domain::Domain;
use crate::error::DomainError;
use crate::event::Event;
use crate::service::Service;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Replay contract: how events fold into state.
pub trait EventSourced: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type tag, shared by every version of the actor.
    const TYPE: &'static str;

    /// Code version, stamped into every snapshot.
    const VERSION: &'static str;

    /// Applies the effect of one event.
    ///
    /// Must be deterministic: replay runs it again for every stored event.
    /// Unknown event types should be ignored.
    fn when(&mut self, event: &Event);
}

/// Live contract for the current version of an actor type.
///
/// # Method dispatch
/// Methods are addressed by name. [`ActorEntity::methods`] lists them so handles can
/// tell a method from a data field, and [`ActorEntity::invoke`] dispatches to the
/// body. The body mutates state only through [`Service::apply`].
///
/// # Errors
/// `Error` must be convertible from [`DomainError`] so nested calls made through
/// the service (`svc.get(..).await?.call(..).await?`) can use `?`.
#[async_trait]
pub trait ActorEntity: EventSourced + Clone {
    /// The data required to create a new instance, deserialized from the JSON passed
    /// to [`Domain::create`](crate::Domain::create).
    type Create: DeserializeOwned + Send + Debug;

    /// The error type returned by method bodies.
    type Error: std::error::Error + Send + Sync + From<DomainError> + 'static;

    /// Construct the entity from its freshly minted id and creation params.
    fn from_create_params(id: &str, params: Self::Create) -> Result<Self, Self::Error>;

    /// Pre-create hook with access to the owning domain.
    async fn create_before(
        params: Self::Create,
        _domain: &Domain,
    ) -> Result<Self::Create, Self::Error> {
        Ok(params)
    }

    /// Names accepted by [`ActorEntity::invoke`].
    fn methods() -> &'static [&'static str];

    /// Zero-argument members that apply an event of the same name when accessed.
    fn tags() -> &'static [&'static str] {
        &[]
    }

    /// Runs the method body.
    async fn invoke(
        svc: &Service<Self>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, Self::Error>;

    /// Builds the current version from the JSON of an older version.
    fn upgrade(old: Value) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(serde_json::from_value(old)?)
    }
}

/// Deserializes positional argument `index` of a method call.
pub fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, DomainError> {
    let value = args.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| DomainError::InvalidArgument(format!("argument {index}: {e}")))
}
