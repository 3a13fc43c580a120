//! Typed clients for the sample actors.
//!
//! Each client wraps a [`Handle`](actor_domain::Handle) and implements
//! [`ActorClient`](actor_domain::ActorClient), which supplies `view`, `lock` and
//! `unlock`; the client adds the actor's business methods with concrete types.

pub mod account_client;
pub mod counter_client;

pub use account_client::AccountClient;
pub use counter_client::CounterClient;
