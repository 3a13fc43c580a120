//! Sample actors.
//!
//! - [`Counter`] shows versioning: [`CounterV1`] is registered as an old version
//!   and its snapshots are upgraded on load.
//! - [`Account`] shows validation in `create_before`, tags and a transfer saga
//!   spanning two actors.

pub mod account;
pub mod counter;

pub use account::*;
pub use counter::*;
