//! # Actor Domain Sample
//!
//! Sample actors and typed clients built on `actor_domain`, exposed as a
//! library for integration testing.

pub mod clients;
pub mod lifecycle;
pub mod model;
