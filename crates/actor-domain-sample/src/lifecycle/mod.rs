//! # System Lifecycle & Orchestration
//!
//! Wiring a domain together is where the setup lives: which actor types are
//! registered, which old versions stay replayable, which subscriptions connect
//! one actor's events to another actor's methods.
//!
//! **Key Responsibilities:**
//! 1. **Domain construction** - build the [`Domain`](actor_domain::Domain) from a
//!    [`DomainConfig`](actor_domain::DomainConfig)
//! 2. **Registration** - current actor types plus historical versions
//! 3. **Subscriptions** - route events between actors
//! 4. **Shutdown** - drop subscriptions before the domain goes away
//!
//! ## The BankSystem Pattern
//!
//! ```rust
//! use actor_domain::ActorClient;
//! use actor_domain_sample::lifecycle::BankSystem;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = BankSystem::start().await?;
//!
//!     let alice = system.open_account("alice", 100).await?;
//!     let bob = system.open_account("bob", 0).await?;
//!     alice.transfer(bob.id(), 40).await?;
//!
//!     assert_eq!(bob.balance().await?, 40);
//!     system.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! Unlike a message-loop actor system there is nothing to spawn per actor:
//! actors are loaded on demand by their repository and evicted on failure, so
//! "starting" a system is registration plus subscriptions.
//!
//! ## Observability & Tracing
//!
//! Call [`setup_tracing`](actor_domain::tracing::setup_tracing) once in the binary.
//!
//! ```bash
//! RUST_LOG=info cargo run      # Lifecycle logs
//! RUST_LOG=debug cargo run     # Every pipeline step
//! ```

pub mod bank_system;

pub use bank_system::*;
