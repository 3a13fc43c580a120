//! # Tracing Setup
//!
//! The runtime logs through `tracing` with structured fields (`actor_type`, `id`,
//! `method`, `saga_id`). Lifecycle messages (`Created`, `Upgraded`, `Committed`,
//! `Rolled back`) are `info`; per-call detail such as the pipeline state
//! (`PENDING_LOCK`, `RUNNING`, ...) is `debug`; failures are `warn`.
//!
//! ```bash
//! RUST_LOG=info cargo run                    # lifecycle only
//! RUST_LOG=actor_domain=debug cargo run      # every pipeline step
//! ```

/// Initializes the tracing subscriber for a binary.
///
/// Filtering comes from `RUST_LOG`. Safe to call more than once; only the first
/// call installs a subscriber.
///
/// # Example
///
/// ```ignore
/// setup_tracing();
/// tracing::info!("Application started");
/// ```
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
