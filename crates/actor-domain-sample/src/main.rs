//! # Actor Domain Sample
//!
//! A small bank built on the event-sourced actor runtime.
//!
//! ## Core Components
//!
//! - **[model]**: the actors ([`Account`](actor_domain_sample::model::Account),
//!   [`Counter`](actor_domain_sample::model::Counter)) as plain serde structs.
//! - **[clients]**: typed wrappers ([`AccountClient`], [`CounterClient`](actor_domain_sample::clients::CounterClient))
//!   over actor handles.
//! - **[lifecycle]**: the [`BankSystem`] that registers actors and wires subscriptions.
//!
//! ## Quick Start
//!
//! 1. Start the [`BankSystem`].
//! 2. Open two accounts.
//! 3. Transfer between them, then attempt a transfer to a frozen account and
//!    watch it roll back.

use actor_domain::tracing::setup_tracing;
use actor_domain::{ActorClient, DomainConfig};
use actor_domain_sample::clients::AccountClient;
use actor_domain_sample::lifecycle::BankSystem;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => DomainConfig::load(&path).map_err(|e| e.to_string())?,
        None => DomainConfig::default(),
    };

    info!("Starting bank system");
    let system = BankSystem::with_config(config)
        .await
        .map_err(|e| e.to_string())?;

    let span = tracing::info_span!("account_opening");
    let (alice, bob) = async {
        info!("Opening accounts");
        let alice = system.open_account("alice", 100).await?;
        let bob = system.open_account("bob", 0).await?;
        Ok::<_, actor_domain_sample::model::AccountError>((alice, bob))
    }
    .instrument(span)
    .await
    .map_err(|e| e.to_string())?;

    info!(alice = %alice.id(), bob = %bob.id(), "Accounts opened");

    let span = tracing::info_span!("transfers");
    async {
        match alice.transfer(bob.id(), 40).await {
            Ok(balance) => info!(balance, "Transfer committed"),
            Err(e) => error!(error = %e, "Transfer failed"),
        }

        bob.freeze().await.map_err(|e| e.to_string())?;
        match alice.transfer(bob.id(), 10).await {
            Ok(_) => error!("Transfer to a frozen account succeeded"),
            Err(e) => info!(error = %e, "Transfer rolled back"),
        }
        Ok::<_, String>(())
    }
    .instrument(span)
    .await?;

    report(&alice).await?;
    report(&bob).await?;

    let transfers = system
        .transfer_counter()
        .count()
        .await
        .map_err(|e| e.to_string())?;
    info!(transfers, "Committed transfers observed");

    system.shutdown();
    info!("Application completed successfully");
    Ok(())
}

async fn report(account: &AccountClient) -> Result<(), String> {
    let view = account.view().await.map_err(|e| e.to_string())?;
    info!(id = %view.id, state = %view.data, "Final state");
    Ok(())
}
