use crate::clients::{AccountClient, CounterClient};
use crate::model::{
    Account, AccountCreate, AccountError, Counter, CounterCreate, CounterError, CounterV1,
};
use actor_domain::{
    ActorClient, Domain, DomainConfig, EventPattern, EventSourced, SubscriptionId,
    SubscriptionTarget,
};
use tracing::{info, instrument};

/// Orchestrates the bank sample: one domain with `Account` and `Counter`
/// registered, and a counter that tallies committed transfers.
pub struct BankSystem {
    domain: Domain,
    transfer_counter: CounterClient,
    subscription: SubscriptionId,
}

impl BankSystem {
    /// Starts the system with default configuration.
    pub async fn start() -> Result<Self, CounterError> {
        Self::with_config(DomainConfig::default()).await
    }

    #[instrument(skip(config), fields(node_id = ?config.node_id))]
    pub async fn with_config(config: DomainConfig) -> Result<Self, CounterError> {
        let domain = Domain::builder().config(config).build();
        Self::on_domain(domain).await
    }

    /// Registers the sample actors on an existing domain, e.g. one joined to a
    /// cluster.
    pub async fn on_domain(domain: Domain) -> Result<Self, CounterError> {
        domain.register::<Account>();
        domain.register::<Counter>();
        domain.register_old::<CounterV1>();

        let transfer_counter = CounterClient::create(
            &domain,
            CounterCreate {
                label: "transfers".into(),
                start: 0,
            },
        )
        .await?;

        // Only committed `transfer` events are published, so rolled back
        // transfers are not counted.
        let subscription = domain
            .subscribe(
                EventPattern::new("transfer").actor_type(Account::TYPE),
                SubscriptionTarget {
                    actor_type: Counter::TYPE.to_string(),
                    actor_id: transfer_counter.id().to_string(),
                    method: "increment".to_string(),
                },
                None,
            )
            .await;

        info!(node_id = %domain.id(), "Bank system started");
        Ok(Self {
            domain,
            transfer_counter,
            subscription,
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub async fn open_account(
        &self,
        owner: &str,
        initial: i64,
    ) -> Result<AccountClient, AccountError> {
        AccountClient::open(
            &self.domain,
            AccountCreate {
                owner: owner.to_string(),
                initial,
            },
        )
        .await
    }

    pub async fn account(&self, id: &str) -> Result<AccountClient, AccountError> {
        AccountClient::connect(&self.domain, id).await
    }

    pub fn transfer_counter(&self) -> &CounterClient {
        &self.transfer_counter
    }

    /// Stops routing transfer events. Actors stay in the event store.
    pub fn shutdown(self) {
        self.domain.off(self.subscription);
        info!(node_id = %self.domain.id(), "Bank system stopped");
    }
}
