use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{StoreAgent, StoreError};
use crate::events::{EventLog, FactoryEvent};

/// A shopper buying a random number of units from randomly chosen stores.
pub struct Customer {
    id: u32,
    stores: Vec<Arc<StoreAgent>>,
    events: EventLog,
    max_purchases: u32,
    max_pause: Duration,
    rng: StdRng,
}

impl Customer {
    /// Creates a customer buying 1–5 units with pauses of up to 5 seconds.
    pub fn new(id: u32, stores: Vec<Arc<StoreAgent>>, events: EventLog) -> Self {
        Self {
            id,
            stores,
            events,
            max_purchases: 5,
            max_pause: Duration::from_secs(5),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_limits(mut self, max_purchases: u32, max_pause: Duration) -> Self {
        self.max_purchases = max_purchases.max(1);
        self.max_pause = max_pause;
        self
    }

    /// Makes the customer's choices reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Shops until the planned purchases are done or `cancel` fires.
    /// Returns the number of units bought.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<u32, StoreError> {
        if self.stores.is_empty() {
            return Err(StoreError::NoStores);
        }
        let planned = self.rng.gen_range(1..=self.max_purchases);
        let mut bought = 0;

        for _ in 0..planned {
            let store = self.stores[self.rng.gen_range(0..self.stores.len())].clone();
            let unit = match store.take_one(&cancel).await {
                Ok(unit) => unit,
                Err(StoreError::Cancelled) => break,
                Err(e) => return Err(e),
            };
            info!(customer = self.id, store = store.name(), unit = %unit, "Bought");
            self.events.record(FactoryEvent::Purchased {
                customer_id: self.id,
                store_name: store.name().to_string(),
                unit,
            });
            bought += 1;

            let max_ms = u64::try_from(self.max_pause.as_millis()).unwrap_or(u64::MAX);
            let pause = Duration::from_millis(self.rng.gen_range(0..=max_ms));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(customer = self.id, bought, planned, "Done shopping");
        Ok(bought)
    }
}
