use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::FactoryError;
use crate::config::RetailConfig;
use crate::events::EventLog;
use crate::store::{Customer, FactoryClient, StoreAgent, StoreError, VehicleSupplier};

/// What the stores and customers did before shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetailReport {
    /// Units received from the factory into store inventories.
    pub stocked: u64,
    /// Units bought by customers.
    pub purchases: u64,
    /// Units still in store inventories.
    pub left_in_stores: usize,
}

/// Store agents restocking from the factory and customers buying from them.
pub struct RetailSystem {
    stores: Vec<Arc<StoreAgent>>,
    cancel: CancellationToken,
    store_tasks: Vec<JoinHandle<u64>>,
    customers: Vec<JoinHandle<Result<u32, StoreError>>>,
}

impl RetailSystem {
    /// Starts the stores against the factory listening on `factory_addr`.
    pub fn start(
        config: &RetailConfig,
        factory_addr: SocketAddr,
        request_timeout: Duration,
        events: EventLog,
    ) -> Self {
        let client = FactoryClient::new(factory_addr).with_timeout(request_timeout);
        Self::start_with_supplier(config, Arc::new(client), events)
    }

    pub fn start_with_supplier(
        config: &RetailConfig,
        supplier: Arc<dyn VehicleSupplier>,
        events: EventLog,
    ) -> Self {
        let cancel = CancellationToken::new();

        let stores: Vec<_> = config
            .stores
            .iter()
            .map(|name| Arc::new(StoreAgent::new(name.clone(), config.store_capacity, supplier.clone())))
            .collect();

        let store_tasks = stores
            .iter()
            .map(|store| tokio::spawn(store.clone().run(config.request_interval(), cancel.clone())))
            .collect();

        let customers = (1..=config.customers)
            .map(|id| {
                let customer = Customer::new(id, stores.clone(), events.clone())
                    .with_limits(config.max_purchases, config.max_pause());
                tokio::spawn(customer.run(cancel.clone()))
            })
            .collect();

        info!(stores = stores.len(), customers = config.customers, "Retail started");

        Self {
            stores,
            cancel,
            store_tasks,
            customers,
        }
    }

    pub fn stores(&self) -> &[Arc<StoreAgent>] {
        &self.stores
    }

    /// Closes the stores and sends the remaining customers home.
    pub async fn shutdown(self) -> Result<RetailReport, FactoryError> {
        info!("Shutting down retail...");
        self.cancel.cancel();

        let mut report = RetailReport::default();
        for task in self.store_tasks {
            report.stocked += task.await?;
        }
        for customer in self.customers {
            match customer.await? {
                Ok(bought) => report.purchases += u64::from(bought),
                Err(e) => warn!(error = %e, "Customer failed"),
            }
        }
        report.left_in_stores = self.stores.iter().map(|store| store.stock()).sum();

        info!(?report, "Retail shutdown complete.");
        Ok(report)
    }
}
