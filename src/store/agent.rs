use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{StoreError, VehicleSupplier};
use crate::belt::{BeltError, ConveyorBelt};
use crate::model::Unit;

/// A store pulling units from the factory into its own bounded inventory and
/// selling them to customers.
pub struct StoreAgent {
    name: String,
    inventory: ConveyorBelt,
    supplier: Arc<dyn VehicleSupplier>,
}

impl StoreAgent {
    pub fn new(name: impl Into<String>, capacity: usize, supplier: Arc<dyn VehicleSupplier>) -> Self {
        Self {
            name: name.into(),
            inventory: ConveyorBelt::new(capacity),
            supplier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Units currently in stock.
    pub fn stock(&self) -> usize {
        self.inventory.len()
    }

    pub fn capacity(&self) -> usize {
        self.inventory.capacity()
    }

    /// Requests one unit and puts it in stock, waiting for room if the
    /// inventory is full.
    pub async fn restock_once(&self, cancel: &CancellationToken) -> Result<Unit, StoreError> {
        let position = u32::try_from(self.inventory.len()).unwrap_or(u32::MAX);
        let unit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            unit = self.supplier.request_vehicle(&self.name, position) => unit?,
        };
        info!(store = %self.name, unit = %unit, position, "Received");

        match self.inventory.enqueue(unit.clone(), cancel).await {
            Ok(_) => Ok(unit),
            Err(BeltError::EnqueueCancelled(unit)) => {
                warn!(store = %self.name, unit_id = unit.id(), "Inventory full at shutdown, unit not stocked");
                Err(StoreError::Cancelled)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Restocks every `interval` until cancelled. Failed requests are logged
    /// and retried on the next tick. Returns the number of units stocked.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> u64 {
        info!(store = %self.name, capacity = self.capacity(), "Store open");
        let mut stocked = 0;

        loop {
            match self.restock_once(&cancel).await {
                Ok(_) => stocked += 1,
                Err(StoreError::Cancelled) => break,
                Err(e) => warn!(store = %self.name, error = %e, "Restock failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(store = %self.name, stocked, left = self.stock(), "Store closed");
        stocked
    }

    /// Sells the oldest unit in stock, waiting while the store is empty.
    pub async fn take_one(&self, cancel: &CancellationToken) -> Result<Unit, StoreError> {
        Ok(self.inventory.dequeue(cancel).await?)
    }
}
