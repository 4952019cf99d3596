use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AcquireOrder, PartsPool, ProductionError, ToolRing};
use crate::belt::{BeltError, ConveyorBelt};
use crate::events::{EventLog, FactoryEvent};
use crate::model::{Unit, UnitIdIssuer};

/// What a worker loop reports when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub station_id: usize,
    pub worker_id: usize,
    pub produced: u64,
}

/// One assembly station: a ring of tools shared by its workers, plus handles
/// to the factory-wide parts pool, belt, id issuer and event log.
///
/// Each worker runs [`AssemblyStation::run_worker`] in its own task.
pub struct AssemblyStation {
    station_id: usize,
    tools: ToolRing,
    parts: Arc<PartsPool>,
    belt: Arc<ConveyorBelt>,
    ids: UnitIdIssuer,
    events: EventLog,
    order: AcquireOrder,
    interval: Duration,
}

impl AssemblyStation {
    /// Builds a station with `workers` workers (and as many tools).
    ///
    /// # Errors
    /// [`ProductionError::RingTooSmall`] for fewer than two workers.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        station_id: usize,
        workers: usize,
        parts: Arc<PartsPool>,
        belt: Arc<ConveyorBelt>,
        ids: UnitIdIssuer,
        events: EventLog,
        order: AcquireOrder,
        interval: Duration,
    ) -> Result<Self, ProductionError> {
        Ok(Self {
            station_id,
            tools: ToolRing::new(station_id, workers)?,
            parts,
            belt,
            ids,
            events,
            order,
            interval,
        })
    }

    pub fn station_id(&self) -> usize {
        self.station_id
    }

    pub fn workers(&self) -> usize {
        self.tools.len()
    }

    pub fn tools(&self) -> &ToolRing {
        &self.tools
    }

    /// One production cycle for `worker_id`:
    /// part → tools → build → belt → put tools down → return part → record.
    ///
    /// Every resource is held through a guard, so an early return (including
    /// cancellation) puts tools and parts back.
    pub async fn assemble_once(
        &self,
        worker_id: usize,
        cancel: &CancellationToken,
    ) -> Result<Unit, ProductionError> {
        let part = self.parts.acquire(cancel).await?;
        let tools = self.tools.acquire_pair(worker_id, self.order, cancel).await?;

        let unit = Unit::assemble(&self.ids, self.station_id, worker_id, self.belt.len());
        let record = unit.clone();
        match self.belt.enqueue(unit, cancel).await {
            Ok(occupancy) => {
                debug!(
                    station = self.station_id,
                    worker = worker_id,
                    unit_id = record.id(),
                    occupancy,
                    "Unit placed on belt"
                );
            }
            Err(BeltError::EnqueueCancelled(unit)) => {
                warn!(
                    station = self.station_id,
                    worker = worker_id,
                    unit_id = unit.id(),
                    "Shutdown before the belt had room, unit scrapped"
                );
                return Err(ProductionError::Cancelled);
            }
            Err(e) => return Err(e.into()),
        }

        tools.release();
        part.release();

        info!(station = self.station_id, worker = worker_id, unit = %record, "Produced");
        self.events.record(FactoryEvent::Produced {
            unit: record.clone(),
        });
        Ok(record)
    }

    /// Runs `cycles` production cycles back to back, without the pause.
    ///
    /// Returns the number of units produced.
    pub async fn run_cycles(
        &self,
        worker_id: usize,
        cycles: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, ProductionError> {
        for _ in 0..cycles {
            self.assemble_once(worker_id, cancel).await?;
        }
        Ok(cycles)
    }

    /// The worker loop: assemble, pause, repeat until `cancel` fires.
    pub async fn run_worker(
        self: Arc<Self>,
        worker_id: usize,
        cancel: CancellationToken,
    ) -> WorkerReport {
        info!(station = self.station_id, worker = worker_id, "Worker started");
        let mut produced = 0;

        loop {
            match self.assemble_once(worker_id, &cancel).await {
                Ok(_) => produced += 1,
                Err(ProductionError::Cancelled) => break,
                Err(e) => {
                    warn!(station = self.station_id, worker = worker_id, error = %e, "Worker failed");
                    break;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(station = self.station_id, worker = worker_id, produced, "Worker stopped");
        WorkerReport {
            station_id: self.station_id,
            worker_id,
            produced,
        }
    }

    /// Spawns one task per worker.
    pub fn spawn_workers(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<WorkerReport>> {
        (0..self.workers())
            .map(|worker_id| tokio::spawn(self.clone().run_worker(worker_id, cancel.clone())))
            .collect()
    }
}
