use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::FactoryError;
use crate::belt::ConveyorBelt;
use crate::config::FactoryConfig;
use crate::distribution::{DistributionServer, DistributionStats, StatsSnapshot};
use crate::events::{EventLog, EventRecorder, EventSink, FileSink};
use crate::model::UnitIdIssuer;
use crate::production::{AssemblyStation, PartsPool, WorkerReport};

/// What the factory did between start and shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Units built, summed over every worker.
    pub produced: u64,
    /// Units still on the belt when production stopped.
    pub left_on_belt: usize,
    pub distribution: StatsSnapshot,
    pub events_written: u64,
    pub events_dropped: u64,
}

/// The running factory: stations, belt, distribution server and event
/// recorder, each in its own task(s).
///
/// # Example
///
/// ```ignore
/// let system = FactorySystem::start(&config).await?;
/// println!("serving on {}", system.local_addr());
/// // ...
/// let report = system.shutdown().await?;
/// ```
pub struct FactorySystem {
    local_addr: SocketAddr,
    belt: Arc<ConveyorBelt>,
    parts: Arc<PartsPool>,
    stations: Vec<Arc<AssemblyStation>>,
    events: EventLog,
    stats: Arc<DistributionStats>,

    /// Stops production and serving.
    cancel: CancellationToken,
    /// Stops the recorder, fired only after everything else has finished.
    recorder_cancel: CancellationToken,

    workers: Vec<JoinHandle<WorkerReport>>,
    server: JoinHandle<()>,
    recorder: JoinHandle<u64>,
}

impl FactorySystem {
    /// Starts the factory with events written to `config.events.dir`.
    pub async fn start(config: &FactoryConfig) -> Result<Self, FactoryError> {
        Self::start_with_sink(config, FileSink::new(&config.events.dir)).await
    }

    /// Starts the factory, recording events into `sink`.
    ///
    /// The listener is bound before anything is spawned: if the address is
    /// taken, the error is returned and no task is left running.
    pub async fn start_with_sink<S: EventSink>(
        config: &FactoryConfig,
        sink: S,
    ) -> Result<Self, FactoryError> {
        config.validate()?;
        let production = &config.production;

        let belt = Arc::new(ConveyorBelt::new(config.belt.capacity));
        let (recorder, events) = EventRecorder::new(config.events.buffer, sink);

        let server = DistributionServer::bind(config.network.listen_addr, belt.clone(), events.clone())
            .await?
            .with_request_timeout(config.network.request_timeout());
        let local_addr = server.local_addr()?;
        let stats = server.stats();

        let parts = Arc::new(PartsPool::new(production.max_parts));
        let ids = UnitIdIssuer::new();
        let stations = (1..=production.stations)
            .map(|station_id| {
                AssemblyStation::new(
                    station_id,
                    production.workers_per_station,
                    parts.clone(),
                    belt.clone(),
                    ids.clone(),
                    events.clone(),
                    production.acquire_order,
                    production.interval(),
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cancel = CancellationToken::new();
        let recorder_cancel = CancellationToken::new();

        let recorder = tokio::spawn(recorder.run(recorder_cancel.clone()));
        let workers = stations
            .iter()
            .flat_map(|station| station.spawn_workers(&cancel))
            .collect();
        let server = tokio::spawn(server.serve(cancel.clone()));

        info!(
            addr = %local_addr,
            stations = stations.len(),
            workers = config.total_workers(),
            parts = production.max_parts,
            belt = config.belt.capacity,
            order = ?production.acquire_order,
            "Factory started"
        );

        Ok(Self {
            local_addr,
            belt,
            parts,
            stations,
            events,
            stats,
            cancel,
            recorder_cancel,
            workers,
            server,
            recorder,
        })
    }

    /// Address the distribution server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle for recording into the factory's event log.
    pub fn events(&self) -> EventLog {
        self.events.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn belt(&self) -> &Arc<ConveyorBelt> {
        &self.belt
    }

    pub fn parts(&self) -> &Arc<PartsPool> {
        &self.parts
    }

    pub fn stations(&self) -> &[Arc<AssemblyStation>] {
        &self.stations
    }

    /// Stops production and serving, waits for every task, then flushes the
    /// event record.
    ///
    /// Workers parked on a full belt give up their unit (it is logged as
    /// scrapped); stores waiting on an empty belt get an `unavailable` reply.
    pub async fn shutdown(self) -> Result<ShutdownReport, FactoryError> {
        info!("Shutting down factory...");
        self.cancel.cancel();

        let mut produced = 0;
        for worker in self.workers {
            produced += worker.await?.produced;
        }
        self.server.await?;

        self.belt.close();
        let leftovers = self.belt.drain();
        for unit in &leftovers {
            debug!(unit = %unit, "Left on belt");
        }

        let events_dropped = self.events.dropped();
        drop(self.events);
        drop(self.stations);
        self.recorder_cancel.cancel();
        let events_written = self.recorder.await?;

        let report = ShutdownReport {
            produced,
            left_on_belt: leftovers.len(),
            distribution: self.stats.snapshot(),
            events_written,
            events_dropped,
        };
        info!(?report, "Factory shutdown complete.");
        Ok(report)
    }
}
