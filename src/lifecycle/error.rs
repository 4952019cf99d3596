use thiserror::Error;

use crate::config::ConfigError;
use crate::distribution::DistributionError;
use crate::production::ProductionError;

/// Failures that stop the simulation from starting or shutting down cleanly.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error(transparent)]
    Production(#[from] ProductionError),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
