//! Error types for the production side.

use thiserror::Error;

use crate::belt::BeltError;

/// Errors that can occur while assembling units.
///
/// Waiting on parts, tools or belt space is not an error; only shutdown and
/// bad topology surface here.
#[derive(Debug, Error, PartialEq)]
pub enum ProductionError {
    /// The shutdown signal fired while the worker was parked.
    #[error("Production cancelled")]
    Cancelled,

    /// A tool ring needs at least two tools so each worker holds two distinct ones.
    #[error("Tool ring needs at least 2 tools, got {0}")]
    RingTooSmall(usize),

    /// Worker index outside the station's ring.
    #[error("Worker {worker} does not exist at a station with {workers} workers")]
    UnknownWorker { worker: usize, workers: usize },

    /// Tool index outside the station's ring.
    #[error("Tool {tool} does not exist in a ring of {tools} tools")]
    UnknownTool { tool: usize, tools: usize },

    /// A pool or tool semaphore was closed underneath a waiting worker.
    #[error("Resource closed: {0}")]
    ResourceClosed(&'static str),

    /// The belt refused the unit.
    #[error("Belt error: {0}")]
    Belt(#[from] BeltError),
}
