//! Error types for the conveyor belt.

use thiserror::Error;

use crate::model::Unit;

/// Errors returned by [`ConveyorBelt`](super::ConveyorBelt) operations.
///
/// A full or empty belt is never an error: callers simply wait.
#[derive(Debug, Error, PartialEq)]
pub enum BeltError {
    /// A blocked `dequeue` was interrupted by the shutdown signal.
    #[error("Belt operation cancelled")]
    Cancelled,

    /// A blocked `enqueue` was interrupted. The unit never reached the belt and
    /// is handed back to the producer.
    #[error("Enqueue cancelled, unit {} was not placed on the belt", .0.id())]
    EnqueueCancelled(Box<Unit>),

    /// The belt was closed during shutdown.
    #[error("Belt is closed")]
    Closed,
}
