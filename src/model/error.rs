//! Error types for the [`Unit`](super::Unit) entity.

use thiserror::Error;

use super::UnitId;

/// Errors raised when mutating a unit after construction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UnitError {
    /// The destination tag is written exactly once.
    #[error("Unit {id} already belongs to {current}")]
    DestinationAlreadySet { id: UnitId, current: String },
}
