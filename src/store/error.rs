//! Error types for the store side.

use std::net::SocketAddr;
use thiserror::Error;

use crate::belt::BeltError;
use crate::distribution::protocol::ProtocolError;
use crate::distribution::ErrorCode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot reach factory at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to factory at {0}")]
    ConnectTimeout(SocketAddr),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The factory answered with an error response.
    #[error("Factory refused request ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("Store operation cancelled")]
    Cancelled,

    #[error("Store inventory is closed")]
    InventoryClosed,

    #[error("Customer has no stores to buy from")]
    NoStores,
}

impl From<BeltError> for StoreError {
    fn from(e: BeltError) -> Self {
        match e {
            BeltError::Cancelled | BeltError::EnqueueCancelled(_) => StoreError::Cancelled,
            BeltError::Closed => StoreError::InventoryClosed,
        }
    }
}
