//! Error types for the distribution server.

use std::net::SocketAddr;
use thiserror::Error;

use super::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum DistributionError {
    /// The listener could not bind. Fatal at startup.
    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener error: {0}")]
    Listener(#[source] std::io::Error),

    /// A single exchange failed; other connections are unaffected.
    #[error("Connection error: {0}")]
    Protocol(#[from] ProtocolError),
}
