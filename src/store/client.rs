use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use super::StoreError;
use crate::distribution::protocol::{self, Request, Response, DEFAULT_TIMEOUT};
use crate::model::Unit;

/// Source of units for a store.
///
/// [`FactoryClient`] talks to a real factory over TCP; tests plug in
/// in-process suppliers.
#[async_trait]
pub trait VehicleSupplier: Send + Sync {
    /// Requests one unit for `store_name`, reporting the store's own
    /// inventory size as `store_belt_position`. Waits until the factory has a
    /// unit to give.
    async fn request_vehicle(
        &self,
        store_name: &str,
        store_belt_position: u32,
    ) -> Result<Unit, StoreError>;
}

/// TCP client for the factory's distribution server.
///
/// Each request opens its own connection. The write side stays open until
/// the reply arrives: the factory reads a closed connection as the store
/// giving up.
#[derive(Debug, Clone)]
pub struct FactoryClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl FactoryClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bounds connecting and sending. Waiting for the reply is unbounded since
    /// an empty belt legitimately delays it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl VehicleSupplier for FactoryClient {
    #[instrument(skip(self), fields(factory = %self.addr))]
    async fn request_vehicle(
        &self,
        store_name: &str,
        store_belt_position: u32,
    ) -> Result<Unit, StoreError> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| StoreError::ConnectTimeout(self.addr))?
            .map_err(|source| StoreError::Connect {
                addr: self.addr,
                source,
            })?;

        let request = Request::request_vehicle(store_name, store_belt_position);
        protocol::send(&mut stream, &request, self.timeout).await?;
        debug!("Request sent, waiting for a unit");

        let body = protocol::read_message(&mut stream).await?;
        match protocol::decode::<Response>(&body)? {
            Response::Vehicle { unit } => Ok(unit),
            Response::Error { code, message } => Err(StoreError::Rejected { code, message }),
        }
    }
}
