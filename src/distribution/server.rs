//! TCP listener and per-connection handling.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::{self, ErrorCode, ProtocolError, Rejection, Request, Response, DEFAULT_TIMEOUT};
use super::DistributionError;
use crate::belt::ConveyorBelt;
use crate::events::{EventLog, FactoryEvent};
use crate::model::UnitId;

/// Counters shared by every connection handler.
#[derive(Debug, Default)]
pub struct DistributionStats {
    served: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
    undeliverable: AtomicU64,
    abandoned: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`DistributionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Units written back to a store.
    pub served: u64,
    /// Malformed or wrong-version requests.
    pub rejected: u64,
    /// Requests answered with `unavailable` (shutdown while waiting).
    pub unavailable: u64,
    /// Units taken off the belt that never reached their store.
    pub undeliverable: u64,
    /// Stores that left before a unit was taken for them.
    pub abandoned: u64,
    /// Connections that failed on transport.
    pub failed: u64,
}

impl DistributionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            served: self.served.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            undeliverable: self.undeliverable.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// How a single exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered(UnitId),
    Rejected(ErrorCode),
    Undeliverable(UnitId),
    Abandoned,
}

/// Exposes the belt to remote stores.
///
/// Every accepted connection runs in its own task and carries exactly one
/// request/response exchange. A failing connection never reaches the belt,
/// the listener or any other connection.
pub struct DistributionServer {
    listener: TcpListener,
    ctx: ConnectionContext,
}

#[derive(Clone)]
struct ConnectionContext {
    belt: Arc<ConveyorBelt>,
    events: EventLog,
    stats: Arc<DistributionStats>,
    request_timeout: Duration,
}

impl DistributionServer {
    /// Binds the listener. Nothing is served until [`DistributionServer::serve`].
    ///
    /// # Errors
    /// [`DistributionError::Bind`] if the address is unavailable.
    pub async fn bind(
        addr: SocketAddr,
        belt: Arc<ConveyorBelt>,
        events: EventLog,
    ) -> Result<Self, DistributionError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| DistributionError::Bind { addr, source })?;
        Ok(Self {
            listener,
            ctx: ConnectionContext {
                belt,
                events,
                stats: Arc::new(DistributionStats::default()),
                request_timeout: DEFAULT_TIMEOUT,
            },
        })
    }

    /// Time allowed for a store to send its request and receive its reply.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.ctx.request_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DistributionError> {
        self.listener.local_addr().map_err(DistributionError::Listener)
    }

    pub fn stats(&self) -> Arc<DistributionStats> {
        self.ctx.stats.clone()
    }

    /// Accepts connections until `cancel` fires, then waits for in-flight
    /// handlers (which observe the same token) to finish.
    pub async fn serve(self, cancel: CancellationToken) {
        let addr = self.listener.local_addr().ok();
        info!(?addr, "Distribution server started");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Store connected");
                        connections.spawn(serve_connection(self.ctx.clone(), stream, peer, cancel.clone()));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task panicked");
                    }
                }
            }
        }

        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Connection task panicked");
            }
        }
        info!(stats = ?self.ctx.stats.snapshot(), "Distribution server stopped");
    }
}

async fn serve_connection(
    ctx: ConnectionContext,
    stream: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
) {
    match handle_connection(&ctx, stream, peer, &cancel).await {
        Ok(outcome) => debug!(%peer, ?outcome, "Connection closed"),
        Err(e) => {
            DistributionStats::bump(&ctx.stats.failed);
            warn!(%peer, error = %e, "Connection failed");
        }
    }
}

async fn handle_connection(
    ctx: &ConnectionContext,
    stream: TcpStream,
    peer: SocketAddr,
    cancel: &CancellationToken,
) -> Result<Outcome, DistributionError> {
    let (mut reader, mut writer) = stream.into_split();

    let body = match protocol::read_message_within(&mut reader, ctx.request_timeout).await {
        Ok(body) => body,
        Err(ProtocolError::ConnectionClosed) => {
            debug!(%peer, "Store left before sending a request");
            DistributionStats::bump(&ctx.stats.abandoned);
            return Ok(Outcome::Abandoned);
        }
        Err(ProtocolError::MessageTooLarge(len)) => {
            let rejection = Rejection::new(
                ErrorCode::Malformed,
                format!("message of {} bytes is too large", len),
            );
            return reject(ctx, &mut writer, peer, rejection).await;
        }
        Err(e @ (ProtocolError::Timeout | ProtocolError::Truncated)) => {
            let rejection = Rejection::new(ErrorCode::Malformed, format!("incomplete request: {e}"));
            return reject(ctx, &mut writer, peer, rejection).await;
        }
        Err(e) => return Err(e.into()),
    };

    let order = match protocol::decode::<Request>(&body)
        .map_err(|e| Rejection::new(ErrorCode::Malformed, e.to_string()))
        .and_then(Request::validate)
    {
        Ok(order) => order,
        Err(rejection) => return reject(ctx, &mut writer, peer, rejection).await,
    };
    info!(
        %peer,
        store = %order.store_name,
        store_belt_position = order.store_belt_position,
        "Vehicle requested"
    );

    // A unit already on the belt wins over an end of stream.
    let taken = tokio::select! {
        biased;
        taken = ctx.belt.dequeue(cancel) => taken,
        _ = hung_up(&mut reader) => {
            info!(%peer, store = %order.store_name, "Store hung up while waiting for a unit");
            DistributionStats::bump(&ctx.stats.abandoned);
            return Ok(Outcome::Abandoned);
        }
    };
    let mut unit = match taken {
        Ok(unit) => unit,
        Err(e) => {
            let rejection = Rejection::new(ErrorCode::Unavailable, e.to_string());
            return reject(ctx, &mut writer, peer, rejection).await;
        }
    };

    if let Err(e) = unit.assign_destination(&order.store_name) {
        warn!(unit_id = unit.id(), error = %e, "Unit already had a destination");
    }
    ctx.events.record(FactoryEvent::Sold {
        unit: unit.clone(),
        store_name: order.store_name.clone(),
        store_belt_position: order.store_belt_position,
    });

    let unit_id = unit.id();
    let response = Response::Vehicle { unit };
    match protocol::send(&mut writer, &response, ctx.request_timeout).await {
        Ok(()) => {
            DistributionStats::bump(&ctx.stats.served);
            info!(%peer, store = %order.store_name, unit_id, "Vehicle sent");
            Ok(Outcome::Delivered(unit_id))
        }
        Err(e) => {
            DistributionStats::bump(&ctx.stats.undeliverable);
            warn!(%peer, store = %order.store_name, unit_id, error = %e, "Unit could not be delivered");
            if let Response::Vehicle { unit } = response {
                ctx.events.record(FactoryEvent::Undeliverable {
                    unit,
                    store_name: order.store_name,
                    reason: e.to_string(),
                });
            }
            Ok(Outcome::Undeliverable(unit_id))
        }
    }
}

async fn reject(
    ctx: &ConnectionContext,
    writer: &mut OwnedWriteHalf,
    peer: SocketAddr,
    rejection: Rejection,
) -> Result<Outcome, DistributionError> {
    let code = rejection.code;
    match code {
        ErrorCode::Unavailable => DistributionStats::bump(&ctx.stats.unavailable),
        ErrorCode::Malformed | ErrorCode::UnsupportedVersion => {
            DistributionStats::bump(&ctx.stats.rejected)
        }
    }
    warn!(%peer, ?code, reason = %rejection.message, "Request rejected");
    protocol::send(writer, &Response::from(rejection), ctx.request_timeout).await?;
    Ok(Outcome::Rejected(code))
}

/// Resolves once the store stops writing, by closing or by shutting down its
/// write half. Stray bytes after the request are ignored.
async fn hung_up(reader: &mut OwnedReadHalf) {
    let mut scratch = [0u8; 64];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}
