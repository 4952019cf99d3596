use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vehicle_factory::belt::ConveyorBelt;
use vehicle_factory::distribution::protocol::{self, read_message, write_message, ProtocolError, Request};
use vehicle_factory::distribution::{
    DistributionError, DistributionServer, DistributionStats, ErrorCode, Response,
};
use vehicle_factory::events::EventLog;
use vehicle_factory::model::{Unit, UnitIdIssuer};
use vehicle_factory::store::{FactoryClient, StoreError, VehicleSupplier};

struct Harness {
    addr: SocketAddr,
    belt: Arc<ConveyorBelt>,
    stats: Arc<DistributionStats>,
    cancel: CancellationToken,
    server: JoinHandle<()>,
}

async fn start_server(belt_capacity: usize) -> Harness {
    start_server_with_timeout(belt_capacity, protocol::DEFAULT_TIMEOUT).await
}

async fn start_server_with_timeout(belt_capacity: usize, request_timeout: Duration) -> Harness {
    let belt = Arc::new(ConveyorBelt::new(belt_capacity));
    let server = DistributionServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        belt.clone(),
        EventLog::disabled(),
    )
    .await
    .expect("Failed to bind")
    .with_request_timeout(request_timeout);
    let addr = server.local_addr().unwrap();
    let stats = server.stats();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(server.serve(cancel.clone()));
    Harness {
        addr,
        belt,
        stats,
        cancel,
        server,
    }
}

async fn put_unit(belt: &ConveyorBelt, ids: &UnitIdIssuer, station: usize, worker: usize) -> Unit {
    let unit = Unit::assemble(ids, station, worker, belt.len());
    belt.enqueue(unit.clone(), &CancellationToken::new())
        .await
        .expect("Failed to enqueue");
    unit
}

async fn raw_exchange(addr: SocketAddr, body: &[u8]) -> Response {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_message(&mut stream, body).await.unwrap();
    let reply = read_message(&mut stream).await.expect("No reply");
    protocol::decode(&reply).expect("Reply is not a response")
}

/// A unit crosses the wire unchanged except for its destination.
#[tokio::test]
async fn test_round_trip_preserves_unit_fields() {
    let harness = start_server(4).await;
    let ids = UnitIdIssuer::new();
    put_unit(&harness.belt, &ids, 1, 0).await;
    let sent = put_unit(&harness.belt, &ids, 3, 4).await;

    let client = FactoryClient::new(harness.addr);
    let first = client.request_vehicle("Store A", 0).await.unwrap();
    let received = client.request_vehicle("Store B", 1).await.expect("Request failed");

    assert_ne!(first.id(), received.id());
    assert_eq!(received.id(), sent.id());
    assert_eq!(received.color(), sent.color());
    assert_eq!(received.kind(), sent.kind());
    assert_eq!(received.station_id(), 3);
    assert_eq!(received.worker_id(), 4);
    assert_eq!(received.belt_position(), sent.belt_position());
    assert_eq!(sent.destination(), None);
    assert_eq!(received.destination(), Some("Store B"));

    harness.cancel.cancel();
    harness.server.await.unwrap();
    assert_eq!(harness.stats.snapshot().served, 2);
}

/// Garbage gets an explicit error reply and does not touch the belt.
#[tokio::test]
async fn test_malformed_request_gets_error_response() {
    let harness = start_server(2).await;
    put_unit(&harness.belt, &UnitIdIssuer::new(), 1, 1).await;

    let reply = raw_exchange(harness.addr, b"{\"type\":\"request_vehicle\"}").await;
    assert!(matches!(reply, Response::Error { code: ErrorCode::Malformed, .. }));

    let reply = raw_exchange(
        harness.addr,
        br#"{"type":"request_vehicle","version":99,"store_name":"Store A","store_belt_position":0}"#,
    )
    .await;
    assert!(matches!(reply, Response::Error { code: ErrorCode::UnsupportedVersion, .. }));

    assert_eq!(harness.belt.len(), 1, "Rejected requests must not take units");
    assert_eq!(harness.stats.snapshot().rejected, 2);
    harness.cancel.cancel();
}

async fn read_reply(stream: &mut TcpStream) -> Response {
    let reply = tokio::time::timeout(Duration::from_secs(2), read_message(stream))
        .await
        .expect("Reply never arrived")
        .expect("No reply");
    protocol::decode(&reply).expect("Reply is not a response")
}

/// Frames cut short get an explicit error reply, whether the store stalls or
/// stops writing.
#[tokio::test]
async fn test_truncated_request_gets_error_response() {
    let harness = start_server_with_timeout(2, Duration::from_millis(300)).await;
    put_unit(&harness.belt, &UnitIdIssuer::new(), 1, 1).await;

    // Prefix announces 10 bytes, only 3 arrive, line left open.
    let mut short_body = TcpStream::connect(harness.addr).await.unwrap();
    short_body.write_all(&10u32.to_be_bytes()).await.unwrap();
    short_body.write_all(b"{\"t").await.unwrap();
    let reply = read_reply(&mut short_body).await;
    assert!(matches!(reply, Response::Error { code: ErrorCode::Malformed, .. }));

    // Less than a prefix, line left open.
    let mut stalled = TcpStream::connect(harness.addr).await.unwrap();
    stalled.write_all(b"hi").await.unwrap();
    let reply = read_reply(&mut stalled).await;
    assert!(matches!(reply, Response::Error { code: ErrorCode::Malformed, .. }));

    // Less than a prefix, then the store stops writing.
    let mut closed = TcpStream::connect(harness.addr).await.unwrap();
    closed.write_all(b"hi").await.unwrap();
    closed.shutdown().await.unwrap();
    let reply = read_reply(&mut closed).await;
    assert!(matches!(reply, Response::Error { code: ErrorCode::Malformed, .. }));

    assert_eq!(harness.belt.len(), 1, "Rejected requests must not take units");
    let stats = harness.stats.snapshot();
    assert_eq!(stats.rejected, 3);
    assert_eq!(stats.failed, 0);
    harness.cancel.cancel();
}

/// A store may stop writing once its request is out; with a unit on the
/// belt it is served every time.
#[tokio::test]
async fn test_half_closed_store_is_served_from_stocked_belt() {
    let harness = start_server(4).await;
    let ids = UnitIdIssuer::new();

    for round in 0..20 {
        let expected = put_unit(&harness.belt, &ids, 1, 0).await;
        let mut stream = TcpStream::connect(harness.addr).await.unwrap();
        protocol::send(&mut stream, &Request::request_vehicle("Store A", round), Duration::from_secs(1))
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        match read_reply(&mut stream).await {
            Response::Vehicle { unit } => assert_eq!(unit.id(), expected.id()),
            other => panic!("round {round}: unexpected reply {other:?}"),
        }
    }

    harness.cancel.cancel();
    harness.server.await.unwrap();
    let stats = harness.stats.snapshot();
    assert_eq!(stats.served, 20);
    assert_eq!(stats.abandoned, 0);
}

/// Stopping writing while the belt is empty withdraws the request.
#[tokio::test]
async fn test_half_closed_store_withdraws_request_on_empty_belt() {
    let harness = start_server(2).await;

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    protocol::send(&mut stream, &Request::request_vehicle("Store A", 0), Duration::from_secs(1))
        .await
        .unwrap();
    stream.shutdown().await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), read_message(&mut stream))
        .await
        .expect("Connection left open");
    assert!(matches!(reply, Err(ProtocolError::ConnectionClosed)));

    put_unit(&harness.belt, &UnitIdIssuer::new(), 1, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.belt.len(), 1);
    assert_eq!(harness.stats.snapshot().abandoned, 1);
    harness.cancel.cancel();
}

/// A request against an empty belt is answered by the next unit produced.
#[tokio::test]
async fn test_request_waits_for_production() {
    let harness = start_server(2).await;
    let client = FactoryClient::new(harness.addr);
    let pending = tokio::spawn(async move { client.request_vehicle("Store C", 0).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!pending.is_finished(), "Reply sent before any unit existed");

    let produced = put_unit(&harness.belt, &UnitIdIssuer::starting_at(42), 2, 1).await;
    let received = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("Reply never arrived")
        .unwrap()
        .unwrap();

    assert_eq!(received.id(), produced.id());
    assert_eq!(received.id(), 42);
    harness.cancel.cancel();
}

/// Broken connections fail on their own; the next store is still served.
#[tokio::test]
async fn test_failed_connections_are_isolated() {
    let harness = start_server(2).await;
    put_unit(&harness.belt, &UnitIdIssuer::new(), 1, 1).await;

    // Oversized length prefix.
    let mut oversized = TcpStream::connect(harness.addr).await.unwrap();
    oversized.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
    let reply = read_message(&mut oversized).await.unwrap();
    let reply: Response = protocol::decode(&reply).unwrap();
    assert!(matches!(reply, Response::Error { code: ErrorCode::Malformed, .. }));

    // Connect and leave without a word.
    drop(TcpStream::connect(harness.addr).await.unwrap());

    let unit = FactoryClient::new(harness.addr)
        .request_vehicle("Store A", 0)
        .await
        .expect("Healthy store was not served");
    assert_eq!(unit.destination(), Some("Store A"));
    harness.cancel.cancel();
    harness.server.await.unwrap();
}

/// A store that hangs up while waiting does not cost the factory a unit.
#[tokio::test]
async fn test_store_hanging_up_leaves_belt_untouched() {
    let harness = start_server(2).await;

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    let request = Request::request_vehicle("Store A", 0);
    protocol::send(&mut stream, &request, Duration::from_secs(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(stream);
    tokio::time::sleep(Duration::from_millis(100)).await;

    put_unit(&harness.belt, &UnitIdIssuer::new(), 1, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.belt.len(), 1);
    let stats = harness.stats.snapshot();
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.served, 0);
    harness.cancel.cancel();
}

/// Stores parked on an empty belt are told the factory is closing.
#[tokio::test]
async fn test_shutdown_answers_waiting_store_unavailable() {
    let harness = start_server(2).await;
    let client = FactoryClient::new(harness.addr);
    let pending = tokio::spawn(async move { client.request_vehicle("Store A", 0).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    harness.cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        result,
        Err(StoreError::Rejected { code: ErrorCode::Unavailable, .. })
    ));
    tokio::time::timeout(Duration::from_secs(2), harness.server)
        .await
        .expect("Server did not stop")
        .unwrap();
    assert_eq!(harness.stats.snapshot().unavailable, 1);
}

#[tokio::test]
async fn test_bind_fails_on_occupied_port() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();

    let result = DistributionServer::bind(addr, Arc::new(ConveyorBelt::new(1)), EventLog::disabled()).await;
    match result {
        Err(DistributionError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("bound an occupied port"),
    }
}
