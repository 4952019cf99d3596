use std::collections::HashSet;
use std::time::Duration;
use tokio::net::TcpListener;
use vehicle_factory::config::{ConfigError, FactoryConfig};
use vehicle_factory::distribution::DistributionError;
use vehicle_factory::events::{FactoryEvent, FileSink, MemorySink};
use vehicle_factory::lifecycle::{FactoryError, FactorySystem, RetailSystem};

fn fast_config() -> FactoryConfig {
    let mut config = FactoryConfig::default();
    config.network.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.production.max_parts = 10;
    config.production.stations = 2;
    config.production.workers_per_station = 3;
    config.production.interval_ms = 5;
    config.belt.capacity = 4;
    config.retail.stores = vec!["Store A".to_string(), "Store B".to_string()];
    config.retail.store_capacity = 3;
    config.retail.request_interval_ms = 5;
    config.retail.customers = 4;
    config.retail.max_pause_ms = 5;
    config
}

/// Full end-to-end run: stations produce, stores buy over TCP, customers
/// buy from stores, and everything shuts down with a consistent record.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_factory_and_retail_end_to_end() {
    let config = fast_config();
    let (sink, events) = MemorySink::new();
    let factory = FactorySystem::start_with_sink(&config, sink)
        .await
        .expect("Factory failed to start");
    let retail = RetailSystem::start(
        &config.retail,
        factory.local_addr(),
        config.network.request_timeout(),
        factory.events(),
    );

    // Run until some customer has bought something.
    let purchased = async {
        loop {
            if factory.stats().served >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), purchased)
        .await
        .expect("No unit reached a store");

    let retail_report = retail.shutdown().await.expect("Retail shutdown failed");
    let report = factory.shutdown().await.expect("Factory shutdown failed");

    assert!(report.produced >= report.distribution.served);
    assert!(report.distribution.served >= 3);
    assert_eq!(report.events_dropped, 0);
    assert!(retail_report.stocked >= retail_report.purchases);

    let recorded = events.snapshot();
    assert_eq!(recorded.len() as u64, report.events_written);

    let produced: HashSet<_> = recorded
        .iter()
        .filter(|e| matches!(e, FactoryEvent::Produced { .. }))
        .map(|e| e.unit().id())
        .collect();
    let mut sold = HashSet::new();
    for event in &recorded {
        if let FactoryEvent::Sold { unit, store_name, .. } = event {
            assert!(config.retail.stores.contains(store_name));
            assert_eq!(unit.destination(), Some(store_name.as_str()));
            assert!(produced.contains(&unit.id()), "Sold a unit never produced");
            assert!(sold.insert(unit.id()), "Unit {} sold twice", unit.id());
        }
    }
    assert!(!sold.is_empty());

    let purchases = recorded
        .iter()
        .filter(|e| matches!(e, FactoryEvent::Purchased { .. }))
        .count() as u64;
    assert_eq!(purchases, retail_report.purchases);
}

#[tokio::test]
async fn test_start_fails_when_port_is_taken() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = fast_config();
    config.network.listen_addr = taken.local_addr().unwrap();

    let (sink, events) = MemorySink::new();
    let result = FactorySystem::start_with_sink(&config, sink).await;

    assert!(matches!(
        result,
        Err(FactoryError::Distribution(DistributionError::Bind { .. }))
    ));
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_start_rejects_invalid_config() {
    let mut config = fast_config();
    config.production.workers_per_station = 1;

    let (sink, _events) = MemorySink::new();
    let result = FactorySystem::start_with_sink(&config, sink).await;
    assert!(matches!(
        result,
        Err(FactoryError::Config(ConfigError::Invalid(_)))
    ));
}

/// With the file sink, production lands in the production log as JSON lines.
#[tokio::test]
async fn test_factory_writes_event_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config();
    config.events.dir = dir.path().to_path_buf();

    let factory = FactorySystem::start_with_sink(&config, FileSink::new(dir.path()))
        .await
        .unwrap();
    let belt = factory.belt().clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while belt.len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Nothing was produced");

    let report = factory.shutdown().await.unwrap();
    assert!(report.produced >= 2);

    let text = std::fs::read_to_string(dir.path().join("factory_production.log")).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len() as u64, report.produced);
    for line in lines {
        let event: FactoryEvent = serde_json::from_str(line).unwrap();
        assert!(matches!(event, FactoryEvent::Produced { .. }));
    }
}
