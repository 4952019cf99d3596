use std::path::PathBuf;
use tracing::{error, info};
use vehicle_factory::config::FactoryConfig;
use vehicle_factory::lifecycle::{setup_tracing, FactoryError, FactorySystem, RetailSystem};

#[tokio::main]
async fn main() -> Result<(), FactoryError> {
    setup_tracing();

    let config = FactoryConfig::load_or_default(std::env::args_os().nth(1).map(PathBuf::from))
        .inspect_err(|e| error!(error = %e, "Cannot load configuration"))?;

    let factory = FactorySystem::start(&config)
        .await
        .inspect_err(|e| error!(error = %e, "Factory failed to start"))?;

    let retail = RetailSystem::start(
        &config.retail,
        factory.local_addr(),
        config.network.request_timeout(),
        factory.events(),
    );

    info!("Running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl-C, stopping now");
    }

    let retail_report = retail.shutdown().await?;
    let factory_report = factory.shutdown().await?;
    info!(?retail_report, ?factory_report, "Simulation finished");
    Ok(())
}
