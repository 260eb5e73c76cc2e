mod api;
mod config;
mod database;
mod models;
mod protocol;
mod sensors;
mod utils;

use log::{error, info};
use std::sync::Arc;
use time::OffsetDateTime;

use config::{resolve_output_dir, DeviceConfig, GatewayConfig};
use database::{CsvStore, PostgresStore, ReadingStore};
use protocol::Gateway;
use sensors::SensorRegistry;
use utils::{format_datetime, SystemClock};

async fn open_store(
    config: &GatewayConfig,
    devices: &DeviceConfig,
) -> Result<ReadingStore, Box<dyn std::error::Error>> {
    match &config.database_url {
        Some(url) => Ok(ReadingStore::Postgres(PostgresStore::connect(url).await?)),
        None => {
            let directory = resolve_output_dir(config, devices);
            Ok(ReadingStore::Csv(CsvStore::open(directory).await?))
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Gateway terminated by user. Exiting gracefully."),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let devices = match DeviceConfig::from_file(&config.devices_path) {
        Ok(devices) => devices,
        Err(e) => {
            error!("Failed to load devices: {}", e);
            return Err(e.into());
        }
    };

    let store = match open_store(&config, &devices).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open reading store: {}", e);
            return Err(e);
        }
    };

    let gateway = Gateway::new(
        devices.directory,
        devices.settings,
        store,
        Arc::new(SystemClock),
        config.unknown_sensor_policy,
    );

    info!("Starting garden sensor gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Sensor codes known: {}", SensorRegistry::builtin().len());
    info!("Reading store: {}", gateway.store().describe());
    info!("Unknown sensor codes: {:?}", config.unknown_sensor_policy);
    if let Ok(changed) = OffsetDateTime::from_unix_timestamp(gateway.last_config_change()) {
        info!("Configuration loaded at: {}", format_datetime(&changed));
    }

    let app = api::build_router(Arc::new(gateway));

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind_addr, e);
            return Err(e.into());
        }
    };
    info!("Listening on http://{}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
