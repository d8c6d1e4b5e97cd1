//! OBD-II Telemetry Daemon
//!
//! Wires a transport (serial adapter or simulator) to the protocol client,
//! the polling loop and the file-backed odometer, and logs what comes out.

mod config;

pub use self::config::{AppConfig, SerialConfig, TransportKind, DEFAULT_CONFIG_FILE};

use metrics_exporter_prometheus::PrometheusBuilder;
use obd_poller::{PollerError, PollingLoop};
use obd_protocol::{
    is_supported, ObdClient, ObdError, SerialTransport, Transport, VehicleSample, POLL_CYCLE,
};
use obd_simulator::SimulatedAdapter;
use odometer::{OdometerError, OdometerReading, OdometerReconciler, TankCalibration};
use std::sync::Arc;
use storage::JsonFileStore;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Buffered samples before the poller waits on the consumer
const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Adapter error: {0}")]
    Adapter(#[from] ObdError),

    #[error("Odometer error: {0}")]
    Odometer(#[from] OdometerError),

    #[error("Polling stopped: {0}")]
    Poller(#[from] PollerError),

    #[error("Invalid log level: {0}")]
    LogLevel(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),
}

/// Initialize logging
pub fn init_logging(level: &str) -> Result<(), DaemonError> {
    let level: Level = level
        .parse()
        .map_err(|_| DaemonError::LogLevel(level.to_string()))?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| DaemonError::Logging(e.to_string()))
}

/// Run until Ctrl-C
pub async fn run(config: AppConfig) -> Result<(), DaemonError> {
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    run_until(config, cancel).await
}

/// Run until `cancel` fires or the odometer can no longer be saved
pub async fn run_until(config: AppConfig, cancel: CancellationToken) -> Result<(), DaemonError> {
    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| DaemonError::Metrics(e.to_string()))?;
        info!("Serving metrics on {}", addr);
    }

    let transport = open_transport(&config)?;
    let mut client = ObdClient::new(transport, config.client_config());

    let mut states = client.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            info!("Adapter state: {:?}", *states.borrow_and_update());
        }
    });

    client.try_initialize().await?;

    match client.supported_pids().await {
        Ok(mask) => {
            info!("Adapter supports PIDs {:08X}", mask);
            for pid in POLL_CYCLE.iter().filter(|pid| !is_supported(mask, **pid)) {
                warn!("{:?} is not advertised by the vehicle", pid);
            }
        }
        Err(e) => warn!("Could not read supported PIDs: {}", e),
    }

    let store = Arc::new(JsonFileStore::new(&config.state_file));

    let mut tank = TankCalibration::load(store.clone())?;
    if let Some(liters) = config.tank_volume_liters {
        if liters != tank.liters() {
            tank.set(liters)?;
        }
    }

    let reconciler = OdometerReconciler::load(store)?;
    let mut poller = PollingLoop::new(config.poller_config(tank.liters()), reconciler);
    if let Some(km) = config.initial_odometer_km {
        poller = poller.with_initial_odometer(km);
    }

    let (sample_tx, mut sample_rx) = mpsc::channel::<VehicleSample>(CHANNEL_CAPACITY);
    let (odometer_tx, mut odometer_rx) = mpsc::channel::<OdometerReading>(CHANNEL_CAPACITY);

    let samples = tokio::spawn(async move {
        while let Some(sample) = sample_rx.recv().await {
            info!(
                rpm = sample.rpm,
                speed_kmh = sample.speed,
                coolant_c = sample.coolant_temperature,
                distance_km = sample.distance_since_reset,
                fuel_l = sample.fuel_level,
                "Vehicle sample"
            );
        }
    });
    let odometer = tokio::spawn(async move {
        while let Some(reading) = odometer_rx.recv().await {
            info!(total_km = reading.total_km, "Odometer");
        }
    });

    let result = poller.run(&mut client, sample_tx, odometer_tx, cancel).await;

    if let Err(e) = client.close().await {
        warn!("Failed to close adapter: {}", e);
    }
    let _ = tokio::join!(samples, odometer);

    result?;
    Ok(())
}

fn open_transport(config: &AppConfig) -> Result<Box<dyn Transport>, DaemonError> {
    match config.transport {
        TransportKind::Simulated => {
            info!("Using simulated adapter");
            Ok(Box::new(SimulatedAdapter::new(config.simulator.clone())))
        }
        TransportKind::Serial => {
            info!(
                "Opening serial adapter {} at {} baud",
                config.serial.device, config.serial.baud_rate
            );
            Ok(Box::new(SerialTransport::open(
                &config.serial.device,
                config.serial.baud_rate,
            )?))
        }
    }
}
