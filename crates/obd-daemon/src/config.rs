//! Daemon Configuration
//!
//! Read from an optional TOML file, then overridden by `OBD__`-prefixed
//! environment variables (`OBD__SERIAL__DEVICE=/dev/ttyUSB1`).

use config::{Config, ConfigError, Environment, File};
use obd_poller::PollerConfig;
use obd_protocol::{ClientConfig, ObdProtocol, DEFAULT_TIMEOUT_MS};
use obd_simulator::SimulatorConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "obd-telemetry.toml";

/// Where adapter bytes come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Simulated,
    Serial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub device: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 38_400,
        }
    }
}

/// Top-level daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportKind,
    pub serial: SerialConfig,
    /// Time between polling cycles
    pub poll_interval_ms: u64,
    /// Prompt timeout for every command
    pub command_timeout_ms: u64,
    /// Adapter-side timeout programmed with ATST
    pub adapter_timeout_ms: u64,
    pub protocol: ObdProtocol,
    /// JSON file holding the odometer state and tank volume
    pub state_file: PathBuf,
    /// Odometer reading used to calibrate a fresh state file
    pub initial_odometer_km: Option<f64>,
    /// Saved as the tank calibration when set
    pub tank_volume_liters: Option<f64>,
    /// Prometheus scrape endpoint, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
    pub log_level: String,
    pub simulator: SimulatorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            serial: SerialConfig::default(),
            poll_interval_ms: 500,
            command_timeout_ms: DEFAULT_TIMEOUT_MS,
            adapter_timeout_ms: 200,
            protocol: ObdProtocol::Auto,
            state_file: PathBuf::from("obd-state.json"),
            initial_odometer_km: None,
            tank_volume_liters: None,
            metrics_addr: None,
            log_level: "info".to_string(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Layer `path` (or [`DEFAULT_CONFIG_FILE`] if present) and the environment.
    ///
    /// An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("OBD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            protocol: self.protocol,
            adapter_timeout: Duration::from_millis(self.adapter_timeout_ms),
        }
    }

    pub fn poller_config(&self, tank_volume_liters: f64) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            tank_volume_liters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("obd-daemon-{}-{}", std::process::id(), name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("obd-telemetry.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.transport, TransportKind::Simulated);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.client_config().command_timeout, Duration::from_millis(2000));
        assert_eq!(config.client_config().adapter_timeout, Duration::from_millis(200));
        assert_eq!(config.poller_config(50.0).interval, Duration::from_millis(500));
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_file(
            "file",
            r#"
transport = "serial"
poll_interval_ms = 1000
initial_odometer_km = 15000.0
protocol = "j1850_pwm"
metrics_addr = "127.0.0.1:9100"

[serial]
device = "/dev/rfcomm0"

[simulator]
speed_kmh = 42
"#,
        );

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.transport, TransportKind::Serial);
        assert_eq!(config.serial.device, "/dev/rfcomm0");
        assert_eq!(config.serial.baud_rate, 38_400);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.initial_odometer_km, Some(15_000.0));
        assert_eq!(config.protocol, ObdProtocol::J1850Pwm);
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));
        assert_eq!(config.command_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.simulator.speed_kmh, 42.0);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let missing = std::env::temp_dir().join("obd-daemon-missing/obd-telemetry.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }
}
