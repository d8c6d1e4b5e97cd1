//! Simulated ELM327 adapter
//!
//! Accepts command lines through [`Transport::write`] and queues the reply
//! for [`Transport::read_byte`]. AT commands update the same echo, linefeed,
//! space and header flags a real adapter keeps.

use crate::clock::{Clock, SystemClock};
use crate::config::SimulatorConfig;
use crate::model::{RpmModel, ThermalModel, ThermalPhase};
use async_trait::async_trait;
use obd_protocol::codec::encode_hex;
use obd_protocol::{ObdError, Pid, Transport, PROMPT};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

const OK: &str = "OK";
const NO_DATA: &str = "NO DATA";

/// Per-session adapter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct AdapterFlags {
    /// Echo received characters back (ATE0/ATE1)
    pub echo: bool,
    /// Add linefeeds after carriage returns (ATL0/ATL1)
    pub linefeeds: bool,
    /// Print spaces between response bytes (ATS0/ATS1)
    pub spaces: bool,
    /// Show header bytes in responses (ATH0/ATH1)
    pub headers: bool,
}

impl Default for AdapterFlags {
    fn default() -> Self {
        Self {
            echo: true,
            linefeeds: true,
            spaces: true,
            headers: false,
        }
    }
}

impl AdapterFlags {
    fn line_ending(&self) -> &'static str {
        if self.linefeeds {
            "\r\n"
        } else {
            "\r"
        }
    }
}

/// Adapter that answers from models instead of a vehicle
pub struct SimulatedAdapter {
    config: SimulatorConfig,
    clock: Arc<dyn Clock>,
    flags: AdapterFlags,
    rpm: RpmModel,
    thermal: ThermalModel,
    pending: Vec<u8>,
    reply: VecDeque<u8>,
    open: bool,
}

impl SimulatedAdapter {
    /// Simulated adapter driven by the wall clock
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Simulated adapter driven by `clock`
    pub fn with_clock(config: SimulatorConfig, clock: Arc<dyn Clock>) -> Self {
        info!("Creating simulated OBD adapter");
        let rpm = RpmModel::new(config.rpm.clone(), config.noise_seed);
        let thermal = ThermalModel::new(config.thermal.clone(), clock.elapsed());
        Self {
            config,
            clock,
            flags: AdapterFlags::default(),
            rpm,
            thermal,
            pending: Vec::new(),
            reply: VecDeque::new(),
            open: true,
        }
    }

    pub fn flags(&self) -> AdapterFlags {
        self.flags
    }

    pub fn thermal_phase(&self) -> ThermalPhase {
        self.thermal.phase()
    }

    /// Run one complete command line and queue its reply
    fn process(&mut self, raw: &[u8]) {
        let command: String = String::from_utf8_lossy(raw)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        if command.is_empty() {
            return;
        }

        let body = if command.starts_with("AT") {
            self.handle_at(&command)
        } else {
            self.handle_obd(&command)
        };

        let le = self.flags.line_ending();
        debug!("SIM RX {} TX {:?}", command, body);
        self.reply.extend(format!("{body}{le}{le}").bytes());
        self.reply.push_back(PROMPT);
    }

    fn handle_at(&mut self, command: &str) -> String {
        let flag = |state: &str| state == "1";
        match command {
            "ATZ" => {
                self.flags = AdapterFlags::default();
                self.config.banner.clone()
            }
            "ATD" => {
                self.flags = AdapterFlags::default();
                OK.to_string()
            }
            "ATI" => self.config.banner.clone(),
            _ => {
                if let Some(state @ ("0" | "1")) = command.strip_prefix("ATE") {
                    self.flags.echo = flag(state);
                } else if let Some(state @ ("0" | "1")) = command.strip_prefix("ATL") {
                    self.flags.linefeeds = flag(state);
                } else if let Some(state @ ("0" | "1")) = command.strip_prefix("ATS") {
                    self.flags.spaces = flag(state);
                } else if let Some(state @ ("0" | "1")) = command.strip_prefix("ATH") {
                    self.flags.headers = flag(state);
                }
                // Protocol, timeout and anything unrecognized are accepted as-is
                OK.to_string()
            }
        }
    }

    fn handle_obd(&mut self, command: &str) -> String {
        let pid = parse_request(command).and_then(|(mode, code)| Pid::from_code(mode, code));
        let Some(pid) = pid else {
            return NO_DATA.to_string();
        };

        let mut bytes = vec![pid.mode() + 0x40, pid.code()];
        bytes.extend(self.payload(pid));
        encode_hex(&bytes, self.flags.spaces)
    }

    fn payload(&mut self, pid: Pid) -> Vec<u8> {
        let now = self.clock.elapsed();
        match pid {
            Pid::SupportedPids => self.config.supported_pids.to_be_bytes().to_vec(),
            Pid::Rpm => pid.encode_value(self.rpm.sample(now), 0.0),
            Pid::CoolantTemp => pid.encode_value(self.thermal.temperature(now), 0.0),
            Pid::Speed => pid.encode_value(self.config.speed_kmh, 0.0),
            Pid::DistanceSinceReset => pid.encode_value(self.config.distance_since_reset_km, 0.0),
            Pid::FuelLevel => vec![self.config.fuel_level_byte],
        }
    }
}

/// Split a compact single-PID request like `010C` into (mode, pid)
fn parse_request(command: &str) -> Option<(u8, u8)> {
    if command.len() != 4 || !command.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mode = u8::from_str_radix(&command[0..2], 16).ok()?;
    let code = u8::from_str_radix(&command[2..4], 16).ok()?;
    Some((mode, code))
}

#[async_trait]
impl Transport for SimulatedAdapter {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        if !self.open {
            return Err(ObdError::ChannelClosed);
        }
        for &byte in bytes {
            if self.flags.echo {
                self.reply.push_back(byte);
            }
            match byte {
                b'\r' => {
                    let command = std::mem::take(&mut self.pending);
                    self.process(&command);
                }
                b'\n' => {}
                _ => self.pending.push(byte),
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ObdError> {
        if !self.pending.is_empty() {
            let command = std::mem::take(&mut self.pending);
            self.process(&command);
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, ObdError> {
        if !self.open {
            return Ok(None);
        }
        Ok(self.reply.pop_front())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<(), ObdError> {
        debug!("Closing simulated adapter");
        self.open = false;
        self.pending.clear();
        self.reply.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use obd_protocol::{read_until_prompt, send_line, ClientConfig, ObdClient};
    use std::time::Duration;

    fn adapter(clock: &ManualClock) -> SimulatedAdapter {
        SimulatedAdapter::with_clock(SimulatorConfig::compressed(), Arc::new(clock.clone()))
    }

    async fn exchange(adapter: &mut SimulatedAdapter, command: &str) -> String {
        send_line(adapter, command).await.unwrap();
        read_until_prompt(adapter).await.unwrap()
    }

    #[tokio::test]
    async fn test_reset_echoes_and_reports_banner() {
        let mut sim = adapter(&ManualClock::new());
        let reply = exchange(&mut sim, "ATZ").await;
        assert_eq!(reply, "ATZ\rELM327 v1.5\r\n\r\n");
        assert_eq!(sim.flags(), AdapterFlags::default());
    }

    #[tokio::test]
    async fn test_flags_shape_replies() {
        let mut sim = adapter(&ManualClock::new());
        assert_eq!(exchange(&mut sim, "01 0D").await, "01 0D\r41 0D 00\r\n\r\n");

        exchange(&mut sim, "ATE0").await;
        exchange(&mut sim, "atl0").await;
        exchange(&mut sim, "AT S0").await;
        assert_eq!(
            sim.flags(),
            AdapterFlags {
                echo: false,
                linefeeds: false,
                spaces: false,
                headers: false,
            }
        );
        assert_eq!(exchange(&mut sim, "01 31").await, "41310FA0\r\r");
    }

    #[tokio::test]
    async fn test_unknown_commands() {
        let mut sim = adapter(&ManualClock::new());
        exchange(&mut sim, "ATE0").await;
        assert_eq!(exchange(&mut sim, "ATXYZ").await, "OK\r\n\r\n");
        assert_eq!(exchange(&mut sim, "01 11").await, "NO DATA\r\n\r\n");
        assert_eq!(exchange(&mut sim, "09 02").await, "NO DATA\r\n\r\n");
        assert_eq!(exchange(&mut sim, "01 0C 0D").await, "NO DATA\r\n\r\n");
    }

    #[tokio::test]
    async fn test_empty_buffer_reads_as_end_of_stream() {
        let mut sim = adapter(&ManualClock::new());
        assert_eq!(sim.read_byte().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_client_handshake_and_poll() {
        let clock = ManualClock::new();
        let mut client = ObdClient::new(Box::new(adapter(&clock)), ClientConfig::default());
        assert!(client.initialize().await);

        assert_eq!(client.supported_pids().await.unwrap(), 0xBE3F_A813);
        let rpm = client.read_pid(Pid::Rpm, 50.0).await.unwrap();
        assert!((850.0..=890.0).contains(&rpm));
        assert_eq!(client.read_pid(Pid::Speed, 50.0).await.unwrap(), 0.0);
        assert_eq!(client.read_pid(Pid::CoolantTemp, 50.0).await.unwrap(), 19.0);
        assert_eq!(
            client.read_pid(Pid::DistanceSinceReset, 50.0).await.unwrap(),
            4000.0
        );
        let fuel = client.read_pid(Pid::FuelLevel, 50.0).await.unwrap();
        assert_eq!(fuel, (100.0 * 191.0 / 255.0) * 50.0 / 100.0);
    }

    #[tokio::test]
    async fn test_coolant_follows_manual_clock() {
        let clock = ManualClock::new();
        let mut sim = adapter(&clock);
        exchange(&mut sim, "ATE0").await;
        exchange(&mut sim, "ATS0").await;

        // Compressed config warms up in 30 s
        clock.advance(Duration::from_secs(15));
        assert_eq!(exchange(&mut sim, "0105").await, "41055C\r\n\r\n");
        assert_eq!(sim.thermal_phase(), ThermalPhase::WarmingUp);

        clock.advance(Duration::from_secs(15));
        assert_eq!(exchange(&mut sim, "0105").await, "41057D\r\n\r\n");
        assert_eq!(sim.thermal_phase(), ThermalPhase::ThermostatOpen);
    }

    #[tokio::test]
    async fn test_closed_adapter_rejects_writes() {
        let mut sim = adapter(&ManualClock::new());
        sim.close().await.unwrap();
        assert!(!sim.is_open());
        assert!(matches!(sim.write(b"ATZ\r").await, Err(ObdError::ChannelClosed)));
        assert_eq!(sim.read_byte().await.unwrap(), None);
    }
}
