//! OBD-II PID Definitions and Decoding Formulas
//!
//! Defines the fixed PID subset this crate polls, together with the formula
//! that turns payload bytes into a physical value and its inverse.

use crate::mode;
use serde::{Deserialize, Serialize};

/// Mode 01 PIDs understood by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// PIDs supported 01-20 (0x00)
    SupportedPids = 0x00,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
    /// Distance traveled since codes cleared (0x31)
    DistanceSinceReset = 0x31,
}

/// The order in which a polling cycle queries PIDs
pub const POLL_CYCLE: [Pid; 5] = [
    Pid::Rpm,
    Pid::Speed,
    Pid::CoolantTemp,
    Pid::DistanceSinceReset,
    Pid::FuelLevel,
];

impl Pid {
    /// Look up a PID by mode and code
    pub fn from_code(mode_byte: u8, code: u8) -> Option<Self> {
        if mode_byte != mode::CURRENT_DATA {
            return None;
        }
        match code {
            0x00 => Some(Pid::SupportedPids),
            0x05 => Some(Pid::CoolantTemp),
            0x0C => Some(Pid::Rpm),
            0x0D => Some(Pid::Speed),
            0x2F => Some(Pid::FuelLevel),
            0x31 => Some(Pid::DistanceSinceReset),
            _ => None,
        }
    }

    /// Request mode for this PID
    pub fn mode(&self) -> u8 {
        mode::CURRENT_DATA
    }

    /// Get the PID hex value
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Get the number of response bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::SupportedPids => 4,
            Pid::Rpm | Pid::DistanceSinceReset => 2,
            Pid::CoolantTemp | Pid::Speed | Pid::FuelLevel => 1,
        }
    }

    /// Decode payload bytes into a physical value.
    ///
    /// `bytes` must hold at least [`Pid::response_bytes`] entries; the codec
    /// checks this before calling. Only the fuel formula reads
    /// `tank_volume_liters`.
    pub fn apply_formula(&self, bytes: &[u8], tank_volume_liters: f64) -> f64 {
        let a = bytes[0] as f64;
        match self {
            // RPM: ((A*256)+B)/4
            Pid::Rpm => ((a * 256.0) + bytes[1] as f64) / 4.0,
            // Speed: A (km/h)
            Pid::Speed => a,
            // Coolant Temp: A - 40 (°C)
            Pid::CoolantTemp => a - 40.0,
            // Distance: (A*256)+B (km)
            Pid::DistanceSinceReset => (a * 256.0) + bytes[1] as f64,
            // Fuel: raw = 100*A/255 (%), scaled to the tank volume
            Pid::FuelLevel => {
                let raw = 100.0 * a / 255.0;
                raw * tank_volume_liters / 100.0
            }
            Pid::SupportedPids => {
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
        }
    }

    /// Inverse of [`Pid::apply_formula`], clamped to what the payload can hold.
    pub fn encode_value(&self, value: f64, tank_volume_liters: f64) -> Vec<u8> {
        match self {
            Pid::Rpm => two_bytes((value * 4.0).round()),
            Pid::Speed => vec![one_byte(value.round())],
            Pid::CoolantTemp => vec![one_byte(value.round() + 40.0)],
            Pid::DistanceSinceReset => two_bytes(value.round()),
            Pid::FuelLevel => {
                let raw = if tank_volume_liters > 0.0 {
                    value * 100.0 / tank_volume_liters
                } else {
                    0.0
                };
                vec![one_byte((raw * 255.0 / 100.0).round())]
            }
            Pid::SupportedPids => (value.clamp(0.0, u32::MAX as f64) as u32)
                .to_be_bytes()
                .to_vec(),
        }
    }
}

fn one_byte(raw: f64) -> u8 {
    raw.clamp(0.0, u8::MAX as f64) as u8
}

fn two_bytes(raw: f64) -> Vec<u8> {
    (raw.clamp(0.0, u16::MAX as f64) as u16).to_be_bytes().to_vec()
}

/// Whether `pid` is flagged in a `01 00` supported-PID bitmask.
///
/// Bit 31 is PID 0x01, bit 0 is PID 0x20.
pub fn is_supported(mask: u32, pid: Pid) -> bool {
    match pid.code() {
        code @ 0x01..=0x20 => mask & (1 << (0x20 - code as u32)) != 0,
        _ => false,
    }
}

/// One completed polling cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleSample {
    /// Timestamp (Unix ms)
    pub timestamp_ms: u64,
    /// Engine RPM
    pub rpm: f64,
    /// Vehicle speed (km/h)
    pub speed: f64,
    /// Coolant temperature (°C)
    pub coolant_temperature: f64,
    /// Distance since codes were cleared (km)
    pub distance_since_reset: f64,
    /// Fuel in the tank (liters)
    pub fuel_level: f64,
    /// False when any PID in the cycle failed
    pub valid: bool,
}

impl VehicleSample {
    /// Create a new empty sample with the given timestamp
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            valid: true,
            ..Default::default()
        }
    }

    /// Store a decoded PID value
    pub fn set(&mut self, pid: Pid, value: f64) {
        match pid {
            Pid::Rpm => self.rpm = value,
            Pid::Speed => self.speed = value,
            Pid::CoolantTemp => self.coolant_temperature = value,
            Pid::DistanceSinceReset => self.distance_since_reset = value,
            Pid::FuelLevel => self.fuel_level = value,
            Pid::SupportedPids => {}
        }
    }

    /// Zero every field and mark the sample invalid
    pub fn invalidate(&mut self) {
        *self = Self {
            timestamp_ms: self.timestamp_ms,
            valid: false,
            ..Default::default()
        };
    }
}
