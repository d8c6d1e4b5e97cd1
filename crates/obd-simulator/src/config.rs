//! Simulator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Idle RPM model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpmModelConfig {
    /// Center of the idle oscillation
    pub center: f64,
    /// Sine amplitude around the center
    pub amplitude: f64,
    /// Sine angular rate (rad/s)
    pub angular_rate: f64,
    /// Uniform noise half-width
    pub noise: f64,
    /// Lower clamp of the idle band
    pub min: f64,
    /// Upper clamp of the idle band
    pub max: f64,
}

impl Default for RpmModelConfig {
    fn default() -> Self {
        Self {
            center: 867.0,
            amplitude: 15.0,
            angular_rate: 0.5,
            noise: 5.0,
            min: 850.0,
            max: 890.0,
        }
    }
}

/// Coolant thermostat model parameters (°C, seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalModelConfig {
    /// Temperature at cold start
    pub ambient_c: f64,
    /// Thermostat opens at or above this
    pub open_threshold_c: f64,
    /// Thermostat closes below this
    pub close_threshold_c: f64,
    /// Center of the oscillation while the thermostat is open.
    ///
    /// Defaults to 87 °C rather than the 67 °C sometimes quoted for this
    /// model: anything below `close_threshold_c` closes the thermostat on
    /// its first open sample and the phase flips back and forth.
    pub steady_c: f64,
    /// Oscillation amplitude while open
    pub swing_c: f64,
    /// Divisor applied to elapsed seconds inside the open-phase sine
    pub swing_period_secs: f64,
    /// Time to warm from the starting temperature to the open threshold
    pub warmup_secs: f64,
}

impl Default for ThermalModelConfig {
    fn default() -> Self {
        Self {
            ambient_c: 19.0,
            open_threshold_c: 85.0,
            close_threshold_c: 82.0,
            steady_c: 87.0,
            swing_c: 2.0,
            swing_period_secs: 10.0,
            warmup_secs: 300.0,
        }
    }
}

impl ThermalModelConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs_f64(self.warmup_secs.max(0.0))
    }
}

/// Simulated adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Reply to ATZ / ATI
    pub banner: String,
    /// Bitmask returned for `01 00`
    pub supported_pids: u32,
    /// Fixed vehicle speed (km/h)
    pub speed_kmh: f64,
    /// Fixed distance since codes cleared (km)
    pub distance_since_reset_km: f64,
    /// Fixed fuel level payload byte
    pub fuel_level_byte: u8,
    /// Seed for the RPM noise; entropy when unset
    pub noise_seed: Option<u64>,
    pub rpm: RpmModelConfig,
    pub thermal: ThermalModelConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            banner: "ELM327 v1.5".to_string(),
            supported_pids: 0xBE3F_A813,
            speed_kmh: 0.0,
            distance_since_reset_km: 4000.0,
            fuel_level_byte: 0xBF,
            noise_seed: None,
            rpm: RpmModelConfig::default(),
            thermal: ThermalModelConfig::default(),
        }
    }
}

impl SimulatorConfig {
    /// Deterministic config with a 30 second warmup
    pub fn compressed() -> Self {
        Self {
            noise_seed: Some(0x0BD2),
            thermal: ThermalModelConfig {
                warmup_secs: 30.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
