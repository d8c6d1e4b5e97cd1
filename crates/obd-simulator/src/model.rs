//! Continuous-time engine models
//!
//! Both models are evaluated on demand against an elapsed time supplied by
//! the caller, so they can be driven by a manual clock in tests.

use crate::config::{RpmModelConfig, ThermalModelConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Idle engine speed: a slow sine plus uniform noise, clamped to the idle band
pub struct RpmModel {
    config: RpmModelConfig,
    rng: StdRng,
}

impl RpmModel {
    pub fn new(config: RpmModelConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    /// RPM at `t` since the clock origin
    pub fn sample(&mut self, t: Duration) -> f64 {
        let c = &self.config;
        let half_width = c.noise.abs();
        let noise = self.rng.gen_range(-half_width..=half_width);
        let rpm = c.center + c.amplitude * (c.angular_rate * t.as_secs_f64()).sin() + noise;
        rpm.clamp(c.min, c.max)
    }
}

/// Thermostat phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThermalPhase {
    #[default]
    WarmingUp,
    ThermostatOpen,
}

/// Mutable part of the thermal model
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalSimState {
    pub phase: ThermalPhase,
    /// Clock reading when the model was created
    pub start_time: Duration,
    /// Temperature the current warm-up started from
    pub warm_from_c: f64,
    /// Elapsed time at which the current warm-up started
    pub warm_start: Duration,
}

/// Coolant temperature with a two-threshold thermostat.
///
/// Warm-up is a linear ramp to the open threshold. Once open, temperature
/// oscillates around the steady value; if it ever falls below the close
/// threshold, a new ramp starts from wherever it fell to. The phase can
/// therefore only change after crossing the opposite threshold.
pub struct ThermalModel {
    config: ThermalModelConfig,
    state: ThermalSimState,
}

impl ThermalModel {
    pub fn new(config: ThermalModelConfig, start_time: Duration) -> Self {
        let state = ThermalSimState {
            phase: ThermalPhase::WarmingUp,
            start_time,
            warm_from_c: config.ambient_c,
            warm_start: Duration::ZERO,
        };
        Self { config, state }
    }

    pub fn phase(&self) -> ThermalPhase {
        self.state.phase
    }

    pub fn state(&self) -> &ThermalSimState {
        &self.state
    }

    /// Evaluate the temperature at clock reading `now`, updating the phase
    pub fn temperature(&mut self, now: Duration) -> f64 {
        let elapsed = now.saturating_sub(self.state.start_time);

        match self.state.phase {
            ThermalPhase::WarmingUp => {
                let temp = self.warming_temperature(elapsed);
                if temp >= self.config.open_threshold_c {
                    debug!("Thermostat open at {:.1}°C after {:?}", temp, elapsed);
                    self.state.phase = ThermalPhase::ThermostatOpen;
                }
                temp
            }
            ThermalPhase::ThermostatOpen => {
                let c = &self.config;
                let angle = elapsed.as_secs_f64() / c.swing_period_secs;
                let temp = c.steady_c + c.swing_c * angle.sin();
                if temp < c.close_threshold_c {
                    debug!("Thermostat closed at {:.1}°C after {:?}", temp, elapsed);
                    self.state.phase = ThermalPhase::WarmingUp;
                    self.state.warm_from_c = temp;
                    self.state.warm_start = elapsed;
                }
                temp
            }
        }
    }

    fn warming_temperature(&self, elapsed: Duration) -> f64 {
        let since = elapsed.saturating_sub(self.state.warm_start).as_secs_f64();
        let warmup = self.config.warmup().as_secs_f64();
        let progress = if warmup > 0.0 {
            (since / warmup).min(1.0)
        } else {
            1.0
        };
        if progress >= 1.0 {
            return self.config.open_threshold_c;
        }
        let from = self.state.warm_from_c;
        from + (self.config.open_threshold_c - from) * progress
    }
}
