//! OBD-II Adapter Simulator
//!
//! A [`SimulatedAdapter`] speaks the same byte protocol as an ELM327 and can
//! stand in for a serial connection anywhere an `obd_protocol::Transport` is
//! accepted. Engine RPM and coolant temperature come from continuous-time
//! models evaluated against an injectable [`Clock`].

mod adapter;
mod clock;
mod config;
mod model;

pub use adapter::{AdapterFlags, SimulatedAdapter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RpmModelConfig, SimulatorConfig, ThermalModelConfig};
pub use model::{RpmModel, ThermalModel, ThermalPhase, ThermalSimState};
