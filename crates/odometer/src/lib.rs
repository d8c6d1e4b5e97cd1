//! Odometer Reconciliation
//!
//! Turns the adapter's "distance since codes cleared" counter into a total
//! odometer that keeps counting when the adapter-side counter is reset, and
//! holds the fuel tank calibration used to scale fuel readings.

mod calibration;
mod reconciler;

pub use calibration::{TankCalibration, DEFAULT_TANK_VOLUME_LITERS};
pub use reconciler::{OdometerReading, OdometerReconciler};
pub use storage::{OdometerState, RecordStore};

use storage::StorageError;
use thiserror::Error;

/// Odometer errors
#[derive(Debug, Error)]
pub enum OdometerError {
    /// The new state could not be saved; the in-memory state is unchanged
    #[error("Failed to persist state: {0}")]
    Persistence(#[from] StorageError),

    #[error("Invalid tank volume: {0} L")]
    InvalidTankVolume(f64),
}
