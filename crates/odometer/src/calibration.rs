//! Fuel tank calibration

use crate::OdometerError;
use storage::RecordStore;
use tracing::{info, warn};

/// Tank volume used until the user saves one
pub const DEFAULT_TANK_VOLUME_LITERS: f64 = 50.0;

/// Holder of the tank volume that scales the fuel-level formula
pub struct TankCalibration<S: RecordStore> {
    store: S,
    liters: f64,
}

impl<S: RecordStore> TankCalibration<S> {
    /// Load the saved volume, falling back to the default
    pub fn load(store: S) -> Result<Self, OdometerError> {
        let liters = match store.load_tank_volume()? {
            Some(liters) if is_valid(liters) => liters,
            Some(liters) => {
                warn!("Ignoring stored tank volume {} L", liters);
                DEFAULT_TANK_VOLUME_LITERS
            }
            None => DEFAULT_TANK_VOLUME_LITERS,
        };
        Ok(Self { store, liters })
    }

    pub fn liters(&self) -> f64 {
        self.liters
    }

    /// Validate, persist and adopt a new tank volume
    pub fn set(&mut self, liters: f64) -> Result<(), OdometerError> {
        if !is_valid(liters) {
            return Err(OdometerError::InvalidTankVolume(liters));
        }
        self.store.save_tank_volume(liters)?;
        info!("Tank volume set to {} L", liters);
        self.liters = liters;
        Ok(())
    }
}

fn is_valid(liters: f64) -> bool {
    liters.is_finite() && liters > 0.0
}
