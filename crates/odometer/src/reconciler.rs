//! Reset-aware odometer accumulator

use crate::OdometerError;
use serde::{Deserialize, Serialize};
use storage::{OdometerState, RecordStore};
use tracing::{debug, info};

/// Total odometer as delivered to consumers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometerReading {
    /// Reconciled total (km)
    pub total_km: f64,
    /// Raw adapter counter the total was derived from (km)
    pub distance_since_reset: f64,
    /// Timestamp of the sample that produced it (Unix ms)
    pub timestamp_ms: u64,
}

/// Sole owner and writer of the persisted [`OdometerState`].
///
/// Every accepted change is saved before it becomes visible; if the save
/// fails the previous state is kept and the error is returned.
pub struct OdometerReconciler<S: RecordStore> {
    store: S,
    state: OdometerState,
}

impl<S: RecordStore> OdometerReconciler<S> {
    /// Load the persisted state from `store`
    pub fn load(store: S) -> Result<Self, OdometerError> {
        let state = store.load_odometer_state()?;
        if let Some(total) = state.total() {
            info!("Loaded odometer state, total {:.1} km", total);
        } else {
            info!("No odometer calibration stored yet");
        }
        Ok(Self { store, state })
    }

    pub fn state(&self) -> OdometerState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    /// `base_offset + last_distance_since_reset`, once initialized
    pub fn total_odometer(&self) -> Option<f64> {
        self.state.total()
    }

    /// Whether `current` would be treated as an adapter-side reset
    pub fn is_reset(&self, current: f64) -> bool {
        current < self.state.last_distance_since_reset
    }

    /// Calibrate against a user-entered odometer reading
    pub fn initialize(
        &mut self,
        user_reading: f64,
        current_distance_since_reset: f64,
    ) -> Result<OdometerState, OdometerError> {
        let next = OdometerState {
            base_offset: user_reading - current_distance_since_reset,
            last_distance_since_reset: current_distance_since_reset,
            initialized: true,
        };
        self.commit(next)?;
        info!(
            "Odometer calibrated to {:.1} km (adapter counter {:.0} km)",
            user_reading, current_distance_since_reset
        );
        Ok(self.state)
    }

    /// Fold in a new distance-since-reset reading.
    ///
    /// Before [`initialize`](Self::initialize) this is a no-op that returns
    /// the current state without writing.
    pub fn update(&mut self, current_distance_since_reset: f64) -> Result<OdometerState, OdometerError> {
        if !self.state.initialized {
            return Ok(self.state);
        }

        let mut next = self.state;
        if self.is_reset(current_distance_since_reset) {
            next.base_offset = (self.state.base_offset + self.state.last_distance_since_reset)
                - current_distance_since_reset;
            info!(
                "Adapter distance counter reset ({:.0} -> {:.0} km), carrying total forward",
                self.state.last_distance_since_reset, current_distance_since_reset
            );
        }
        next.last_distance_since_reset = current_distance_since_reset;

        self.commit(next)?;
        Ok(self.state)
    }

    fn commit(&mut self, next: OdometerState) -> Result<(), OdometerError> {
        self.store.save_odometer_state(&next)?;
        debug!("Odometer state saved: {:?}", next);
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use storage::MemoryStore;

    fn reconciler() -> (Arc<MemoryStore>, OdometerReconciler<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let reconciler = OdometerReconciler::load(store.clone()).unwrap();
        (store, reconciler)
    }

    #[test]
    fn test_reset_compensation_example() {
        let (_, mut odo) = reconciler();
        odo.initialize(15_000.0, 0.0).unwrap();
        assert_eq!(odo.total_odometer(), Some(15_000.0));

        odo.update(50.0).unwrap();
        assert_eq!(odo.total_odometer(), Some(15_050.0));

        assert!(odo.is_reset(20.0));
        odo.update(20.0).unwrap();
        assert_eq!(odo.total_odometer(), Some(15_050.0));

        odo.update(30.0).unwrap();
        assert_eq!(odo.total_odometer(), Some(15_060.0));
    }

    #[test]
    fn test_initialize_persists_immediately() {
        let (store, mut odo) = reconciler();
        let state = odo.initialize(12_345.0, 4000.0).unwrap();
        assert_eq!(state.base_offset, 8345.0);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.load_odometer_state().unwrap(), state);
    }

    #[test]
    fn test_update_before_initialize_is_noop() {
        let (store, mut odo) = reconciler();
        let state = odo.update(120.0).unwrap();
        assert_eq!(state, OdometerState::default());
        assert_eq!(odo.total_odometer(), None);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_equal_reading_is_not_reset() {
        let (store, mut odo) = reconciler();
        odo.initialize(1000.0, 40.0).unwrap();
        assert!(!odo.is_reset(40.0));
        let state = odo.update(40.0).unwrap();
        assert_eq!(state.base_offset, 960.0);
        assert_eq!(odo.total_odometer(), Some(1000.0));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_zero_and_negative_are_resets() {
        let (_, mut odo) = reconciler();
        odo.initialize(1000.0, 40.0).unwrap();
        odo.update(0.0).unwrap();
        assert_eq!(odo.total_odometer(), Some(1000.0));
        assert_eq!(odo.state().base_offset, 1000.0);

        odo.update(-5.0).unwrap();
        assert_eq!(odo.total_odometer(), Some(1000.0));
        assert_eq!(odo.state().base_offset, 1005.0);
    }

    #[test]
    fn test_failed_save_keeps_previous_state() {
        let (store, mut odo) = reconciler();
        odo.initialize(1000.0, 40.0).unwrap();
        let before = odo.state();

        store.set_fail_writes(true);
        assert!(matches!(odo.update(70.0), Err(OdometerError::Persistence(_))));
        assert_eq!(odo.state(), before);
        assert_eq!(store.load_odometer_state().unwrap(), before);

        store.set_fail_writes(false);
        odo.update(70.0).unwrap();
        assert_eq!(odo.total_odometer(), Some(1030.0));
    }

    #[test]
    fn test_state_reloaded_from_store() {
        let (store, mut odo) = reconciler();
        odo.initialize(500.0, 10.0).unwrap();
        odo.update(25.0).unwrap();

        let reloaded = OdometerReconciler::load(store.clone()).unwrap();
        assert_eq!(reloaded.state(), odo.state());
        assert_eq!(reloaded.total_odometer(), Some(515.0));
    }

    proptest! {
        #[test]
        fn total_never_decreases(
            user in 0u32..1_000_000,
            first in 0u16..u16::MAX,
            readings in proptest::collection::vec(0u16..u16::MAX, 1..64),
        ) {
            let (_, mut odo) = reconciler();
            odo.initialize(user as f64, first as f64).unwrap();
            let mut previous = odo.total_odometer().unwrap();

            for reading in readings {
                let state = odo.update(reading as f64).unwrap();
                let total = odo.total_odometer().unwrap();
                prop_assert!(total >= previous);
                prop_assert_eq!(total, state.base_offset + state.last_distance_since_reset);
                previous = total;
            }
        }
    }
}
