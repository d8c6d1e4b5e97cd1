//! Polling Loop Implementation

use obd_protocol::{ObdClient, ObdError, VehicleSample, POLL_CYCLE};
use odometer::{OdometerError, OdometerReading, OdometerReconciler, DEFAULT_TANK_VOLUME_LITERS};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use storage::RecordStore;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time between cycle starts
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between cycle starts
    pub interval: Duration,
    /// Tank volume used to scale the fuel level
    pub tank_volume_liters: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            tank_volume_liters: DEFAULT_TANK_VOLUME_LITERS,
        }
    }
}

/// Errors that end [`PollingLoop::run`]
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("Odometer persistence failed: {0}")]
    Persistence(#[from] OdometerError),
}

/// Result of one pass over the PID cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Every PID decoded
    Valid(VehicleSample),
    /// At least one reply failed to decode; the sample is zeroed
    Invalid(VehicleSample),
    /// The channel failed mid-cycle; nothing was produced
    Aborted(ObdError),
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Valid(_) => "valid",
            CycleOutcome::Invalid(_) => "invalid",
            CycleOutcome::Aborted(_) => "aborted",
        }
    }
}

/// Cycle counters since the loop was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub cycles: u64,
    pub valid: u64,
    pub invalid: u64,
    pub aborted: u64,
}

/// Fixed-interval driver for the PID cycle
pub struct PollingLoop<S: RecordStore> {
    config: PollerConfig,
    reconciler: OdometerReconciler<S>,
    /// User odometer reading applied on the first valid sample
    pending_calibration: Option<f64>,
    stats: PollerStats,
}

impl<S: RecordStore> PollingLoop<S> {
    pub fn new(config: PollerConfig, reconciler: OdometerReconciler<S>) -> Self {
        Self {
            config,
            reconciler,
            pending_calibration: None,
            stats: PollerStats::default(),
        }
    }

    /// Calibrate the odometer to `km` with the first valid sample.
    ///
    /// Ignored when the reconciler already holds a calibration.
    pub fn with_initial_odometer(mut self, km: f64) -> Self {
        if self.reconciler.is_initialized() {
            info!("Odometer already calibrated, ignoring initial reading {} km", km);
        } else {
            self.pending_calibration = Some(km);
        }
        self
    }

    pub fn stats(&self) -> PollerStats {
        self.stats
    }

    pub fn reconciler(&self) -> &OdometerReconciler<S> {
        &self.reconciler
    }

    /// Run one pass over [`POLL_CYCLE`].
    ///
    /// Decode failures zero the PID and keep going; a transport failure
    /// abandons the rest of the pass.
    pub async fn poll_cycle(&mut self, client: &mut ObdClient) -> CycleOutcome {
        let mut sample = VehicleSample::new(now_ms());

        for pid in POLL_CYCLE {
            match client.read_pid(pid, self.config.tank_volume_liters).await {
                Ok(value) => sample.set(pid, value),
                Err(e) if e.is_transport() => {
                    warn!("Cycle abandoned at PID {:02X}: {}", pid.code(), e);
                    return self.record(CycleOutcome::Aborted(e));
                }
                Err(e) => {
                    debug!("PID {:02X} reply rejected: {}", pid.code(), e);
                    sample.set(pid, 0.0);
                    sample.valid = false;
                }
            }
        }

        if sample.valid {
            self.record(CycleOutcome::Valid(sample))
        } else {
            sample.invalidate();
            self.record(CycleOutcome::Invalid(sample))
        }
    }

    fn record(&mut self, outcome: CycleOutcome) -> CycleOutcome {
        self.stats.cycles += 1;
        match outcome {
            CycleOutcome::Valid(_) => self.stats.valid += 1,
            CycleOutcome::Invalid(_) => self.stats.invalid += 1,
            CycleOutcome::Aborted(_) => self.stats.aborted += 1,
        }
        metrics::counter!("obd_poll_cycles_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    /// Feed a valid sample to the reconciler
    fn reconcile(&mut self, sample: &VehicleSample) -> Result<Option<OdometerReading>, PollerError> {
        let distance = sample.distance_since_reset;

        if self.reconciler.is_initialized() {
            if self.reconciler.is_reset(distance) {
                metrics::counter!("obd_odometer_resets_total").increment(1);
            }
            self.reconciler.update(distance)?;
        } else if let Some(km) = self.pending_calibration {
            self.reconciler.initialize(km, distance)?;
            self.pending_calibration = None;
        } else {
            return Ok(None);
        }
        metrics::counter!("obd_odometer_updates_total").increment(1);

        Ok(self.reconciler.total_odometer().map(|total_km| OdometerReading {
            total_km,
            distance_since_reset: distance,
            timestamp_ms: sample.timestamp_ms,
        }))
    }

    /// Poll until `cancel` fires.
    ///
    /// Only a failure to persist the odometer ends the loop early; adapter
    /// errors are logged and the next tick proceeds as usual.
    pub async fn run(
        &mut self,
        client: &mut ObdClient,
        sample_tx: mpsc::Sender<VehicleSample>,
        odometer_tx: mpsc::Sender<OdometerReading>,
        cancel: CancellationToken,
    ) -> Result<(), PollerError> {
        info!("Starting polling loop every {:?}", self.config.interval);

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.poll_cycle(client) => outcome,
            };

            let sample = match outcome {
                CycleOutcome::Valid(sample) => sample,
                CycleOutcome::Invalid(sample) => {
                    debug!("Dropping invalid sample from {}", sample.timestamp_ms);
                    continue;
                }
                CycleOutcome::Aborted(_) => continue,
            };

            let reading = self.reconcile(&sample)?;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = sample_tx.send(sample) => {
                    if sent.is_err() {
                        debug!("Sample consumer is gone");
                    }
                }
            }

            if let Some(reading) = reading {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = odometer_tx.send(reading) => {
                        if sent.is_err() {
                            debug!("Odometer consumer is gone");
                        }
                    }
                }
            }
        }

        info!(
            "Polling loop stopped after {} cycles ({} valid, {} invalid, {} aborted)",
            self.stats.cycles, self.stats.valid, self.stats.invalid, self.stats.aborted
        );
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
