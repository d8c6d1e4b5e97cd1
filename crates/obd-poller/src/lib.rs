//! OBD-II Polling Loop
//!
//! Drives the fixed PID cycle against a ready [`obd_protocol::ObdClient`]
//! on a steady tick, hands complete samples to a single consumer and keeps
//! the reconciled odometer current.

mod poller;

pub use poller::{CycleOutcome, PollerConfig, PollerError, PollerStats, PollingLoop};
