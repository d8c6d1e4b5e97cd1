//! Storage Layer
//!
//! Load/save of the few flat records the telemetry core persists, behind a
//! storage-agnostic trait.

mod repository;

pub use repository::{JsonFileStore, MemoryStore, OdometerState, RecordStore};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
