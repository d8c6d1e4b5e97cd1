//! OBD-II Protocol Implementation
//!
//! This crate talks to ELM327-compatible OBD-II adapters over any byte
//! stream: it encodes PID requests, decodes replies into physical values and
//! drives the adapter initialization handshake.

mod client;
pub mod codec;
mod error;
mod pid;
mod protocol;
mod transport;

pub use client::{AdapterConnectionState, ClientConfig, ObdClient, DEFAULT_TIMEOUT_MS};
pub use error::ObdError;
pub use pid::{is_supported, Pid, VehicleSample, POLL_CYCLE};
pub use protocol::ObdProtocol;
pub use transport::{read_until_prompt, send_line, SerialTransport, Transport, PROMPT};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
}
