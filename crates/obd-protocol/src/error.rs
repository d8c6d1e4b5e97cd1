//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Error)]
pub enum ObdError {
    /// Read/write failure on the underlying byte stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// The byte stream ended before the prompt arrived
    #[error("Transport channel closed")]
    ChannelClosed,

    /// A handshake command did not complete in time
    #[error("Handshake command {command} timed out after {timeout_ms}ms")]
    HandshakeTimeout { command: String, timeout_ms: u64 },

    /// A handshake command got something other than an acknowledgement
    #[error("Handshake command {command} rejected: {reply:?}")]
    HandshakeRejected { command: String, reply: String },

    /// PID query attempted before a successful handshake
    #[error("OBD adapter not ready")]
    AdapterNotReady,

    /// Reply contained no payload at all
    #[error("Empty response")]
    EmptyResponse,

    /// Adapter answered with the NO DATA sentinel
    #[error("Adapter returned NO DATA")]
    NoData,

    /// Reply did not start with the mode/PID echo
    #[error("Expected response prefix {expected}, got {reply:?}")]
    UnexpectedPrefix { expected: String, reply: String },

    /// Fewer payload bytes than the PID requires
    #[error("Expected {expected} payload bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    /// Payload is not valid hexadecimal
    #[error("Invalid hex in response: {0:?}")]
    InvalidHex(String),
}

impl ObdError {
    /// Whether this error means the channel itself misbehaved.
    ///
    /// The poller abandons the rest of a cycle on these.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ObdError::Transport(_)
                | ObdError::Timeout(_)
                | ObdError::ChannelClosed
                | ObdError::AdapterNotReady
        )
    }

    /// Whether this error came from decoding a reply that did arrive.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            ObdError::EmptyResponse
                | ObdError::NoData
                | ObdError::UnexpectedPrefix { .. }
                | ObdError::ShortResponse { .. }
                | ObdError::InvalidHex(_)
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}
