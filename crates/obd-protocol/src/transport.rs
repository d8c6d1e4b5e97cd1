//! Byte-stream transport to the adapter
//!
//! The client only ever talks to a [`Transport`]; a serial port and the
//! simulated adapter both implement it.

use crate::error::ObdError;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

/// Prompt byte the adapter prints when it is ready for the next command
pub const PROMPT: u8 = b'>';

/// Duplex byte stream to an ELM327-style adapter
#[async_trait]
pub trait Transport: Send {
    /// Write raw bytes
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ObdError>;

    /// Push any buffered bytes out
    async fn flush(&mut self) -> Result<(), ObdError> {
        Ok(())
    }

    /// Read one byte, `None` at end of stream
    async fn read_byte(&mut self) -> Result<Option<u8>, ObdError>;

    /// Whether the stream can still be used
    fn is_open(&self) -> bool;

    /// Close the stream
    async fn close(&mut self) -> Result<(), ObdError>;
}

/// Write `command` followed by a carriage return.
pub async fn send_line<T: Transport + ?Sized>(transport: &mut T, command: &str) -> Result<(), ObdError> {
    let mut line = Vec::with_capacity(command.len() + 1);
    line.extend_from_slice(command.as_bytes());
    line.push(b'\r');
    transport.write(&line).await?;
    transport.flush().await
}

/// Read until the prompt; the prompt itself is not included.
///
/// Not bounded in time; callers wrap it in `tokio::time::timeout`.
pub async fn read_until_prompt<T: Transport + ?Sized>(transport: &mut T) -> Result<String, ObdError> {
    let mut reply = Vec::new();
    loop {
        match transport.read_byte().await? {
            Some(PROMPT) => break,
            Some(byte) => reply.push(byte),
            None => return Err(ObdError::ChannelClosed),
        }
    }
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

/// Serial port connection to a physical adapter
pub struct SerialTransport {
    device: String,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `device` - Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `baud_rate` - Baud rate for serial communication
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, ObdError> {
        info!("Opening serial port {} at {} baud", device, baud_rate);
        let stream = tokio_serial::new(device, baud_rate).open_native_async()?;
        Ok(Self {
            device: device.to_string(),
            stream: Some(stream),
        })
    }

    fn stream(&mut self) -> Result<&mut SerialStream, ObdError> {
        self.stream.as_mut().ok_or(ObdError::ChannelClosed)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        self.stream()?.write_all(bytes).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ObdError> {
        self.stream()?.flush().await?;
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<Option<u8>, ObdError> {
        let mut byte = [0u8; 1];
        match self.stream()?.read(&mut byte).await? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> Result<(), ObdError> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing serial port {}", self.device);
            stream.shutdown().await?;
        }
        Ok(())
    }
}
