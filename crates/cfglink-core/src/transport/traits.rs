//! Byte-stream transport abstraction.
//!
//! Defines the `WireTransport` trait the engine's receive loop consumes,
//! allowing different implementations (serial port, mock, etc.).

use std::time::Duration;

use thiserror::Error;

use crate::protocol::MAX_PKT_SIZE;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open port {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("Read timed out")]
    Timeout,

    #[error("Transport disconnected")]
    Disconnected,

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Flush did not complete within {timeout_ms}ms")]
    FlushTimeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract serial byte-stream interface.
///
/// This trait enables:
/// - Production implementation over a USB-CDC virtual COM port
/// - Mock implementation for unit testing
/// - Future alternative backends (UART, network)
pub trait WireTransport: Send {
    /// Block until at least one byte arrived; returns whatever is available.
    fn read(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Queue bytes for transmit.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Block until all queued bytes reached the hardware, or time out.
    fn flush(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Stop delivering receive data so the surrounding application can hand
    /// the link to another function. `force` discards buffered bytes.
    fn pause(&mut self, force: bool) -> bool;

    /// Resume after [`pause`](WireTransport::pause).
    fn resume(&mut self) -> bool;

    /// Largest decoded packet the link accepts.
    fn max_packet_size(&self) -> usize {
        MAX_PKT_SIZE
    }
}
