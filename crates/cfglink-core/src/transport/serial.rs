//! serialport-backed transport for a USB-CDC virtual COM port.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use super::traits::{TransportError, WireTransport};

/// How long one blocking `read` waits before reporting a timeout. The
/// session loop simply retries, so this only bounds shutdown latency.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 512;

pub struct SerialWire {
    port: Box<dyn SerialPort>,
    read_buf: Vec<u8>,
    paused: bool,
}

impl SerialWire {
    /// Open `path` at `baud`. The baud rate is nominal for a CDC-ACM port
    /// but required by the driver.
    pub fn open(path: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                port: path.to_owned(),
                message: e.to_string(),
            })?;
        info!(port = path, baud, "Serial transport opened");
        Ok(Self {
            port,
            read_buf: vec![0u8; READ_CHUNK],
            paused: false,
        })
    }
}

impl WireTransport for SerialWire {
    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.paused {
            return Err(TransportError::Timeout);
        }
        match self.port.read(self.read_buf.as_mut_slice()) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => Ok(self.read_buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(TransportError::Timeout),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(TransportError::Disconnected)
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.port
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        Ok(data.len())
    }

    fn flush(&mut self, timeout: Duration) -> Result<(), TransportError> {
        // The OS driver drains synchronously; the timeout bounds our report.
        self.port.flush().map_err(|_| TransportError::FlushTimeout {
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    fn pause(&mut self, force: bool) -> bool {
        if force {
            let _ = self.port.clear(serialport::ClearBuffer::Input);
        }
        debug!(force, "Serial transport paused");
        self.paused = true;
        true
    }

    fn resume(&mut self) -> bool {
        debug!("Serial transport resumed");
        self.paused = false;
        true
    }
}
