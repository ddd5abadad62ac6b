//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{TransportError, WireTransport};

/// Mock transport for unit testing the engine and session loop.
///
/// Clones share state: a test keeps one handle to queue inbound bytes and
/// inspect captured writes while the session owns another.
#[derive(Clone)]
pub struct MockWire {
    /// Queued inbound byte chunks, one per `read` call.
    rx_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Flat log of all written bytes.
    tx_log: Arc<Mutex<Vec<u8>>>,
    connected: Arc<Mutex<bool>>,
    paused: Arc<Mutex<bool>>,
}

impl MockWire {
    pub fn new() -> Self {
        Self {
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            tx_log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
            paused: Arc::new(Mutex::new(false)),
        }
    }

    /// Queue inbound bytes to be returned by the next `read`.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.rx_queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// All bytes written so far.
    pub fn written(&self) -> Vec<u8> {
        self.tx_log.lock().unwrap().clone()
    }

    pub fn clear_written(&self) {
        self.tx_log.lock().unwrap().clear();
    }

    /// Simulate the host unplugging the cable.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap()
    }
}

impl Default for MockWire {
    fn default() -> Self {
        Self::new()
    }
}

impl WireTransport for MockWire {
    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        // An exhausted queue ends the session cleanly, which lets tests run
        // the full receive loop to completion.
        self.rx_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Disconnected)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.tx_log.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        Ok(())
    }

    fn pause(&mut self, force: bool) -> bool {
        let mut paused = self.paused.lock().unwrap();
        if force {
            self.rx_queue.lock().unwrap().clear();
        }
        *paused = true;
        true
    }

    fn resume(&mut self) -> bool {
        *self.paused.lock().unwrap() = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_and_read() {
        let mock = MockWire::new();
        mock.queue_bytes(b"abc");
        mock.queue_bytes(b"de");

        let mut wire = mock.clone();
        assert_eq!(wire.read().unwrap(), b"abc");
        assert_eq!(wire.read().unwrap(), b"de");
        assert!(matches!(wire.read(), Err(TransportError::Disconnected)));
    }

    #[test]
    fn test_write_capture() {
        let mock = MockWire::new();
        let mut wire = mock.clone();
        wire.write(b"one").unwrap();
        wire.write(b"two").unwrap();
        assert_eq!(mock.written(), b"onetwo");
    }

    #[test]
    fn test_disconnect() {
        let mock = MockWire::new();
        let mut wire = mock.clone();
        mock.disconnect();
        assert!(matches!(wire.read(), Err(TransportError::Disconnected)));
        assert!(wire.write(b"x").is_err());
    }

    #[test]
    fn test_forced_pause_discards_buffered_bytes() {
        let mock = MockWire::new();
        mock.queue_bytes(b"stale");
        let mut wire = mock.clone();
        assert!(wire.pause(true));
        assert!(mock.is_paused());
        assert!(matches!(wire.read(), Err(TransportError::Disconnected)));
        assert!(wire.resume());
    }
}
