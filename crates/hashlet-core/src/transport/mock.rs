//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{Transport, TransportError};
use crate::protocol::constants::AWAKE_FRAME;
use crate::protocol::frame::{encode_response, encode_status};
use crate::protocol::status::StatusResponse;

/// Mock transport for unit testing the retry driver and command catalog.
///
/// Clones share the same queues, so a test can keep a handle after moving
/// the transport into a `Device`.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued frames to return on read.
    response_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Caps the byte count reported by `write`.
    write_limit: Arc<Mutex<Option<usize>>>,
    /// Reads to NACK before serving the queue.
    busy_reads: Arc<Mutex<usize>>,
    /// Whether the bus is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            response_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            write_limit: Arc::new(Mutex::new(None)),
            busy_reads: Arc::new(Mutex::new(0)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue raw bytes to be returned on the next read.
    pub fn queue_raw(&self, bytes: &[u8]) {
        self.response_queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Queue a CRC-protected payload frame.
    pub fn queue_payload(&self, payload: &[u8]) {
        self.queue_raw(&encode_response(payload));
    }

    /// Queue a status frame.
    pub fn queue_status(&self, status: StatusResponse) {
        self.queue_raw(&encode_status(status));
    }

    /// Queue the frame sent after a wake.
    pub fn queue_awake(&self) {
        self.queue_raw(&AWAKE_FRAME);
    }

    /// Number of reads still queued.
    pub fn pending_responses(&self) -> usize {
        self.response_queue.lock().unwrap().len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Report at most `limit` bytes written on every subsequent write.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        *self.write_limit.lock().unwrap() = limit;
    }

    /// Simulate bus disconnect.
    /// Fail the next `reads` reads the way a busy device NACKs them.
    pub fn set_busy_reads(&self, reads: usize) {
        *self.busy_reads.lock().unwrap() = reads;
    }

    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate bus reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        let written = match *self.write_limit.lock().unwrap() {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        Ok(written)
    }

    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        {
            let mut busy = self.busy_reads.lock().unwrap();
            if *busy > 0 {
                *busy -= 1;
                return Err(TransportError::ReadFailed("NACK".into()));
            }
        }
        let mut frame = self
            .response_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 0 })?;
        // Real i2c-dev reads always return `len` bytes; pad like an idle bus.
        frame.resize(len.max(frame.len()), 0xFF);
        Ok(frame)
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}
