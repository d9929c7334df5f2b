//! Bus transport abstraction.
//!
//! Defines the `Transport` trait for talking to the device,
//! allowing different implementations (Linux i2c-dev, mock, simulators).

use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::constants::{
    AWAKE_FRAME, STATUS_FRAME_SIZE, WAKE_DELAY_US, WORD_ADDRESS_IDLE, WORD_ADDRESS_SLEEP,
};
use crate::protocol::crc::is_crc_valid;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open I2C bus {path}: {message}")]
    OpenFailed { path: String, message: String },

    #[error("Failed to select I2C address 0x{address:02X}: {message}")]
    AddressSelectFailed { address: u16, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Wake failed: unexpected response {0:02X?}")]
    WakeFailed(Vec<u8>),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract bus transport to a single device.
///
/// This trait enables:
/// - Production implementation over Linux i2c-dev
/// - Mock implementation for unit testing
/// - Simulated devices for integration tests
pub trait Transport: Send + Sync {
    /// Write raw bytes, word address included.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `len` raw bytes.
    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Wake the device and check the Awake frame.
    fn wake(&self) -> Result<(), TransportError> {
        // The device NACKs while asleep, so only a hard failure matters here.
        let written = self.write(&[0u8; 4])?;
        if written <= 1 {
            return Err(TransportError::ShortWrite {
                written,
                expected: 4,
            });
        }
        thread::sleep(Duration::from_micros(WAKE_DELAY_US));

        let resp = self.read(STATUS_FRAME_SIZE)?;
        if resp.len() < STATUS_FRAME_SIZE || !is_crc_valid(&resp[..STATUS_FRAME_SIZE]) {
            return Err(TransportError::WakeFailed(resp));
        }
        if resp[..STATUS_FRAME_SIZE] != AWAKE_FRAME {
            tracing::debug!(resp = %hex::encode_upper(&resp), "Device was already awake");
        }
        Ok(())
    }

    /// Put the device to sleep, clearing TempKey and volatile state.
    fn sleep(&self) -> Result<(), TransportError> {
        self.write(&[WORD_ADDRESS_SLEEP]).map(|_| ())
    }

    /// Put the device into idle mode, keeping TempKey.
    fn idle(&self) -> Result<(), TransportError> {
        self.write(&[WORD_ADDRESS_IDLE]).map(|_| ())
    }

    /// Check if the bus is still usable.
    fn is_connected(&self) -> bool;
}
