//! Device handle and the command retry driver.
//!
//! `Device::exchange` is the only path by which commands reach the bus. It
//! paces each command by its execution time and re-sends the identical frame
//! when the device answers with the Awake status or a corrupted frame.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::crypto::CryptoError;
use crate::events::{HashletEvent, HashletObserver, PacketDirection, TracingObserver};
use crate::protocol::constants::DEFAULT_RETRY_BUDGET;
use crate::protocol::frame::{Command, FrameError, Response, parse_response, response_size};
use crate::protocol::{Opcode, StatusResponse};
use crate::transport::{Transport, TransportError};
use crate::zone::Zone;

/// Caller or configuration errors, raised before touching the device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("{what} must be {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Nonce input must be 20 or 32 bytes, got {0}")]
    InvalidNonceLength(usize),
    #[error("Slot {slot} is out of range for the {zone} zone")]
    InvalidSlot { zone: Zone, slot: u8 },
    #[error("Key slot {0} is out of range")]
    InvalidKeySlot(u8),
    #[error("OTP zone is not in read-only mode")]
    OtpNotReadOnly,
    #[error("Data zone is locked while the config zone is not")]
    InconsistentLocks,
    #[error("{0} zone is locked")]
    ZoneLocked(Zone),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("{opcode} returned status: {status}")]
    Status {
        opcode: Opcode,
        status: StatusResponse,
    },

    #[error("{opcode} failed after {attempts} attempts")]
    RetryExhausted { opcode: Opcode, attempts: u32 },

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Unexpected {opcode} response: expected {expected} bytes, got {actual}")]
    UnexpectedResponse {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },
}

impl DeviceError {
    /// Status reported by the device, if this is a device outcome.
    pub fn status(&self) -> Option<StatusResponse> {
        match self {
            DeviceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// How long to wait between writing a command and reading its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Typical execution time.
    #[default]
    Typical,
    /// Worst case execution time.
    Maximum,
    /// No wait. Only useful for simulated transports.
    Disabled,
}

impl Pacing {
    pub fn delay(self, opcode: Opcode) -> Duration {
        match self {
            Pacing::Typical => opcode.typical_exec_time(),
            Pacing::Maximum => opcode.max_exec_time(),
            Pacing::Disabled => Duration::ZERO,
        }
    }
}

/// Exclusive handle to one device on one transport.
pub struct Device<T: Transport> {
    transport: T,
    observer: Arc<dyn HashletObserver>,
    retry_budget: u32,
    pacing: Pacing,
}

impl<T: Transport> Device<T> {
    /// Create a device handle with the default tracing observer.
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver))
    }

    pub fn with_observer(transport: T, observer: Arc<dyn HashletObserver>) -> Self {
        Self {
            transport,
            observer,
            retry_budget: DEFAULT_RETRY_BUDGET,
            pacing: Pacing::default(),
        }
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget.max(1);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn observer(&self) -> &dyn HashletObserver {
        self.observer.as_ref()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Wake the device from sleep.
    pub fn wake(&mut self) -> Result<(), DeviceError> {
        self.transport.wake()?;
        self.observer.on_event(&HashletEvent::DeviceAwake);
        Ok(())
    }

    /// Put the device to sleep. TempKey and the RNG state are lost.
    pub fn sleep(&mut self) -> Result<(), DeviceError> {
        self.transport.sleep()?;
        self.observer.on_event(&HashletEvent::DeviceAsleep);
        Ok(())
    }

    /// Put the device into idle mode. TempKey survives.
    pub fn idle(&mut self) -> Result<(), DeviceError> {
        self.transport.idle()?;
        Ok(())
    }

    /// Send `command` and return its `expected_len` byte payload.
    ///
    /// A one byte response arrives as a status frame; success yields `[0x00]`.
    #[instrument(level = "debug", skip(self, command), fields(opcode = %command.opcode))]
    pub fn exchange(
        &mut self,
        command: &Command,
        expected_len: usize,
    ) -> Result<Vec<u8>, DeviceError> {
        let frame = command.to_bytes();
        let read_len = response_size(expected_len);
        let opcode = command.opcode;

        debug!(command = ?command, frame = %hex::encode_upper(&frame), "Sending command");

        let mut resend = true;
        for attempt in 1..=self.retry_budget {
            if resend {
                let written = self.transport.write(&frame)?;
                if written <= 1 {
                    return Err(TransportError::ShortWrite {
                        written,
                        expected: frame.len(),
                    }
                    .into());
                }
                self.emit_packet(PacketDirection::Tx, opcode, &frame);
            }

            let delay = self.pacing.delay(opcode);
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            let reason = match self.transport.read(read_len) {
                Ok(buf) => {
                    self.emit_packet(PacketDirection::Rx, opcode, &buf);
                    resend = true;
                    match parse_response(&buf, expected_len) {
                        Ok(Response::Payload(payload)) => return Ok(payload),
                        Ok(Response::Status(StatusResponse::Success)) if expected_len == 1 => {
                            return Ok(vec![StatusResponse::Success.as_byte()]);
                        }
                        Ok(Response::Status(status)) if status.is_retryable() => {
                            status.to_string()
                        }
                        Ok(Response::Status(status)) => {
                            debug!(status = %status, "Device status");
                            return Err(DeviceError::Status { opcode, status });
                        }
                        Err(e) => e.to_string(),
                    }
                }
                // Still executing: the device NACKs its address, so poll again.
                Err(e @ (TransportError::ReadFailed(_) | TransportError::Timeout { .. })) => {
                    resend = false;
                    e.to_string()
                }
                Err(e) => return Err(e.into()),
            };

            if attempt < self.retry_budget {
                if resend {
                    warn!(attempt = attempt, reason = %reason, "Resending command");
                } else {
                    warn!(attempt = attempt, reason = %reason, "Device busy, reading again");
                }
                self.observer.on_event(&HashletEvent::Retry {
                    opcode,
                    attempt,
                    reason,
                });
            }
        }

        Err(DeviceError::RetryExhausted {
            opcode,
            attempts: self.retry_budget,
        })
    }

    /// Exchange a command whose payload must be exactly `N` bytes.
    pub(crate) fn exchange_array<const N: usize>(
        &mut self,
        command: &Command,
    ) -> Result<[u8; N], DeviceError> {
        let payload = self.exchange(command, N)?;
        payload
            .as_slice()
            .try_into()
            .map_err(|_| DeviceError::UnexpectedResponse {
                opcode: command.opcode,
                expected: N,
                actual: payload.len(),
            })
    }

    /// Exchange a command answered by a single status byte.
    pub(crate) fn exchange_ack(&mut self, command: &Command) -> Result<(), DeviceError> {
        self.exchange(command, 1).map(|_| ())
    }

    fn emit_packet(&self, direction: PacketDirection, opcode: Opcode, data: &[u8]) {
        self.observer.on_event(&HashletEvent::Packet {
            direction,
            opcode,
            length: data.len(),
            data: Some(data.iter().take(40).cloned().collect()),
        });
    }
}
