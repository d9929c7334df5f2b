//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to subscribe to device events
//! without tight coupling to the core logic.

use std::fmt;

use crate::protocol::Opcode;
use crate::state::DeviceState;

/// Personalization phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalizePhase {
    /// Nothing done yet.
    Idle,
    /// Writing slot configurations and the OTP mode word.
    ConfigWrite,
    /// Locking the Config zone.
    ConfigLock,
    /// Writing the OTP banner blocks.
    OtpWrite,
    /// Writing the 16 data slots.
    KeyWrite,
    /// Locking the Data and OTP zones.
    DataLock,
    /// Goal state reached.
    Complete,
}

impl fmt::Display for PersonalizePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonalizePhase::Idle => write!(f, "Idle"),
            PersonalizePhase::ConfigWrite => write!(f, "Config Write"),
            PersonalizePhase::ConfigLock => write!(f, "Config Lock"),
            PersonalizePhase::OtpWrite => write!(f, "OTP Write"),
            PersonalizePhase::KeyWrite => write!(f, "Key Write"),
            PersonalizePhase::DataLock => write!(f, "Data Lock"),
            PersonalizePhase::Complete => write!(f, "Complete"),
        }
    }
}

/// Events emitted while driving the device.
#[derive(Debug, Clone)]
pub enum HashletEvent {
    /// Device answered the wake sequence.
    DeviceAwake,
    /// Device was put to sleep.
    DeviceAsleep,
    /// Lifecycle state read back from the lock bytes.
    StateObserved { state: DeviceState },
    /// Personalization phase changed.
    PhaseChanged {
        from: PersonalizePhase,
        to: PersonalizePhase,
    },
    /// A command is about to be retried.
    Retry {
        opcode: Opcode,
        attempt: u32,
        reason: String,
    },
    /// Bus packet sent/received.
    Packet {
        direction: PacketDirection,
        opcode: Opcode,
        length: usize,
        data: Option<Vec<u8>>,
    },
}

/// Bus packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving device events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait HashletObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &HashletEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl HashletObserver for NullObserver {
    fn on_event(&self, _event: &HashletEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl HashletObserver for TracingObserver {
    fn on_event(&self, event: &HashletEvent) {
        match event {
            HashletEvent::DeviceAwake => {
                tracing::debug!("Device awake");
            }
            HashletEvent::DeviceAsleep => {
                tracing::debug!("Device asleep");
            }
            HashletEvent::StateObserved { state } => {
                tracing::debug!(state = %state, "Device state");
            }
            HashletEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            HashletEvent::Retry {
                opcode,
                attempt,
                reason,
            } => {
                tracing::warn!(opcode = %opcode, attempt = attempt, "Retrying: {}", reason);
            }
            HashletEvent::Packet {
                direction,
                opcode,
                length,
                data,
            } => {
                tracing::trace!(
                    dir = %direction,
                    opcode = %opcode,
                    len = length,
                    data = %data.as_deref().map(hex::encode_upper).unwrap_or_default(),
                    "I2C Packet"
                );
            }
        }
    }
}
