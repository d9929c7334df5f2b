//! Memory zones and slot addressing.

use std::fmt;

use crate::device::PreconditionError;
use crate::protocol::constants::{CONFIG_ZONE_SIZE, DATA_ZONE_SIZE, OTP_ZONE_SIZE};

/// One of the three independently lockable memory regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Config,
    Otp,
    Data,
}

impl Zone {
    /// Zone selector bits of param1.
    pub const fn bits(self) -> u8 {
        match self {
            Zone::Config => 0b0000_0000,
            Zone::Otp => 0b0000_0001,
            Zone::Data => 0b0000_0010,
        }
    }

    /// Highest 32-byte block index in the zone.
    pub const fn max_slot(self) -> u8 {
        match self {
            Zone::Config => 2,
            Zone::Otp => 1,
            Zone::Data => 15,
        }
    }

    pub const fn size(self) -> usize {
        match self {
            Zone::Config => CONFIG_ZONE_SIZE,
            Zone::Otp => OTP_ZONE_SIZE,
            Zone::Data => DATA_ZONE_SIZE,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Config => write!(f, "Config"),
            Zone::Otp => write!(f, "OTP"),
            Zone::Data => write!(f, "Data"),
        }
    }
}

/// Word address of 32-byte block `slot` inside `zone`.
pub fn slot_to_addr(zone: Zone, slot: u8) -> Result<u8, PreconditionError> {
    if slot > zone.max_slot() {
        return Err(PreconditionError::InvalidSlot { zone, slot });
    }
    Ok(slot << 3)
}
