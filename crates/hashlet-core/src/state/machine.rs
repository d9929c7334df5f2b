//! Device lifecycle state, derived from the lock bytes.

use std::fmt;

use tracing::debug;

use crate::device::{Device, DeviceError, PreconditionError};
use crate::events::HashletEvent;
use crate::protocol::constants::{
    LOCK_CONFIG_INDEX, LOCK_VALUE_INDEX, LOCK_WORD, OTP_MODE_READ_ONLY, OTP_MODE_WORD, UNLOCKED,
};
use crate::transport::Transport;
use crate::zone::Zone;

/// Provisioning state. Ordered; a device never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceState {
    /// Config and Data zones unlocked.
    Factory,
    /// Config zone locked.
    Initialized,
    /// Config and Data zones locked.
    Personalized,
}

impl DeviceState {
    pub fn from_locks(config_locked: bool, data_locked: bool) -> Result<Self, PreconditionError> {
        match (config_locked, data_locked) {
            (false, false) => Ok(DeviceState::Factory),
            (true, false) => Ok(DeviceState::Initialized),
            (true, true) => Ok(DeviceState::Personalized),
            (false, true) => Err(PreconditionError::InconsistentLocks),
        }
    }

    /// Decode the state from the raw lock word.
    pub fn from_lock_word(word: [u8; 4]) -> Result<Self, PreconditionError> {
        Self::from_locks(
            word[LOCK_CONFIG_INDEX] != UNLOCKED,
            word[LOCK_VALUE_INDEX] != UNLOCKED,
        )
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Factory => write!(f, "Factory"),
            DeviceState::Initialized => write!(f, "Initialized"),
            DeviceState::Personalized => write!(f, "Personalized"),
        }
    }
}

impl<T: Transport> Device<T> {
    fn lock_word(&mut self) -> Result<[u8; 4], DeviceError> {
        self.read4(Zone::Config, LOCK_WORD)
    }

    /// Whether `zone` is locked. OTP and Data share one lock byte.
    pub fn is_locked(&mut self, zone: Zone) -> Result<bool, DeviceError> {
        let word = self.lock_word()?;
        let index = match zone {
            Zone::Config => LOCK_CONFIG_INDEX,
            Zone::Otp | Zone::Data => LOCK_VALUE_INDEX,
        };
        Ok(word[index] != UNLOCKED)
    }

    /// Read the lock bytes and derive the lifecycle state.
    pub fn device_state(&mut self) -> Result<DeviceState, DeviceError> {
        let word = self.lock_word()?;
        let state = DeviceState::from_lock_word(word)?;
        debug!(lock_word = %hex::encode_upper(word), state = %state, "Read device state");
        self.observer()
            .on_event(&HashletEvent::StateObserved { state });
        Ok(state)
    }

    /// Whether the OTP zone is configured read-only.
    pub fn is_otp_read_only_mode(&mut self) -> Result<bool, DeviceError> {
        let word = self.read4(Zone::Config, OTP_MODE_WORD)?;
        Ok(word[2] == OTP_MODE_READ_ONLY)
    }
}
