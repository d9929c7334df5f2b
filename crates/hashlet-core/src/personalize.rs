//! One-way provisioning: Factory -> Initialized -> Personalized.
//!
//! Every step checks the lock bytes first, so an interrupted run can be
//! resumed by calling `personalize` again.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::device::{Device, DeviceError, PreconditionError};
use crate::events::{HashletEvent, PersonalizePhase};
use crate::keys::KeyContainer;
use crate::keystore::{KeyStore, KeyStoreError};
use crate::protocol::constants::{
    BLOCK_SIZE, DATA_SLOT_COUNT, OTP_BANNER, OTP_MODE_WORD, OTP_MODE_WORD_VALUE,
    OTP_VERSION_PREFIX, OTP_ZONE_SIZE,
};
use crate::protocol::crc16;
use crate::state::{DeviceState, SlotConfig};
use crate::transport::Transport;
use crate::zone::{Zone, slot_to_addr};

#[derive(Error, Debug)]
pub enum PersonalizeError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error("Expected device state {expected} after {phase}, found {actual}")]
    StateMismatch {
        phase: PersonalizePhase,
        expected: DeviceState,
        actual: DeviceState,
    },
}

impl From<PreconditionError> for PersonalizeError {
    fn from(e: PreconditionError) -> Self {
        PersonalizeError::Device(e.into())
    }
}

/// Slot configuration written to every even/odd pair.
///
/// Even slots are check-only secrets, usable only for CheckMac. Odd slots
/// are plain secrets, usable for MAC and HMAC.
pub fn personalization_slot_configs() -> (SlotConfig, SlotConfig) {
    let even = SlotConfig {
        check_only: true,
        is_secret: true,
        ..SlotConfig::default()
    };
    let odd = SlotConfig {
        is_secret: true,
        ..SlotConfig::default()
    };
    (even, odd)
}

/// OTP zone contents written at personalization.
pub fn otp_image(version: &str) -> [u8; OTP_ZONE_SIZE] {
    let mut otp = [0u8; OTP_ZONE_SIZE];
    let banner = OTP_BANNER.as_bytes();
    otp[..banner.len()].copy_from_slice(banner);

    let line = format!("{}{}", OTP_VERSION_PREFIX, version);
    let line = &line.as_bytes()[..line.len().min(BLOCK_SIZE)];
    otp[BLOCK_SIZE..BLOCK_SIZE + line.len()].copy_from_slice(line);
    otp
}

struct Progress<'a, T: Transport> {
    device: &'a mut Device<T>,
    phase: PersonalizePhase,
}

impl<T: Transport> Progress<'_, T> {
    fn goto_phase(&mut self, to: PersonalizePhase) {
        info!(from = %self.phase, to = %to, "Personalization phase");
        self.device.observer().on_event(&HashletEvent::PhaseChanged {
            from: self.phase,
            to,
        });
        self.phase = to;
    }

    fn confirm(&mut self, expected: DeviceState) -> Result<DeviceState, PersonalizeError> {
        let actual = self.device.device_state()?;
        if actual != expected {
            return Err(PersonalizeError::StateMismatch {
                phase: self.phase,
                expected,
                actual,
            });
        }
        Ok(actual)
    }

    fn write_config_zone(&mut self) -> Result<(), DeviceError> {
        let (even, odd) = personalization_slot_configs();
        for slot in (0..DATA_SLOT_COUNT as u8).step_by(2) {
            debug!(slot = slot, "Writing slot config pair");
            self.device.write_slot_configs(slot, &even, &odd)?;
        }
        self.device
            .write4(Zone::Config, OTP_MODE_WORD, OTP_MODE_WORD_VALUE)
    }

    fn lock_config_zone(&mut self) -> Result<(), DeviceError> {
        let config = self.device.config_zone()?;
        self.device.lock(Zone::Config, Some(crc16(&config)))
    }

    /// Clear both OTP blocks, then write the banner. Returns what was written.
    fn write_otp_zone(&mut self) -> Result<[u8; OTP_ZONE_SIZE], PersonalizeError> {
        if !self.device.is_otp_read_only_mode()? {
            return Err(PreconditionError::OtpNotReadOnly.into());
        }

        let otp = otp_image(env!("CARGO_PKG_VERSION"));
        let blank = [0u8; BLOCK_SIZE];
        for block in 0..=Zone::Otp.max_slot() {
            let addr = slot_to_addr(Zone::Otp, block)?;
            self.device.write32(Zone::Otp, addr, &blank, None)?;
        }
        for (block, chunk) in otp.chunks_exact(BLOCK_SIZE).enumerate() {
            let addr = slot_to_addr(Zone::Otp, block as u8)?;
            let mut data = [0u8; BLOCK_SIZE];
            data.copy_from_slice(chunk);
            self.device.write32(Zone::Otp, addr, &data, None)?;
        }
        Ok(otp)
    }

    fn write_keys(&mut self, keys: &KeyContainer) -> Result<(), DeviceError> {
        for (slot, key) in keys.iter().enumerate() {
            debug!(slot = slot, "Writing key");
            self.device.write_key_slot(slot as u8, key)?;
        }
        Ok(())
    }
}

/// Drive the device up to `goal`.
///
/// With no `keys`, 16 keys are drawn from the device RNG. Whatever keys are
/// written are recorded in `store` before the Data zone is locked.
#[instrument(level = "info", skip(device, keys, store))]
pub fn personalize<T: Transport>(
    device: &mut Device<T>,
    goal: DeviceState,
    keys: Option<KeyContainer>,
    store: &mut dyn KeyStore,
) -> Result<DeviceState, PersonalizeError> {
    let mut state = device.device_state()?;
    if state >= goal {
        debug!(state = %state, "Already at goal");
        return Ok(state);
    }

    let mut progress = Progress {
        device,
        phase: PersonalizePhase::Idle,
    };

    if state == DeviceState::Factory {
        progress.goto_phase(PersonalizePhase::ConfigWrite);
        progress.write_config_zone()?;

        progress.goto_phase(PersonalizePhase::ConfigLock);
        progress.lock_config_zone()?;
        state = progress.confirm(DeviceState::Initialized)?;
    }

    if goal == DeviceState::Initialized {
        progress.goto_phase(PersonalizePhase::Complete);
        return Ok(state);
    }

    progress.goto_phase(PersonalizePhase::OtpWrite);
    let otp = progress.write_otp_zone()?;

    progress.goto_phase(PersonalizePhase::KeyWrite);
    let keys = match keys {
        Some(keys) => keys,
        None => KeyContainer::generate(progress.device)?,
    };
    progress.write_keys(&keys)?;
    store.record_keys(&keys)?;

    progress.goto_phase(PersonalizePhase::DataLock);
    let mut image = keys.as_bytes();
    image.extend_from_slice(&otp);
    progress.device.lock(Zone::Data, Some(crc16(&image)))?;
    state = progress.confirm(DeviceState::Personalized)?;

    progress.goto_phase(PersonalizePhase::Complete);
    info!(state = %state, "Personalization complete");
    Ok(state)
}
