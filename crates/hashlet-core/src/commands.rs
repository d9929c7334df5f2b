//! Command catalog.
//!
//! One method per device operation. Each builds a `Command` and hands it to
//! the retry driver with the response length the datasheet specifies.

use tracing::{debug, info, instrument};

use crate::crypto::{self, EncryptedWrite, OtherData, check_mac_meta};
use crate::device::{Device, DeviceError, PreconditionError};
use crate::protocol::constants::{
    BLOCK_SIZE, CONFIG_ZONE_SIZE, CONFIG_ZONE_WORDS, DATA_SLOT_COUNT, HMAC_MODE_DEFAULT,
    LOCK_ZONE_CONFIG, LOCK_ZONE_DATA, LOCK_ZONE_NO_CRC, NONCE_MODE_PASSTHROUGH,
    NONCE_MODE_UPDATE_SEED, NONCE_RANDOM_INPUT_SIZE, OTP_ZONE_SIZE, RANDOM_NO_UPDATE_SEED,
    RANDOM_UPDATE_SEED, SERIAL_NUM_SIZE, SLOT_CONFIG_WORD, WORD_SIZE, ZONE_READWRITE_32,
};
use crate::protocol::{CheckMacMode, Command, MacMode, Opcode, StatusResponse};
use crate::state::SlotConfig;
use crate::transport::Transport;
use crate::zone::{Zone, slot_to_addr};

const RANDOM_SIZE: usize = 32;
const DIGEST_SIZE: usize = 32;
const DEV_REV_SIZE: usize = 4;

/// Result of a MAC or HMAC command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacResponse {
    pub mac: [u8; DIGEST_SIZE],
    /// The 13 bytes of other data needed to rebuild the digest.
    pub meta: [u8; crypto::META_SIZE],
    /// Whether the digest was confirmed.
    pub verified: bool,
}

pub type HmacResponse = MacResponse;

fn check_len(what: &'static str, bytes: &[u8], expected: usize) -> Result<(), PreconditionError> {
    if bytes.len() != expected {
        return Err(PreconditionError::InvalidLength {
            what,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn check_key_slot(slot: u8) -> Result<(), PreconditionError> {
    if slot as usize >= DATA_SLOT_COUNT {
        return Err(PreconditionError::InvalidKeySlot(slot));
    }
    Ok(())
}

impl<T: Transport> Device<T> {
    /// 32 random bytes. With `update_seed` false the EEPROM seed is left alone.
    pub fn random(&mut self, update_seed: bool) -> Result<[u8; RANDOM_SIZE], DeviceError> {
        let mode = if update_seed {
            RANDOM_UPDATE_SEED
        } else {
            RANDOM_NO_UPDATE_SEED
        };
        self.exchange_array(&Command::simple(Opcode::Random, mode, 0))
    }

    /// Exactly `n` random bytes, drawn 32 at a time.
    pub fn random_bytes(&mut self, n: usize, update_seed: bool) -> Result<Vec<u8>, DeviceError> {
        let mut out = Vec::with_capacity(n.next_multiple_of(RANDOM_SIZE));
        while out.len() < n {
            out.extend_from_slice(&self.random(update_seed)?);
        }
        out.truncate(n);
        Ok(out)
    }

    pub fn read4(&mut self, zone: Zone, addr: u8) -> Result<[u8; WORD_SIZE], DeviceError> {
        self.exchange_array(&Command::simple(Opcode::Read, zone.bits(), addr as u16))
    }

    pub fn read32(&mut self, zone: Zone, addr: u8) -> Result<[u8; BLOCK_SIZE], DeviceError> {
        self.exchange_array(&Command::simple(
            Opcode::Read,
            zone.bits() | ZONE_READWRITE_32,
            addr as u16,
        ))
    }

    pub fn write4(&mut self, zone: Zone, addr: u8, data: [u8; WORD_SIZE]) -> Result<(), DeviceError> {
        debug!(zone = %zone, addr = addr, data = %hex::encode_upper(data), "write4");
        let cmd = Command::new(Opcode::Write, zone.bits(), [addr, 0], data.to_vec())?;
        self.exchange_ack(&cmd)
    }

    /// Write a 32-byte block, followed by an input MAC for encrypted writes.
    pub fn write32(
        &mut self,
        zone: Zone,
        addr: u8,
        data: &[u8; BLOCK_SIZE],
        mac: Option<&[u8; DIGEST_SIZE]>,
    ) -> Result<(), DeviceError> {
        let mut payload = data.to_vec();
        if let Some(mac) = mac {
            payload.extend_from_slice(mac);
        }
        let cmd = Command::new(Opcode::Write, zone.bits() | ZONE_READWRITE_32, [addr, 0], payload)?;
        self.exchange_ack(&cmd)
    }

    /// Load TempKey.
    ///
    /// 32 bytes are passed through and the device acks with `[0x00]`. 20 bytes
    /// are combined with a fresh random number, which is returned.
    pub fn nonce(&mut self, data: &[u8]) -> Result<Vec<u8>, DeviceError> {
        match data.len() {
            32 => {
                let cmd = Command::new(Opcode::Nonce, NONCE_MODE_PASSTHROUGH, [0, 0], data.to_vec())?;
                self.exchange(&cmd, 1)
            }
            NONCE_RANDOM_INPUT_SIZE => {
                let cmd = Command::new(Opcode::Nonce, NONCE_MODE_UPDATE_SEED, [0, 0], data.to_vec())?;
                self.exchange(&cmd, RANDOM_SIZE)
            }
            other => Err(PreconditionError::InvalidNonceLength(other).into()),
        }
    }

    /// Lock `zone`. `crc` is the CRC16 of the zone contents; `None` skips the check.
    #[instrument(level = "info", skip(self))]
    pub fn lock(&mut self, zone: Zone, crc: Option<u16>) -> Result<(), DeviceError> {
        if self.is_locked(zone)? {
            return Err(PreconditionError::ZoneLocked(zone).into());
        }
        let mut param1 = match zone {
            Zone::Config => LOCK_ZONE_CONFIG,
            Zone::Otp | Zone::Data => LOCK_ZONE_DATA,
        };
        if crc.is_none() {
            param1 |= LOCK_ZONE_NO_CRC;
        }
        let cmd = Command::simple(Opcode::Lock, param1, crc.unwrap_or(0));
        self.exchange_ack(&cmd)?;
        info!(zone = %zone, "Zone locked");
        Ok(())
    }

    /// Load TempKey from a digest over `slot` of `zone`.
    pub fn gen_digest(&mut self, zone: Zone, slot: u8) -> Result<(), DeviceError> {
        if zone == Zone::Data {
            check_key_slot(slot)?;
        }
        let cmd = Command::simple(Opcode::GenDig, zone.bits(), slot as u16);
        self.exchange_ack(&cmd)
    }

    /// Issue a MAC and confirm it with CheckMac on the device.
    #[instrument(level = "debug", skip(self, challenge), fields(mode = %mode))]
    pub fn mac(
        &mut self,
        mode: MacMode,
        slot: u8,
        challenge: &[u8],
    ) -> Result<MacResponse, DeviceError> {
        check_key_slot(slot)?;
        let data = if mode.needs_challenge() {
            check_len("challenge", challenge, crypto::CHALLENGE_SIZE)?;
            challenge.to_vec()
        } else {
            Vec::new()
        };

        let cmd = Command::new(Opcode::Mac, mode.to_byte(), [slot, 0], data)?;
        let mac: [u8; DIGEST_SIZE] = self.exchange_array(&cmd)?;

        let other = self.other_data(&mode)?;
        let meta = check_mac_meta(&mode, slot, &other);

        // CheckMac always takes a challenge; TempKey replaces it when selected.
        let challenge: [u8; 32] = if mode.needs_challenge() {
            crypto::fixed("challenge", challenge)?
        } else {
            [0u8; 32]
        };
        let verified = self.check_mac(CheckMacMode::for_mac(&mode), slot, &challenge, &mac, &meta)?;
        debug!(verified = verified, mac = %hex::encode_upper(mac), "MAC issued");

        Ok(MacResponse {
            mac,
            meta,
            verified,
        })
    }

    /// OTP and serial bytes `mode` mixes into a MAC, read from the device.
    fn other_data(&mut self, mode: &MacMode) -> Result<OtherData, DeviceError> {
        let otp = if mode.use_otp_0_7 || mode.use_otp_0_10 {
            self.otp_zone()?
        } else {
            vec![0u8; OTP_ZONE_SIZE]
        };
        let serial = if mode.use_serial_num {
            self.serial_num()?
        } else {
            [0u8; SERIAL_NUM_SIZE]
        };
        Ok(OtherData::from_device(mode, &otp, &serial)?)
    }

    /// Ask the device to recompute and compare a MAC. A miscompare is `Ok(false)`.
    pub fn check_mac(
        &mut self,
        mode: CheckMacMode,
        slot: u8,
        challenge: &[u8],
        response: &[u8],
        other_data: &[u8],
    ) -> Result<bool, DeviceError> {
        check_len("challenge", challenge, crypto::CHALLENGE_SIZE)?;
        check_len("challenge response", response, DIGEST_SIZE)?;
        check_len("other data", other_data, crypto::META_SIZE)?;
        check_key_slot(slot)?;

        let mut data = Vec::with_capacity(challenge.len() + response.len() + other_data.len());
        data.extend_from_slice(challenge);
        data.extend_from_slice(response);
        data.extend_from_slice(other_data);

        let cmd = Command::new(Opcode::CheckMac, mode.to_byte(), [slot, 0], data)?;
        match self.exchange_ack(&cmd) {
            Ok(()) => Ok(true),
            Err(DeviceError::Status {
                status: StatusResponse::CheckMacMiscompare,
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// HMAC of `challenge` under the key in `slot`.
    ///
    /// The challenge is loaded into TempKey first. When `key` is given the
    /// result is verified offline.
    pub fn hmac(
        &mut self,
        slot: u8,
        challenge: &[u8],
        key: Option<&[u8]>,
    ) -> Result<HmacResponse, DeviceError> {
        check_key_slot(slot)?;
        check_len("challenge", challenge, crypto::CHALLENGE_SIZE)?;

        self.nonce(challenge)?;
        let cmd = Command::simple(Opcode::Hmac, HMAC_MODE_DEFAULT, slot as u16);
        let mac: [u8; DIGEST_SIZE] = self.exchange_array(&cmd)?;

        let mut meta = [0u8; crypto::META_SIZE];
        meta[0] = Opcode::Hmac.code();
        meta[1] = HMAC_MODE_DEFAULT;
        meta[2] = slot;

        let verified = match key {
            Some(key) => crypto::verify_hmac_defaults(challenge, &mac, key, slot as u16)?,
            None => false,
        };

        Ok(HmacResponse {
            mac,
            meta,
            verified,
        })
    }

    /// Silicon revision.
    pub fn dev_rev(&mut self) -> Result<[u8; DEV_REV_SIZE], DeviceError> {
        self.exchange_array(&Command::simple(Opcode::DevRev, 0, 0))
    }

    /// SN[0..9], gathered from config words 0, 2 and 3.
    pub fn serial_num(&mut self) -> Result<[u8; SERIAL_NUM_SIZE], DeviceError> {
        let w0 = self.read4(Zone::Config, 0x00)?;
        let w2 = self.read4(Zone::Config, 0x02)?;
        let w3 = self.read4(Zone::Config, 0x03)?;

        let mut serial = [0u8; SERIAL_NUM_SIZE];
        serial[..4].copy_from_slice(&w0);
        serial[4..8].copy_from_slice(&w2);
        serial[8] = w3[0];
        Ok(serial)
    }

    /// All 88 bytes of the Config zone.
    pub fn config_zone(&mut self) -> Result<Vec<u8>, DeviceError> {
        let mut zone = Vec::with_capacity(CONFIG_ZONE_SIZE);
        for addr in 0..CONFIG_ZONE_WORDS {
            zone.extend_from_slice(&self.read4(Zone::Config, addr)?);
        }
        Ok(zone)
    }

    /// All 64 bytes of the OTP zone.
    pub fn otp_zone(&mut self) -> Result<Vec<u8>, DeviceError> {
        let mut zone = Vec::with_capacity(OTP_ZONE_SIZE);
        for block in 0..=Zone::Otp.max_slot() {
            let addr = slot_to_addr(Zone::Otp, block)?;
            zone.extend_from_slice(&self.read32(Zone::Otp, addr)?);
        }
        Ok(zone)
    }

    /// Config word holding the slot pair that contains `slot`.
    fn slot_config_addr(slot: u8) -> Result<u8, PreconditionError> {
        check_key_slot(slot)?;
        Ok(SLOT_CONFIG_WORD + slot / 2)
    }

    pub fn slot_config(&mut self, slot: u8) -> Result<SlotConfig, DeviceError> {
        let addr = Self::slot_config_addr(slot)?;
        let word = self.read4(Zone::Config, addr)?;
        Ok(SlotConfig::from_word(word, slot))
    }

    /// Write the configs of the pair starting at even `slot`.
    pub fn write_slot_configs(
        &mut self,
        slot: u8,
        even: &SlotConfig,
        odd: &SlotConfig,
    ) -> Result<(), DeviceError> {
        if slot % 2 != 0 {
            return Err(PreconditionError::InvalidKeySlot(slot).into());
        }
        let addr = Self::slot_config_addr(slot)?;
        self.write4(Zone::Config, addr, SlotConfig::pair_to_word(even, odd))
    }

    /// Clear-text read of a data slot.
    pub fn read_key_slot(&mut self, slot: u8) -> Result<[u8; BLOCK_SIZE], DeviceError> {
        let addr = slot_to_addr(Zone::Data, slot)?;
        self.read32(Zone::Data, addr)
    }

    /// Clear-text write of a data slot.
    pub fn write_key_slot(&mut self, slot: u8, key: &[u8; BLOCK_SIZE]) -> Result<(), DeviceError> {
        let addr = slot_to_addr(Zone::Data, slot)?;
        self.write32(Zone::Data, addr, key, None)
    }

    /// Replace the key in `slot`, encrypting with the slot's current key.
    #[instrument(level = "info", skip(self, new_key, current_key))]
    pub fn write_key_slot_encrypted(
        &mut self,
        slot: u8,
        new_key: &[u8; BLOCK_SIZE],
        current_key: &[u8; BLOCK_SIZE],
    ) -> Result<(), DeviceError> {
        check_key_slot(slot)?;
        let otp = self.otp_zone()?;
        let random = self.nonce(&otp[..NONCE_RANDOM_INPUT_SIZE])?;
        self.gen_digest(Zone::Data, slot)?;

        let write = EncryptedWrite::prepare(&random, &otp, slot, current_key, new_key)?;
        self.write32(Zone::Data, write.addr, &write.ciphertext, Some(&write.mac))
    }
}
