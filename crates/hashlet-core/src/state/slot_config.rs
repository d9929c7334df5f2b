//! Per-slot access policy stored in the Config zone.
//!
//! Layout of the two bytes (little-endian word):
//!
//! | bits  | field                          |
//! |-------|--------------------------------|
//! | 0-3   | ReadKey                        |
//! | 4     | CheckOnly                      |
//! | 5     | SingleUse                      |
//! | 6     | EncryptRead                    |
//! | 7     | IsSecret                       |
//! | 8-11  | WriteKey                       |
//! | 12-15 | WriteConfig (DeriveKey on 13)  |

use std::fmt;

use crate::device::PreconditionError;
use crate::protocol::constants::DATA_SLOT_COUNT;

const KEY_MASK: u8 = 0x0F;
const CHECK_ONLY_MASK: u8 = 0x10;
const SINGLE_USE_MASK: u8 = 0x20;
const ENCRYPTED_READ_MASK: u8 = 0x40;
const IS_SECRET_MASK: u8 = 0x80;

const DERIVE_KEY_MASK: u8 = 0x20;
const WRITE_CONFIG_ENCRYPT_MASK: u8 = 0x40;
const WRITE_CONFIG_NEVER_MASK: u8 = 0x80;

/// Write policy of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteConfig {
    /// Clear text writes are always allowed.
    #[default]
    Always,
    /// Writes are refused after the data zone is locked.
    Never,
    /// Writes must be encrypted and carry a MAC.
    Encrypt,
}

impl fmt::Display for WriteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteConfig::Always => write!(f, "Always"),
            WriteConfig::Never => write!(f, "Never"),
            WriteConfig::Encrypt => write!(f, "Encrypt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotConfig {
    pub read_key: u8,
    pub check_only: bool,
    pub single_use: bool,
    pub encrypted_read: bool,
    pub is_secret: bool,
    pub write_key: u8,
    pub derive_key: bool,
    pub write_config: WriteConfig,
}

impl SlotConfig {
    pub const SIZE: usize = 2;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        read_key: u8,
        check_only: bool,
        single_use: bool,
        encrypted_read: bool,
        is_secret: bool,
        write_key: u8,
        derive_key: bool,
        write_config: WriteConfig,
    ) -> Result<Self, PreconditionError> {
        for key in [read_key, write_key] {
            if key as usize >= DATA_SLOT_COUNT {
                return Err(PreconditionError::InvalidKeySlot(key));
            }
        }
        Ok(Self {
            read_key,
            check_only,
            single_use,
            encrypted_read,
            is_secret,
            write_key,
            derive_key,
            write_config,
        })
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        let mut lo = self.read_key & KEY_MASK;
        if self.check_only {
            lo |= CHECK_ONLY_MASK;
        }
        if self.single_use {
            lo |= SINGLE_USE_MASK;
        }
        if self.encrypted_read {
            lo |= ENCRYPTED_READ_MASK;
        }
        if self.is_secret {
            lo |= IS_SECRET_MASK;
        }

        let mut hi = self.write_key & KEY_MASK;
        if self.derive_key {
            hi |= DERIVE_KEY_MASK;
        }
        hi |= match self.write_config {
            WriteConfig::Always => 0,
            WriteConfig::Encrypt => WRITE_CONFIG_ENCRYPT_MASK,
            WriteConfig::Never => WRITE_CONFIG_NEVER_MASK,
        };

        [lo, hi]
    }

    pub fn from_bytes(raw: [u8; 2]) -> Self {
        let [lo, hi] = raw;
        let write_config = if hi & WRITE_CONFIG_ENCRYPT_MASK != 0 {
            WriteConfig::Encrypt
        } else if hi & WRITE_CONFIG_NEVER_MASK != 0 {
            WriteConfig::Never
        } else {
            WriteConfig::Always
        };

        Self {
            read_key: lo & KEY_MASK,
            check_only: lo & CHECK_ONLY_MASK != 0,
            single_use: lo & SINGLE_USE_MASK != 0,
            encrypted_read: lo & ENCRYPTED_READ_MASK != 0,
            is_secret: lo & IS_SECRET_MASK != 0,
            write_key: hi & KEY_MASK,
            derive_key: hi & DERIVE_KEY_MASK != 0,
            write_config,
        }
    }

    /// Pick this slot's half out of a 4-byte config word holding a pair.
    pub fn from_word(word: [u8; 4], slot: u8) -> Self {
        if slot % 2 == 0 {
            Self::from_bytes([word[0], word[1]])
        } else {
            Self::from_bytes([word[2], word[3]])
        }
    }

    /// Pack an even/odd pair into one config word.
    pub fn pair_to_word(even: &SlotConfig, odd: &SlotConfig) -> [u8; 4] {
        let [a, b] = even.to_bytes();
        let [c, d] = odd.to_bytes();
        [a, b, c, d]
    }
}

impl fmt::Display for SlotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Read Key:       {}", self.read_key)?;
        writeln!(f, "Check Only:     {}", self.check_only)?;
        writeln!(f, "Single Use:     {}", self.single_use)?;
        writeln!(f, "Encrypted Read: {}", self.encrypted_read)?;
        writeln!(f, "Is Secret:      {}", self.is_secret)?;
        writeln!(f, "Write Key:      {}", self.write_key)?;
        writeln!(f, "Derive Key:     {}", self.derive_key)?;
        write!(f, "Write Config:   {}", self.write_config)
    }
}
