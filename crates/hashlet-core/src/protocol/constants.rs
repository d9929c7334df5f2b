//! Protocol constants for the ATSHA204 secure element.
//!
//! Values follow the ATSHA204 datasheet command and memory map sections.

// ============================================================================
// Bus
// ============================================================================

/// Default 7-bit I2C address of the Hashlet (0xC8 >> 1).
pub const DEFAULT_I2C_ADDRESS: u16 = 0x64;

/// Default Linux I2C bus device.
pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";

/// Attempts made by the retry driver before giving up.
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

// ============================================================================
// Word Addresses (first byte of every I2C write)
// ============================================================================

pub const WORD_ADDRESS_RESET: u8 = 0x00;
pub const WORD_ADDRESS_SLEEP: u8 = 0x01;
pub const WORD_ADDRESS_IDLE: u8 = 0x02;
pub const WORD_ADDRESS_COMMAND: u8 = 0x03;

// ============================================================================
// Frame Layout
// ============================================================================

/// count + opcode + param1 + param2 (2) + crc (2)
pub const COMMAND_OVERHEAD: usize = 7;

/// count + crc (2)
pub const RESPONSE_OVERHEAD: usize = 3;

/// Size of a status-only response frame.
pub const STATUS_FRAME_SIZE: usize = 4;

/// The device's count byte limits a frame to 255 bytes.
pub const MAX_COMMAND_DATA: usize = 0xFF - COMMAND_OVERHEAD;

/// Frame returned after a successful wake.
pub const AWAKE_FRAME: [u8; 4] = [0x04, 0x11, 0x33, 0x43];

/// Minimum low time on SDA to wake the device, in microseconds.
pub const WAKE_LOW_US: u64 = 60;

/// Time from wake to the device being ready for a command, in microseconds.
pub const WAKE_DELAY_US: u64 = 2500;

// ============================================================================
// Memory Map
// ============================================================================

pub const WORD_SIZE: usize = 4;
pub const BLOCK_SIZE: usize = 32;

pub const CONFIG_ZONE_SIZE: usize = 88;
pub const CONFIG_ZONE_WORDS: u8 = (CONFIG_ZONE_SIZE / WORD_SIZE) as u8;
pub const OTP_ZONE_SIZE: usize = 64;
pub const DATA_SLOT_COUNT: usize = 16;
pub const DATA_ZONE_SIZE: usize = DATA_SLOT_COUNT * BLOCK_SIZE;

/// Serial number length (SN[0..9]).
pub const SERIAL_NUM_SIZE: usize = 9;

/// Config word holding the I2C address and OTP mode.
pub const OTP_MODE_WORD: u8 = 0x04;
/// First config word of the slot configuration table.
pub const SLOT_CONFIG_WORD: u8 = 0x05;
/// Config word holding UserExtra, Selector, LockValue, LockConfig.
pub const LOCK_WORD: u8 = 0x15;

/// Byte index of LockValue (Data and OTP) inside the lock word.
pub const LOCK_VALUE_INDEX: usize = 2;
/// Byte index of LockConfig inside the lock word.
pub const LOCK_CONFIG_INDEX: usize = 3;
/// A lock byte holding this value is unlocked.
pub const UNLOCKED: u8 = 0x55;

/// OTP mode byte value selecting read-only mode.
pub const OTP_MODE_READ_ONLY: u8 = 0xAA;

/// I2C address word written at personalization: address 0xC8, OTP read-only.
pub const OTP_MODE_WORD_VALUE: [u8; 4] = [0xC8, 0x00, OTP_MODE_READ_ONLY, 0x00];

// ============================================================================
// Param1 Bits
// ============================================================================

/// Read and write transfer 32 bytes instead of 4.
pub const ZONE_READWRITE_32: u8 = 0x80;

pub const RANDOM_UPDATE_SEED: u8 = 0x00;
pub const RANDOM_NO_UPDATE_SEED: u8 = 0x01;

pub const NONCE_MODE_UPDATE_SEED: u8 = 0x00;
pub const NONCE_MODE_NO_UPDATE_SEED: u8 = 0x01;
pub const NONCE_MODE_PASSTHROUGH: u8 = 0x03;

pub const LOCK_ZONE_CONFIG: u8 = 0x00;
pub const LOCK_ZONE_DATA: u8 = 0x01;
/// Lock without checking the zone summary CRC.
pub const LOCK_ZONE_NO_CRC: u8 = 0x80;

/// HMAC mode: TempKey source flag set, no OTP or serial bytes.
pub const HMAC_MODE_DEFAULT: u8 = 0x04;

// ============================================================================
// Hash Preimage Constants
// ============================================================================

/// SN[8], always 0xEE.
pub const SN8: u8 = 0xEE;
/// SN[0..2], always 0x01 0x23.
pub const SN01: [u8; 2] = [0x01, 0x23];

pub const NONCE_RANDOM_INPUT_SIZE: usize = 20;

// ============================================================================
// Personalization
// ============================================================================

pub const OTP_BANNER: &str = "CRYPTOTRONIX HASHLET REV: A";
pub const OTP_VERSION_PREFIX: &str = "SOFTWARE VERSION: ";

/// Key store header prefix, followed by the writer's version.
pub const KEY_STORE_HEADER: &str = "# Hashlet key store written from version: ";
pub const KEY_STORE_DEFAULT_FILE: &str = ".hashlet";
