//! Mode bytes (param1) for MAC, HMAC and CheckMac.

use std::fmt;

const MAC_USE_SERIAL_NUM: u8 = 0x40;
const MAC_USE_OTP_0_7: u8 = 0x20;
const MAC_USE_OTP_0_10: u8 = 0x10;
const MAC_TEMP_KEY_SOURCE: u8 = 0x04;
const MAC_USE_FIRST_32_TEMP_KEY: u8 = 0x02;
const MAC_USE_SECOND_32_TEMP_KEY: u8 = 0x01;

const CHECKMAC_SECOND_32_TEMP_KEY: u8 = 0x01;
const CHECKMAC_FIRST_32_TEMP_KEY: u8 = 0x02;
const CHECKMAC_TEMP_KEY_SOURCE: u8 = 0x04;
const CHECKMAC_USE_OTP_0_7: u8 = 0x20;

/// Mode for the MAC and HMAC commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacMode {
    /// Include SN[2..4] and SN[4..8] in the digest.
    pub use_serial_num: bool,
    /// Include OTP[0..8].
    pub use_otp_0_7: bool,
    /// Include OTP[8..11]. Independent of `use_otp_0_7`.
    pub use_otp_0_10: bool,
    /// Must match the TempKey SourceFlag when TempKey is used.
    pub temp_key_source_flag: bool,
    /// First 32 bytes of the digest come from TempKey instead of a slot.
    pub use_first_32_temp_key: bool,
    /// Second 32 bytes come from TempKey instead of the challenge.
    pub use_second_32_temp_key: bool,
}

impl MacMode {
    pub fn to_byte(&self) -> u8 {
        let mut mode = 0;
        if self.use_serial_num {
            mode |= MAC_USE_SERIAL_NUM;
        }
        if self.use_otp_0_7 {
            mode |= MAC_USE_OTP_0_7;
        }
        if self.use_otp_0_10 {
            mode |= MAC_USE_OTP_0_10;
        }
        if self.temp_key_source_flag {
            mode |= MAC_TEMP_KEY_SOURCE;
        }
        if self.use_first_32_temp_key {
            mode |= MAC_USE_FIRST_32_TEMP_KEY;
        }
        if self.use_second_32_temp_key {
            mode |= MAC_USE_SECOND_32_TEMP_KEY;
        }
        mode
    }

    pub fn from_byte(mode: u8) -> Self {
        Self {
            use_serial_num: mode & MAC_USE_SERIAL_NUM != 0,
            use_otp_0_7: mode & MAC_USE_OTP_0_7 != 0,
            use_otp_0_10: mode & MAC_USE_OTP_0_10 != 0,
            temp_key_source_flag: mode & MAC_TEMP_KEY_SOURCE != 0,
            use_first_32_temp_key: mode & MAC_USE_FIRST_32_TEMP_KEY != 0,
            use_second_32_temp_key: mode & MAC_USE_SECOND_32_TEMP_KEY != 0,
        }
    }

    /// Whether the command carries a 32-byte challenge.
    pub fn needs_challenge(&self) -> bool {
        !self.use_second_32_temp_key
    }
}

impl fmt::Display for MacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.to_byte())
    }
}

/// Mode for the CheckMac command.
///
/// Bits 0, 1, 2 and 5 mean the same as in the MAC mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckMacMode {
    /// Second 32 bytes of the message come from TempKey instead of the challenge.
    pub second_32_temp_key: bool,
    /// First 32 bytes come from TempKey instead of the slot key.
    pub first_32_temp_key: bool,
    /// Must match the TempKey SourceFlag when TempKey is used.
    pub temp_key_source_flag: bool,
    /// Include OTP[0..8] from the device.
    pub use_otp_0_7: bool,
}

impl CheckMacMode {
    pub fn to_byte(&self) -> u8 {
        let mut mode = 0;
        if self.second_32_temp_key {
            mode |= CHECKMAC_SECOND_32_TEMP_KEY;
        }
        if self.first_32_temp_key {
            mode |= CHECKMAC_FIRST_32_TEMP_KEY;
        }
        if self.temp_key_source_flag {
            mode |= CHECKMAC_TEMP_KEY_SOURCE;
        }
        if self.use_otp_0_7 {
            mode |= CHECKMAC_USE_OTP_0_7;
        }
        mode
    }

    pub fn from_byte(mode: u8) -> Self {
        Self {
            second_32_temp_key: mode & CHECKMAC_SECOND_32_TEMP_KEY != 0,
            first_32_temp_key: mode & CHECKMAC_FIRST_32_TEMP_KEY != 0,
            temp_key_source_flag: mode & CHECKMAC_TEMP_KEY_SOURCE != 0,
            use_otp_0_7: mode & CHECKMAC_USE_OTP_0_7 != 0,
        }
    }

    /// CheckMac mode that reproduces the digest of a MAC issued with `mac`.
    pub fn for_mac(mac: &MacMode) -> Self {
        Self {
            second_32_temp_key: mac.use_second_32_temp_key,
            first_32_temp_key: mac.use_first_32_temp_key,
            temp_key_source_flag: mac.temp_key_source_flag,
            use_otp_0_7: mac.use_otp_0_7,
        }
    }
}
