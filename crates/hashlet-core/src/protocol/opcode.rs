//! Command opcodes and their execution times.

use std::fmt;
use std::time::Duration;

/// Device command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    DeriveKey,
    DevRev,
    GenDig,
    Hmac,
    CheckMac,
    Lock,
    Mac,
    Nonce,
    Pause,
    Random,
    Read,
    UpdateExtra,
    Write,
}

impl Opcode {
    pub const ALL: [Opcode; 13] = [
        Opcode::DeriveKey,
        Opcode::DevRev,
        Opcode::GenDig,
        Opcode::Hmac,
        Opcode::CheckMac,
        Opcode::Lock,
        Opcode::Mac,
        Opcode::Nonce,
        Opcode::Pause,
        Opcode::Random,
        Opcode::Read,
        Opcode::UpdateExtra,
        Opcode::Write,
    ];

    /// Opcode byte on the wire.
    pub const fn code(self) -> u8 {
        match self {
            Opcode::DeriveKey => 0x1C,
            Opcode::DevRev => 0x30,
            Opcode::GenDig => 0x15,
            Opcode::Hmac => 0x11,
            Opcode::CheckMac => 0x28,
            Opcode::Lock => 0x17,
            Opcode::Mac => 0x08,
            Opcode::Nonce => 0x16,
            Opcode::Pause => 0x01,
            Opcode::Random => 0x1B,
            Opcode::Read => 0x02,
            Opcode::UpdateExtra => 0x20,
            Opcode::Write => 0x12,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    /// Typical execution time in nanoseconds.
    pub const fn typical_exec_ns(self) -> u64 {
        match self {
            Opcode::DeriveKey => 14_000_000,
            Opcode::DevRev => 400_000,
            Opcode::GenDig => 11_000_000,
            Opcode::Hmac => 27_000_000,
            Opcode::CheckMac => 12_000_000,
            Opcode::Lock => 5_000_000,
            Opcode::Mac => 12_000_000,
            Opcode::Nonce => 22_000_000,
            Opcode::Pause => 400_000,
            Opcode::Random => 11_000_000,
            Opcode::Read => 400_000,
            Opcode::UpdateExtra => 8_000_000,
            Opcode::Write => 4_000_000,
        }
    }

    /// Maximum execution time in nanoseconds.
    pub const fn max_exec_ns(self) -> u64 {
        match self {
            Opcode::DeriveKey => 62_000_000,
            Opcode::DevRev => 2_000_000,
            Opcode::GenDig => 43_000_000,
            Opcode::Hmac => 69_000_000,
            Opcode::CheckMac => 38_000_000,
            Opcode::Lock => 24_000_000,
            Opcode::Mac => 35_000_000,
            Opcode::Nonce => 60_000_000,
            Opcode::Pause => 2_000_000,
            Opcode::Random => 50_000_000,
            Opcode::Read => 4_000_000,
            Opcode::UpdateExtra => 12_000_000,
            Opcode::Write => 42_000_000,
        }
    }

    pub fn typical_exec_time(self) -> Duration {
        Duration::from_nanos(self.typical_exec_ns())
    }

    pub fn max_exec_time(self) -> Duration {
        Duration::from_nanos(self.max_exec_ns())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::DeriveKey => write!(f, "DeriveKey"),
            Opcode::DevRev => write!(f, "DevRev"),
            Opcode::GenDig => write!(f, "GenDig"),
            Opcode::Hmac => write!(f, "HMAC"),
            Opcode::CheckMac => write!(f, "CheckMac"),
            Opcode::Lock => write!(f, "Lock"),
            Opcode::Mac => write!(f, "MAC"),
            Opcode::Nonce => write!(f, "Nonce"),
            Opcode::Pause => write!(f, "Pause"),
            Opcode::Random => write!(f, "Random"),
            Opcode::Read => write!(f, "Read"),
            Opcode::UpdateExtra => write!(f, "UpdateExtra"),
            Opcode::Write => write!(f, "Write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in Opcode::ALL.iter().enumerate() {
            for b in &Opcode::ALL[i + 1..] {
                assert_ne!(a.code(), b.code(), "{a} and {b}");
            }
        }
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Opcode::from_code(0x1B), Some(Opcode::Random));
        assert_eq!(Opcode::from_code(0x28), Some(Opcode::CheckMac));
        assert_eq!(Opcode::from_code(0xFE), None);
    }

    #[test]
    fn test_typical_never_exceeds_max() {
        for op in Opcode::ALL {
            assert!(op.typical_exec_ns() <= op.max_exec_ns(), "{op}");
        }
        assert_eq!(Opcode::Hmac.max_exec_time(), Duration::from_millis(69));
    }
}
