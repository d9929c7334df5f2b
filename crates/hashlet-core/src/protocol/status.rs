//! Status codes returned in 4-byte status frames.

use std::fmt;

/// Status byte of a `[0x04][status][crc16]` response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusResponse {
    Success,
    CheckMacMiscompare,
    ParseError,
    ExecutionError,
    /// Device woke up; the command was not executed.
    Awake,
    /// CRC or other communication error seen by the device.
    CommError,
    Unknown(u8),
}

impl StatusResponse {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => StatusResponse::Success,
            0x01 => StatusResponse::CheckMacMiscompare,
            0x03 => StatusResponse::ParseError,
            0x0F => StatusResponse::ExecutionError,
            0x11 => StatusResponse::Awake,
            0xFF => StatusResponse::CommError,
            other => StatusResponse::Unknown(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            StatusResponse::Success => 0x00,
            StatusResponse::CheckMacMiscompare => 0x01,
            StatusResponse::ParseError => 0x03,
            StatusResponse::ExecutionError => 0x0F,
            StatusResponse::Awake => 0x11,
            StatusResponse::CommError => 0xFF,
            StatusResponse::Unknown(b) => *b,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusResponse::Success)
    }

    /// Status codes that mean the command should be sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusResponse::Awake)
    }
}

impl fmt::Display for StatusResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusResponse::Success => write!(f, "Success"),
            StatusResponse::CheckMacMiscompare => write!(f, "CheckMac miscompare"),
            StatusResponse::ParseError => write!(f, "Parse error"),
            StatusResponse::ExecutionError => write!(f, "Execution error"),
            StatusResponse::Awake => write!(f, "Awake"),
            StatusResponse::CommError => write!(f, "Communication error"),
            StatusResponse::Unknown(b) => write!(f, "Unknown status 0x{b:02X}"),
        }
    }
}
