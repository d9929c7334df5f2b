//! Command and response frames.
//!
//! Outgoing: `[0x03][count][opcode][param1][param2 lo][param2 hi][data..][crc lo][crc hi]`
//! Incoming: `[count][payload..][crc lo][crc hi]`
//!
//! `count` covers everything from itself through the CRC. The CRC covers
//! `count` through the last data byte.

use std::fmt;

use thiserror::Error;

use super::constants::{
    COMMAND_OVERHEAD, MAX_COMMAND_DATA, RESPONSE_OVERHEAD, STATUS_FRAME_SIZE,
    WORD_ADDRESS_COMMAND,
};
use super::crc::{crc16_bytes, is_crc_valid};
use super::opcode::Opcode;
use super::status::StatusResponse;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Unexpected count byte: expected {expected}, got {actual}")]
    UnexpectedLength { expected: usize, actual: usize },
    #[error("Invalid CRC")]
    InvalidCrc,
    #[error("Command data too long: {len} bytes (max {})", MAX_COMMAND_DATA)]
    DataTooLong { len: usize },
}

/// A single device command.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: Opcode,
    pub param1: u8,
    pub param2: [u8; 2],
    pub data: Vec<u8>,
}

impl Command {
    pub fn new(
        opcode: Opcode,
        param1: u8,
        param2: [u8; 2],
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if data.len() > MAX_COMMAND_DATA {
            return Err(FrameError::DataTooLong { len: data.len() });
        }
        Ok(Self {
            opcode,
            param1,
            param2,
            data,
        })
    }

    /// Command with a 16-bit param2 and no data.
    pub fn simple(opcode: Opcode, param1: u8, param2: u16) -> Self {
        Self {
            opcode,
            param1,
            param2: param2.to_le_bytes(),
            data: Vec::new(),
        }
    }

    /// Value of the count byte.
    pub fn count(&self) -> u8 {
        (COMMAND_OVERHEAD + self.data.len()) as u8
    }

    /// Serialize to the bytes written on the bus, word address included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + COMMAND_OVERHEAD + self.data.len());
        buf.push(WORD_ADDRESS_COMMAND);
        buf.push(self.count());
        buf.push(self.opcode.code());
        buf.push(self.param1);
        buf.extend_from_slice(&self.param2);
        buf.extend_from_slice(&self.data);
        let crc = crc16_bytes(&buf[1..]);
        buf.extend_from_slice(&crc);
        buf
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Command({} p1=0x{:02X} p2={} data={})",
            self.opcode,
            self.param1,
            hex::encode_upper(self.param2),
            hex::encode_upper(&self.data)
        )
    }
}

/// A parsed response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Status(StatusResponse),
    Payload(Vec<u8>),
}

/// Number of bytes to read for a response carrying `expected_len` payload bytes.
pub fn response_size(expected_len: usize) -> usize {
    (expected_len + RESPONSE_OVERHEAD).max(STATUS_FRAME_SIZE)
}

/// Parse and CRC-check a response frame.
pub fn parse_response(buf: &[u8], expected_len: usize) -> Result<Response, FrameError> {
    if buf.len() < STATUS_FRAME_SIZE {
        return Err(FrameError::TooShort {
            expected: STATUS_FRAME_SIZE,
            actual: buf.len(),
        });
    }

    if buf[0] as usize == STATUS_FRAME_SIZE {
        let frame = &buf[..STATUS_FRAME_SIZE];
        if !is_crc_valid(frame) {
            return Err(FrameError::InvalidCrc);
        }
        return Ok(Response::Status(StatusResponse::from_byte(frame[1])));
    }

    let count = buf[0] as usize;
    let expected = expected_len + RESPONSE_OVERHEAD;
    if count != expected {
        return Err(FrameError::UnexpectedLength {
            expected,
            actual: count,
        });
    }
    if count > buf.len() {
        return Err(FrameError::TooShort {
            expected: count,
            actual: buf.len(),
        });
    }

    let frame = &buf[..count];
    if !is_crc_valid(frame) {
        return Err(FrameError::InvalidCrc);
    }
    Ok(Response::Payload(frame[1..count - 2].to_vec()))
}

/// Build a response frame around `payload`. Used by simulated transports.
pub fn encode_response(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + RESPONSE_OVERHEAD);
    buf.push((payload.len() + RESPONSE_OVERHEAD) as u8);
    buf.extend_from_slice(payload);
    let crc = crc16_bytes(&buf);
    buf.extend_from_slice(&crc);
    buf
}

/// Build a 4-byte status frame.
pub fn encode_status(status: StatusResponse) -> Vec<u8> {
    encode_response(&[status.as_byte()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::AWAKE_FRAME;

    #[test]
    fn test_random_command_bytes() {
        let cmd = Command::simple(Opcode::Random, 0x00, 0x0000);
        let bytes = cmd.to_bytes();
        assert_eq!(bytes, vec![0x03, 0x07, 0x1B, 0x00, 0x00, 0x00, 0x24, 0xCD]);
        assert_eq!(cmd.count(), 7);
    }

    #[test]
    fn test_count_tracks_data() {
        let cmd = Command::new(Opcode::Nonce, 0x03, [0, 0], vec![0xAB; 32]).unwrap();
        let bytes = cmd.to_bytes();
        assert_eq!(bytes[1], 39);
        assert_eq!(bytes.len(), 40);
        assert!(is_crc_valid(&bytes[1..]));
    }

    #[test]
    fn test_data_too_long() {
        let err = Command::new(Opcode::Write, 0, [0, 0], vec![0; MAX_COMMAND_DATA + 1]);
        assert_eq!(
            err.unwrap_err(),
            FrameError::DataTooLong {
                len: MAX_COMMAND_DATA + 1
            }
        );
    }

    #[test]
    fn test_param2_little_endian() {
        let cmd = Command::simple(Opcode::Lock, 0x00, 0xBEEF);
        assert_eq!(cmd.param2, [0xEF, 0xBE]);
    }

    #[test]
    fn test_parse_awake() {
        let resp = parse_response(&AWAKE_FRAME, 32).unwrap();
        assert_eq!(resp, Response::Status(StatusResponse::Awake));
    }

    #[test]
    fn test_parse_payload() {
        let mut frame = encode_response(&[1, 2, 3, 4]);
        assert_eq!(frame[0], 7);
        let resp = parse_response(&frame, 4).unwrap();
        assert_eq!(resp, Response::Payload(vec![1, 2, 3, 4]));

        frame[2] ^= 0x01;
        assert_eq!(parse_response(&frame, 4), Err(FrameError::InvalidCrc));
    }

    #[test]
    fn test_parse_rejects_every_bit_flip() {
        let payload: Vec<u8> = (0..32).collect();
        let frame = encode_response(&payload);

        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;
                let result = parse_response(&corrupted, payload.len());
                if byte == 0 {
                    assert!(result.is_err(), "count bit {bit}");
                } else {
                    assert_eq!(result, Err(FrameError::InvalidCrc), "byte {byte} bit {bit}");
                }
            }
        }
    }

    #[test]
    fn test_parse_status_with_trailing_bytes() {
        let mut buf = encode_status(StatusResponse::ExecutionError);
        buf.extend_from_slice(&[0xFF; 31]);
        let resp = parse_response(&buf, 32).unwrap();
        assert_eq!(resp, Response::Status(StatusResponse::ExecutionError));
    }

    #[test]
    fn test_parse_rejects_short_and_mismatched() {
        assert!(matches!(
            parse_response(&[0x04, 0x11], 1),
            Err(FrameError::TooShort { .. })
        ));

        let frame = encode_response(&[0u8; 4]);
        assert_eq!(
            parse_response(&frame, 32),
            Err(FrameError::UnexpectedLength {
                expected: 35,
                actual: 7
            })
        );

        let frame = encode_response(&[0u8; 32]);
        assert!(matches!(
            parse_response(&frame[..20], 32),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn test_response_size() {
        assert_eq!(response_size(1), 4);
        assert_eq!(response_size(32), 35);
    }
}
