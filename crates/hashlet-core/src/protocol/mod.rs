//! Protocol module - ATSHA204 wire protocol definitions.

pub mod constants;
pub mod crc;
pub mod frame;
pub mod mode;
pub mod opcode;
pub mod status;

pub use constants::*;
pub use crc::{crc16, crc16_bytes, is_crc_valid};
pub use frame::{Command, FrameError, Response, parse_response};
pub use mode::{CheckMacMode, MacMode};
pub use opcode::Opcode;
pub use status::StatusResponse;
