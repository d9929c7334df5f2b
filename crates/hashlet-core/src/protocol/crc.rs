//! CRC16 as computed by the ATSHA204.
//!
//! Polynomial 0x8005, initial value 0, no final XOR. Bits of each input byte
//! are consumed least significant first. The register is emitted low byte
//! first on the wire.

const POLYNOMIAL: u16 = 0x8005;

/// Compute the CRC register over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        for shift in 0..8 {
            let data_bit = (byte >> shift) & 1;
            let crc_bit = (crc >> 15) as u8;
            crc <<= 1;
            if data_bit != crc_bit {
                crc ^= POLYNOMIAL;
            }
        }
    }
    crc
}

/// Compute the CRC in wire order.
pub fn crc16_bytes(data: &[u8]) -> [u8; 2] {
    crc16(data).to_le_bytes()
}

/// Check that the last two bytes of `frame` are the CRC of the rest.
pub fn is_crc_valid(frame: &[u8]) -> bool {
    if frame.len() < 2 {
        return false;
    }
    let (body, crc) = frame.split_at(frame.len() - 2);
    crc16_bytes(body) == [crc[0], crc[1]]
}
