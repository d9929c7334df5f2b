//! Append-only builder for digest preimages.

use byteorder::{ByteOrder, LittleEndian};

use super::CryptoError;

/// Collects preimage bytes and checks the total length once at the end.
#[derive(Debug)]
pub struct PreimageBuilder {
    buf: Vec<u8>,
    expected: usize,
}

impl PreimageBuilder {
    pub fn new(expected: usize) -> Self {
        Self {
            buf: Vec::with_capacity(expected),
            expected,
        }
    }

    pub fn byte(mut self, b: u8) -> Self {
        self.buf.push(b);
        self
    }

    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn u16_le(mut self, v: u16) -> Self {
        let mut raw = [0u8; 2];
        LittleEndian::write_u16(&mut raw, v);
        self.buf.extend_from_slice(&raw);
        self
    }

    pub fn zeros(mut self, n: usize) -> Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Result<Vec<u8>, CryptoError> {
        if self.buf.len() != self.expected {
            return Err(CryptoError::PreimageLength {
                expected: self.expected,
                actual: self.buf.len(),
            });
        }
        Ok(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_order() {
        let out = PreimageBuilder::new(7)
            .byte(0x08)
            .u16_le(0x0102)
            .bytes(&[0xAA, 0xBB])
            .zeros(2)
            .finish()
            .unwrap();
        assert_eq!(out, vec![0x08, 0x02, 0x01, 0xAA, 0xBB, 0x00, 0x00]);
    }

    #[test]
    fn test_builder_length_checked() {
        let err = PreimageBuilder::new(4).byte(1).finish().unwrap_err();
        assert_eq!(
            err,
            CryptoError::PreimageLength {
                expected: 4,
                actual: 1
            }
        );
    }
}
