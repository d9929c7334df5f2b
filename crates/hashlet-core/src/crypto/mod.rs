//! Host-side reconstruction of the device's digests.
//!
//! Every preimage here mirrors the device's internal SHA-256 message byte
//! for byte. A single misplaced byte still yields a valid looking digest, so
//! each layout is covered by a fixed reference vector in the tests.

pub mod builder;
pub mod mac;
pub mod tempkey;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use builder::PreimageBuilder;
pub use mac::{
    OtherData, check_mac_meta, hmac_digest, mac_digest, perform_hash_preimage,
    perform_hmac_preimage, verify_hmac_defaults, verify_mac_defaults,
};
pub use tempkey::{
    EncryptedWrite, encrypt, gen_temp_key_from_digest, gen_temp_key_from_nonce, mac_write,
};

pub const KEY_SIZE: usize = 32;
pub const CHALLENGE_SIZE: usize = 32;
pub const DIGEST_SIZE: usize = 32;
pub const META_SIZE: usize = 13;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("{what} must be {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("OTP zone too short for {needed_by}: need {min} bytes, got {actual}")]
    OtpTooShort {
        needed_by: &'static str,
        min: usize,
        actual: usize,
    },
    #[error("Data slot {0} is out of range")]
    InvalidSlot(u8),
    #[error("Preimage is {actual} bytes, expected {expected}")]
    PreimageLength { expected: usize, actual: usize },
}

/// Borrow `bytes` as a fixed-size array or report which input was wrong.
pub fn fixed<const N: usize>(what: &'static str, bytes: &[u8]) -> Result<[u8; N], CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        what,
        expected: N,
        actual: bytes.len(),
    })
}

pub fn sha256(data: &[u8]) -> [u8; DIGEST_SIZE] {
    Sha256::digest(data).into()
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Compare two digests over their full length.
pub fn digest_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
