//! MAC and HMAC digests as computed by the device.
//!
//! Both share one 88 byte message layout:
//!
//! ```text
//! first32 | second32 | opcode | mode | slot (LE u16) | OTP[0..8] | OTP[8..11]
//!         | SN[8]=0xEE | SN[4..8] | SN[0..2]=01 23 | SN[2..4]
//! ```
//!
//! For MAC `first32` is the slot key and the message is hashed with SHA-256.
//! For HMAC `first32` is zero and the message is keyed with the slot key.

use super::builder::PreimageBuilder;
use super::{CHALLENGE_SIZE, CryptoError, DIGEST_SIZE, KEY_SIZE, META_SIZE};
use super::{digest_eq, fixed, hmac_sha256, sha256};
use crate::protocol::constants::{HMAC_MODE_DEFAULT, SERIAL_NUM_SIZE, SN01, SN8};
use crate::protocol::{MacMode, Opcode};

pub const MAC_PREIMAGE_SIZE: usize = 88;

/// Optional OTP and serial bytes mixed into a MAC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OtherData {
    pub otp8: [u8; 8],
    pub otp3: [u8; 3],
    pub sn4: [u8; 4],
    pub sn23: [u8; 2],
}

impl OtherData {
    /// Select the bytes `mode` includes from a full OTP zone and serial number.
    pub fn from_device(mode: &MacMode, otp: &[u8], serial: &[u8]) -> Result<Self, CryptoError> {
        let mut other = OtherData::default();
        if mode.use_otp_0_7 {
            other.otp8.copy_from_slice(otp_range(otp, 0..8, "MAC mode bit 0x20 (OTP[0..8])")?);
        }
        if mode.use_otp_0_10 {
            other.otp3.copy_from_slice(otp_range(otp, 8..11, "MAC mode bit 0x10 (OTP[8..11])")?);
        }
        if mode.use_serial_num {
            let sn: [u8; SERIAL_NUM_SIZE] = fixed("serial number", serial)?;
            other.sn4.copy_from_slice(&sn[4..8]);
            other.sn23.copy_from_slice(&sn[2..4]);
        }
        Ok(other)
    }
}

fn otp_range<'a>(
    otp: &'a [u8],
    range: std::ops::Range<usize>,
    needed_by: &'static str,
) -> Result<&'a [u8], CryptoError> {
    otp.get(range.clone()).ok_or(CryptoError::OtpTooShort {
        needed_by,
        min: range.end,
        actual: otp.len(),
    })
}

#[allow(clippy::too_many_arguments)]
fn preimage(
    first: &[u8; 32],
    second: &[u8; 32],
    opcode: Opcode,
    mode: u8,
    slot: u16,
    otp8: &[u8],
    otp3: &[u8],
    sn4: &[u8],
    sn23: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let otp8: [u8; 8] = fixed("otp8", otp8)?;
    let otp3: [u8; 3] = fixed("otp3", otp3)?;
    let sn4: [u8; 4] = fixed("sn4", sn4)?;
    let sn23: [u8; 2] = fixed("sn23", sn23)?;

    PreimageBuilder::new(MAC_PREIMAGE_SIZE)
        .bytes(first)
        .bytes(second)
        .byte(opcode.code())
        .byte(mode)
        .u16_le(slot)
        .bytes(&otp8)
        .bytes(&otp3)
        .byte(SN8)
        .bytes(&sn4)
        .bytes(&SN01)
        .bytes(&sn23)
        .finish()
}

/// Message the device hashes for the MAC command.
#[allow(clippy::too_many_arguments)]
pub fn perform_hash_preimage(
    challenge: &[u8],
    key: &[u8],
    mode: u8,
    slot: u16,
    otp8: &[u8],
    otp3: &[u8],
    sn4: &[u8],
    sn23: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let challenge: [u8; CHALLENGE_SIZE] = fixed("challenge", challenge)?;
    let key: [u8; KEY_SIZE] = fixed("key", key)?;
    preimage(&key, &challenge, Opcode::Mac, mode, slot, otp8, otp3, sn4, sn23)
}

/// MAC the device returns for `challenge` under `key`.
pub fn mac_digest(
    challenge: &[u8],
    key: &[u8],
    mode: u8,
    slot: u16,
    other: &OtherData,
) -> Result<[u8; DIGEST_SIZE], CryptoError> {
    let msg = perform_hash_preimage(
        challenge,
        key,
        mode,
        slot,
        &other.otp8,
        &other.otp3,
        &other.sn4,
        &other.sn23,
    )?;
    Ok(sha256(&msg))
}

/// Verify a MAC offline, assuming no OTP or serial bytes were included.
pub fn verify_mac_defaults(
    challenge: &[u8],
    response: &[u8],
    key: &[u8],
    mode: u8,
    slot: u16,
) -> Result<bool, CryptoError> {
    let response: [u8; DIGEST_SIZE] = fixed("challenge response", response)?;
    let expected = mac_digest(challenge, key, mode, slot, &OtherData::default())?;
    Ok(digest_eq(&expected, &response))
}

/// Message the device keys with the slot for the HMAC command.
#[allow(clippy::too_many_arguments)]
pub fn perform_hmac_preimage(
    challenge: &[u8],
    mode: u8,
    slot: u16,
    otp8: &[u8],
    otp3: &[u8],
    sn4: &[u8],
    sn23: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let challenge: [u8; CHALLENGE_SIZE] = fixed("challenge", challenge)?;
    preimage(&[0u8; 32], &challenge, Opcode::Hmac, mode, slot, otp8, otp3, sn4, sn23)
}

/// HMAC the device returns for TempKey = `challenge` under `key`.
pub fn hmac_digest(
    challenge: &[u8],
    key: &[u8],
    mode: u8,
    slot: u16,
    other: &OtherData,
) -> Result<[u8; DIGEST_SIZE], CryptoError> {
    let key: [u8; KEY_SIZE] = fixed("key", key)?;
    let msg = perform_hmac_preimage(
        challenge,
        mode,
        slot,
        &other.otp8,
        &other.otp3,
        &other.sn4,
        &other.sn23,
    )?;
    Ok(hmac_sha256(&key, &msg))
}

/// Verify an HMAC offline using the default HMAC mode.
pub fn verify_hmac_defaults(
    challenge: &[u8],
    response: &[u8],
    key: &[u8],
    slot: u16,
) -> Result<bool, CryptoError> {
    let response: [u8; DIGEST_SIZE] = fixed("challenge response", response)?;
    let expected = hmac_digest(challenge, key, HMAC_MODE_DEFAULT, slot, &OtherData::default())?;
    Ok(digest_eq(&expected, &response))
}

/// The 13 bytes CheckMac needs to rebuild a MAC message.
pub fn check_mac_meta(mode: &MacMode, slot: u8, other: &OtherData) -> [u8; META_SIZE] {
    let mut meta = [0u8; META_SIZE];
    meta[0] = Opcode::Mac.code();
    meta[1] = mode.to_byte();
    meta[2] = slot;
    meta[3] = 0;
    meta[4..7].copy_from_slice(&other.otp3);
    meta[7..11].copy_from_slice(&other.sn4);
    meta[11..13].copy_from_slice(&other.sn23);
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        core::array::from_fn(|i| i as u8)
    }

    #[test]
    fn test_mac_preimage_golden() {
        let key = test_key();
        let challenge = [0xFFu8; 32];
        let z = OtherData::default();
        let msg =
            perform_hash_preimage(&challenge, &key, 0, 0, &z.otp8, &z.otp3, &z.sn4, &z.sn23)
                .unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&key);
        expected.extend_from_slice(&challenge);
        expected.extend_from_slice(&[0x08, 0x00, 0x00, 0x00]);
        expected.extend_from_slice(&[0u8; 11]);
        expected.push(0xEE);
        expected.extend_from_slice(&[0u8; 4]);
        expected.extend_from_slice(&[0x01, 0x23, 0x00, 0x00]);
        assert_eq!(msg, expected);
        assert_eq!(msg.len(), MAC_PREIMAGE_SIZE);

        assert_eq!(
            hex::encode(sha256(&msg)),
            "bf92ab17cdca9d9f71bb9aecdaa2af154f9bb2cb55991a77dea31b15b3a56381"
        );
    }

    #[test]
    fn test_verify_mac_defaults() {
        let key = test_key();
        let challenge = [0xFFu8; 32];
        let mac = mac_digest(&challenge, &key, 0, 0, &OtherData::default()).unwrap();

        assert!(verify_mac_defaults(&challenge, &mac, &key, 0, 0).unwrap());

        let mut wrong = mac;
        wrong[31] ^= 0x01;
        assert!(!verify_mac_defaults(&challenge, &wrong, &key, 0, 0).unwrap());
        assert!(!verify_mac_defaults(&challenge, &mac, &key, 0, 1).unwrap());
    }

    #[test]
    fn test_verify_rejects_bad_lengths() {
        let key = test_key();
        assert!(verify_mac_defaults(&[0u8; 31], &[0u8; 32], &key, 0, 0).is_err());
        assert!(verify_mac_defaults(&[0u8; 32], &[], &key, 0, 0).is_err());
        assert!(verify_mac_defaults(&[0u8; 32], &[0u8; 32], &key[..16], 0, 0).is_err());
    }

    #[test]
    fn test_mac_with_otp_and_serial() {
        let key = test_key();
        let challenge = [0xFFu8; 32];
        let mut otp = [0u8; 64];
        otp[..27].copy_from_slice(b"CRYPTOTRONIX HASHLET REV: A");
        otp[32..55].copy_from_slice(b"SOFTWARE VERSION: 0.1.0");
        let serial = [0x01, 0x23, 0xAB, 0xCD, 0x10, 0x20, 0x30, 0x40, 0xEE];
        let mode = MacMode::from_byte(0x70);

        let other = OtherData::from_device(&mode, &otp, &serial).unwrap();
        assert_eq!(&other.otp8, b"CRYPTOTR");
        assert_eq!(&other.otp3, b"ONI");
        assert_eq!(other.sn4, [0x10, 0x20, 0x30, 0x40]);
        assert_eq!(other.sn23, [0xAB, 0xCD]);

        let mac = mac_digest(&challenge, &key, 0x70, 5, &other).unwrap();
        assert_eq!(
            hex::encode(mac),
            "7c0673fed263481176adccf2b6facbfc3da6831b67799cd48db577293f08e5e6"
        );
    }

    #[test]
    fn test_mac_with_upper_otp_only() {
        let key = test_key();
        let challenge = [0xFFu8; 32];
        let mut otp = [0u8; 64];
        otp[..27].copy_from_slice(b"CRYPTOTRONIX HASHLET REV: A");
        let mode = MacMode::from_byte(0x10);

        let other = OtherData::from_device(&mode, &otp, &[]).unwrap();
        assert_eq!(other.otp8, [0u8; 8]);
        assert_eq!(&other.otp3, b"ONI");
        assert_eq!(other.sn4, [0u8; 4]);

        let mac = mac_digest(&challenge, &key, 0x10, 5, &other).unwrap();
        assert_eq!(
            hex::encode(mac),
            "483d2198f67fffed86223e0cfff0997ae174a1e289526034084d2d77c5d3a1bd"
        );
    }

    #[test]
    fn test_short_otp_names_mode_bit() {
        let upper = MacMode::from_byte(0x10);
        assert_eq!(
            OtherData::from_device(&upper, &[0u8; 10], &[]),
            Err(CryptoError::OtpTooShort {
                needed_by: "MAC mode bit 0x10 (OTP[8..11])",
                min: 11,
                actual: 10
            })
        );

        let lower = MacMode::from_byte(0x20);
        assert!(OtherData::from_device(&lower, &[0u8; 8], &[]).is_ok());
        let err = OtherData::from_device(&lower, &[0u8; 7], &[]).unwrap_err();
        assert!(err.to_string().contains("0x20"));
    }

    #[test]
    fn test_other_data_respects_mode() {
        let mode = MacMode::default();
        let other = OtherData::from_device(&mode, &[0xAA; 64], &[0xBB; 9]).unwrap();
        assert_eq!(other, OtherData::default());
    }

    #[test]
    fn test_hmac_golden() {
        let key = test_key();
        let challenge = [0xFFu8; 32];
        let hmac = hmac_digest(&challenge, &key, HMAC_MODE_DEFAULT, 0, &OtherData::default())
            .unwrap();
        assert_eq!(
            hex::encode(hmac),
            "0e69d7d3fc60ceea2faf5a5d1f9744fab027da558c2f3cb147b8983e9ad0e8b7"
        );
        assert!(verify_hmac_defaults(&challenge, &hmac, &key, 0).unwrap());
        assert!(!verify_hmac_defaults(&challenge, &hmac, &key, 1).unwrap());
    }

    #[test]
    fn test_hmac_preimage_layout() {
        let z = OtherData::default();
        let msg = perform_hmac_preimage(&[0x11; 32], 0x04, 3, &z.otp8, &z.otp3, &z.sn4, &z.sn23)
            .unwrap();
        assert_eq!(msg.len(), MAC_PREIMAGE_SIZE);
        assert_eq!(&msg[..32], &[0u8; 32]);
        assert_eq!(&msg[32..64], &[0x11; 32]);
        assert_eq!(&msg[64..68], &[0x11, 0x04, 0x03, 0x00]);
    }

    #[test]
    fn test_check_mac_meta() {
        let other = OtherData {
            otp8: [0; 8],
            otp3: [1, 2, 3],
            sn4: [4, 5, 6, 7],
            sn23: [8, 9],
        };
        let mode = MacMode::from_byte(0x50);
        let meta = check_mac_meta(&mode, 7, &other);
        assert_eq!(meta, [0x08, 0x50, 7, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }
}
