//! TempKey derivation and encrypted write authentication.

use zeroize::Zeroizing;

use super::builder::PreimageBuilder;
use super::{CryptoError, DIGEST_SIZE, KEY_SIZE, fixed, sha256};
use crate::protocol::constants::{
    BLOCK_SIZE, DATA_SLOT_COUNT, NONCE_MODE_UPDATE_SEED, NONCE_RANDOM_INPUT_SIZE, SN01, SN8,
    ZONE_READWRITE_32,
};
use crate::protocol::Opcode;
use crate::zone::Zone;

const NONCE_PREIMAGE_SIZE: usize = 55;
const DIGEST_PREIMAGE_SIZE: usize = 96;
const MAC_WRITE_PREIMAGE_SIZE: usize = 96;
const PADDING_SIZE: usize = 25;

/// GenDig param1 selecting the Data zone.
const GENDIG_ZONE_DATA: u8 = 0x02;

/// TempKey after a Nonce in random mode with `otp[0..20]` as NumIn.
pub fn gen_temp_key_from_nonce(random: &[u8], otp: &[u8]) -> Result<[u8; DIGEST_SIZE], CryptoError> {
    let random: [u8; 32] = fixed("nonce random", random)?;
    if otp.len() <= NONCE_RANDOM_INPUT_SIZE {
        return Err(CryptoError::OtpTooShort {
            needed_by: "nonce input",
            min: NONCE_RANDOM_INPUT_SIZE + 1,
            actual: otp.len(),
        });
    }

    let msg = PreimageBuilder::new(NONCE_PREIMAGE_SIZE)
        .bytes(&random)
        .bytes(&otp[..NONCE_RANDOM_INPUT_SIZE])
        .byte(Opcode::Nonce.code())
        .byte(NONCE_MODE_UPDATE_SEED)
        .byte(0x00)
        .finish()?;
    Ok(sha256(&msg))
}

/// TempKey after GenDig over data slot `slot` holding `key`.
pub fn gen_temp_key_from_digest(
    prev_temp_key: &[u8],
    slot: u8,
    key: &[u8],
) -> Result<[u8; DIGEST_SIZE], CryptoError> {
    let prev: [u8; 32] = fixed("temp key", prev_temp_key)?;
    let key: [u8; KEY_SIZE] = fixed("key", key)?;

    let msg = PreimageBuilder::new(DIGEST_PREIMAGE_SIZE)
        .bytes(&key)
        .byte(Opcode::GenDig.code())
        .byte(GENDIG_ZONE_DATA)
        .u16_le(slot as u16)
        .byte(SN8)
        .bytes(&SN01)
        .zeros(PADDING_SIZE)
        .bytes(&prev)
        .finish()?;
    Ok(sha256(&msg))
}

/// Input MAC for a Write of `data` authenticated by `temp_key`.
pub fn mac_write(
    temp_key: &[u8],
    opcode: u8,
    param1: u8,
    param2: [u8; 2],
    data: &[u8],
) -> Result<[u8; DIGEST_SIZE], CryptoError> {
    let temp_key: [u8; 32] = fixed("temp key", temp_key)?;
    let data: [u8; BLOCK_SIZE] = fixed("write data", data)?;

    let msg = PreimageBuilder::new(MAC_WRITE_PREIMAGE_SIZE)
        .bytes(&temp_key)
        .byte(opcode)
        .byte(param1)
        .bytes(&param2)
        .byte(SN8)
        .bytes(&SN01)
        .zeros(PADDING_SIZE)
        .bytes(&data)
        .finish()?;
    Ok(sha256(&msg))
}

/// XOR `data` with `temp_key`.
pub fn encrypt(data: &[u8], temp_key: &[u8]) -> Result<[u8; BLOCK_SIZE], CryptoError> {
    let data: [u8; BLOCK_SIZE] = fixed("write data", data)?;
    let temp_key: [u8; 32] = fixed("temp key", temp_key)?;
    Ok(core::array::from_fn(|i| data[i] ^ temp_key[i]))
}

/// Host side of an encrypted 32-byte write into a data slot.
///
/// Sequence on the device: Nonce(OTP[0..20]) returning `random`, GenDig on
/// the slot, then Write with `ciphertext` and `mac`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedWrite {
    pub param1: u8,
    pub addr: u8,
    pub ciphertext: [u8; BLOCK_SIZE],
    pub mac: [u8; DIGEST_SIZE],
}

impl EncryptedWrite {
    pub fn prepare(
        random: &[u8],
        otp: &[u8],
        slot: u8,
        current_key: &[u8],
        data: &[u8],
    ) -> Result<Self, CryptoError> {
        if slot as usize >= DATA_SLOT_COUNT {
            return Err(CryptoError::InvalidSlot(slot));
        }
        let addr = slot << 3;
        let param1 = Zone::Data.bits() | ZONE_READWRITE_32;

        let nonce_key = Zeroizing::new(gen_temp_key_from_nonce(random, otp)?);
        let temp_key = Zeroizing::new(gen_temp_key_from_digest(
            &nonce_key[..],
            slot,
            current_key,
        )?);

        let ciphertext = encrypt(data, &temp_key[..])?;
        let mac = mac_write(
            &temp_key[..],
            Opcode::Write.code(),
            param1,
            [addr, 0x00],
            data,
        )?;

        Ok(Self {
            param1,
            addr,
            ciphertext,
            mac,
        })
    }
}
