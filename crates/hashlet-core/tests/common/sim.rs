//! Simulated ATSHA204 behind the `Transport` trait.
//!
//! Models the three zones, lock bytes, the RNG, TempKey and the commands the
//! driver issues. Responses are computed with the crate's own crypto engine,
//! so these tests check the command flow and framing rather than the digest
//! layouts (those have fixed vectors in the unit tests).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use hashlet_core::crypto::{
    self, OtherData, PreimageBuilder, gen_temp_key_from_digest, hmac_digest, mac_write, sha256,
};
use hashlet_core::protocol::constants::{
    AWAKE_FRAME, LOCK_CONFIG_INDEX, LOCK_VALUE_INDEX, LOCK_WORD, OTP_MODE_READ_ONLY,
    OTP_MODE_WORD, SN01, SN8, UNLOCKED, WORD_ADDRESS_COMMAND, WORD_ADDRESS_IDLE,
    WORD_ADDRESS_RESET, WORD_ADDRESS_SLEEP,
};
use hashlet_core::protocol::crc::{crc16, is_crc_valid};
use hashlet_core::protocol::frame::{encode_response, encode_status};
use hashlet_core::protocol::{MacMode, Opcode, StatusResponse};
use hashlet_core::{SlotConfig, Transport, TransportError, WriteConfig};

pub const SERIAL: [u8; 9] = [0x01, 0x23, 0xAB, 0xCD, 0x10, 0x20, 0x30, 0x40, 0xEE];
pub const DEV_REV: [u8; 4] = [0x00, 0x00, 0x00, 0x04];

type Reply = Result<Vec<u8>, StatusResponse>;

#[derive(Debug, Clone, Copy)]
struct TempKey {
    value: [u8; 32],
    /// SourceFlag: false after a random nonce, true after pass-through.
    input: bool,
}

/// Faults injected ahead of the next commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer with the Awake frame without executing.
    Awake,
    /// Answer with a frame whose CRC does not match, without executing.
    BadCrc,
}

struct Chip {
    config: [u8; 88],
    otp: [u8; 64],
    data: [[u8; 32]; 16],
    temp_key: Option<TempKey>,
    rng_counter: u64,
    awake: bool,
    pending: Option<Vec<u8>>,
    faults: VecDeque<Fault>,
    /// Reads still to NACK while a command is "executing".
    busy_reads: usize,
    executed: Vec<Opcode>,
    frames: usize,
}

impl Chip {
    fn factory() -> Self {
        let mut config = [0u8; 88];
        config[0..4].copy_from_slice(&SERIAL[0..4]);
        config[4..8].copy_from_slice(&DEV_REV);
        config[8..12].copy_from_slice(&SERIAL[4..8]);
        config[12] = SERIAL[8];
        // I2C address and OTP mode as shipped.
        config[16..20].copy_from_slice(&[0xC8, 0x00, UNLOCKED, 0x00]);
        let lock = LOCK_WORD as usize * 4;
        config[lock..lock + 4].copy_from_slice(&[0x00, 0x00, UNLOCKED, UNLOCKED]);

        Self {
            config,
            otp: [0xFF; 64],
            data: [[0xFF; 32]; 16],
            temp_key: None,
            rng_counter: 0,
            awake: false,
            pending: None,
            faults: VecDeque::new(),
            busy_reads: 0,
            executed: Vec::new(),
            frames: 0,
        }
    }

    fn config_locked(&self) -> bool {
        self.config[LOCK_WORD as usize * 4 + LOCK_CONFIG_INDEX] != UNLOCKED
    }

    fn data_locked(&self) -> bool {
        self.config[LOCK_WORD as usize * 4 + LOCK_VALUE_INDEX] != UNLOCKED
    }

    fn slot_config(&self, slot: usize) -> SlotConfig {
        let at = 20 + slot * 2;
        SlotConfig::from_bytes([self.config[at], self.config[at + 1]])
    }

    fn serial(&self) -> [u8; 9] {
        let mut sn = [0u8; 9];
        sn[..4].copy_from_slice(&self.config[0..4]);
        sn[4..8].copy_from_slice(&self.config[8..12]);
        sn[8] = self.config[12];
        sn
    }

    fn next_random(&mut self) -> [u8; 32] {
        self.rng_counter += 1;
        sha256(&self.rng_counter.to_le_bytes())
    }

    fn handle_write(&mut self, bytes: &[u8]) {
        match bytes.first() {
            Some(&WORD_ADDRESS_RESET) if bytes.iter().all(|&b| b == 0) => {
                self.awake = true;
                self.pending = Some(AWAKE_FRAME.to_vec());
            }
            Some(&WORD_ADDRESS_SLEEP) => {
                self.awake = false;
                self.temp_key = None;
                self.pending = None;
            }
            Some(&WORD_ADDRESS_IDLE) => {
                self.awake = false;
                self.pending = None;
            }
            Some(&WORD_ADDRESS_COMMAND) if self.awake => {
                self.frames += 1;
                self.pending = Some(self.handle_frame(&bytes[1..]));
            }
            _ => self.pending = None,
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Vec<u8> {
        if let Some(fault) = self.faults.pop_front() {
            return match fault {
                Fault::Awake => AWAKE_FRAME.to_vec(),
                Fault::BadCrc => vec![0x04, 0x00, 0xDE, 0xAD],
            };
        }

        if frame.len() < 7 || frame[0] as usize != frame.len() || !is_crc_valid(frame) {
            return encode_status(StatusResponse::CommError);
        }
        let Some(opcode) = Opcode::from_code(frame[1]) else {
            return encode_status(StatusResponse::ParseError);
        };
        let param1 = frame[2];
        let param2 = [frame[3], frame[4]];
        let data = &frame[5..frame.len() - 2];

        self.executed.push(opcode);
        match self.execute(opcode, param1, param2, data) {
            Ok(payload) if payload.is_empty() => encode_status(StatusResponse::Success),
            Ok(payload) => encode_response(&payload),
            Err(status) => encode_status(status),
        }
    }

    fn execute(&mut self, opcode: Opcode, param1: u8, param2: [u8; 2], data: &[u8]) -> Reply {
        match opcode {
            Opcode::DevRev => Ok(DEV_REV.to_vec()),
            Opcode::Random => Ok(self.next_random().to_vec()),
            Opcode::Read => self.read(param1, param2[0]),
            Opcode::Write => self.write(param1, param2, data),
            Opcode::Lock => self.lock(param1, u16::from_le_bytes(param2)),
            Opcode::Nonce => self.nonce(param1, data),
            Opcode::GenDig => self.gen_dig(param1, param2[0]),
            Opcode::Mac => self.mac(param1, param2[0], data),
            Opcode::CheckMac => self.check_mac(param1, param2[0], data),
            Opcode::Hmac => self.hmac(param1, param2[0]),
            _ => Err(StatusResponse::ParseError),
        }
    }

    fn read(&mut self, param1: u8, addr: u8) -> Reply {
        let len = if param1 & 0x80 != 0 { 32 } else { 4 };
        let start = addr as usize * 4;
        match param1 & 0x03 {
            0 => self
                .config
                .get(start..start + len)
                .map(<[u8]>::to_vec)
                .ok_or(StatusResponse::ParseError),
            1 => self
                .otp
                .get(start..start + len)
                .map(<[u8]>::to_vec)
                .ok_or(StatusResponse::ParseError),
            2 => {
                let slot = (addr >> 3) as usize;
                if !self.data_locked() || slot >= 16 || len != 32 {
                    return Err(StatusResponse::ExecutionError);
                }
                if self.slot_config(slot).is_secret {
                    return Err(StatusResponse::ExecutionError);
                }
                Ok(self.data[slot].to_vec())
            }
            _ => Err(StatusResponse::ParseError),
        }
    }

    fn write(&mut self, param1: u8, param2: [u8; 2], data: &[u8]) -> Reply {
        let addr = param2[0];
        let start = addr as usize * 4;
        match param1 & 0x03 {
            0 => {
                // Serial number and revision words are read only, the lock word
                // only changes through Lock.
                if self.config_locked() || data.len() != 4 || addr < 4 || addr >= LOCK_WORD {
                    return Err(StatusResponse::ExecutionError);
                }
                self.config[start..start + 4].copy_from_slice(data);
                Ok(Vec::new())
            }
            1 => {
                if !self.config_locked() || self.data_locked() || data.len() != 32 || start + 32 > 64
                {
                    return Err(StatusResponse::ExecutionError);
                }
                self.otp[start..start + 32].copy_from_slice(data);
                Ok(Vec::new())
            }
            2 => {
                let slot = (addr >> 3) as usize;
                if !self.config_locked() || slot >= 16 {
                    return Err(StatusResponse::ExecutionError);
                }
                match (self.data_locked(), data.len()) {
                    (false, 32) => {
                        self.data[slot].copy_from_slice(data);
                        Ok(Vec::new())
                    }
                    (true, 64) => self.encrypted_write(slot, param1, param2, data),
                    (true, 32) if self.slot_config(slot).write_config == WriteConfig::Always => {
                        self.data[slot].copy_from_slice(data);
                        Ok(Vec::new())
                    }
                    _ => Err(StatusResponse::ExecutionError),
                }
            }
            _ => Err(StatusResponse::ParseError),
        }
    }

    fn encrypted_write(&mut self, slot: usize, param1: u8, param2: [u8; 2], data: &[u8]) -> Reply {
        if self.slot_config(slot).write_config == WriteConfig::Never {
            return Err(StatusResponse::ExecutionError);
        }
        let temp_key = self.temp_key.take().ok_or(StatusResponse::ExecutionError)?;
        let plain: Vec<u8> = data[..32]
            .iter()
            .zip(temp_key.value.iter())
            .map(|(c, k)| c ^ k)
            .collect();
        let expected = mac_write(&temp_key.value, Opcode::Write.code(), param1, param2, &plain)
            .map_err(|_| StatusResponse::ExecutionError)?;
        if expected[..] != data[32..] {
            return Err(StatusResponse::ExecutionError);
        }
        self.data[slot].copy_from_slice(&plain);
        Ok(Vec::new())
    }

    fn lock(&mut self, param1: u8, crc: u16) -> Reply {
        let lock = LOCK_WORD as usize * 4;
        let skip_crc = param1 & 0x80 != 0;
        match param1 & 0x01 {
            0 => {
                if self.config_locked() {
                    return Err(StatusResponse::ExecutionError);
                }
                if !skip_crc && crc16(&self.config) != crc {
                    return Err(StatusResponse::ExecutionError);
                }
                self.config[lock + LOCK_CONFIG_INDEX] = 0x00;
            }
            _ => {
                if !self.config_locked() || self.data_locked() {
                    return Err(StatusResponse::ExecutionError);
                }
                let mut image = Vec::with_capacity(512 + 64);
                for key in &self.data {
                    image.extend_from_slice(key);
                }
                image.extend_from_slice(&self.otp);
                if !skip_crc && crc16(&image) != crc {
                    return Err(StatusResponse::ExecutionError);
                }
                self.config[lock + LOCK_VALUE_INDEX] = 0x00;
            }
        }
        Ok(Vec::new())
    }

    fn nonce(&mut self, mode: u8, data: &[u8]) -> Reply {
        match (mode, data.len()) {
            (0x03, 32) => {
                let mut value = [0u8; 32];
                value.copy_from_slice(data);
                self.temp_key = Some(TempKey { value, input: true });
                Ok(Vec::new())
            }
            (0x00 | 0x01, 20) => {
                let random = self.next_random();
                let msg = PreimageBuilder::new(55)
                    .bytes(&random)
                    .bytes(data)
                    .byte(Opcode::Nonce.code())
                    .byte(mode)
                    .byte(0x00)
                    .finish()
                    .map_err(|_| StatusResponse::ExecutionError)?;
                self.temp_key = Some(TempKey {
                    value: sha256(&msg),
                    input: false,
                });
                Ok(random.to_vec())
            }
            _ => Err(StatusResponse::ParseError),
        }
    }

    fn gen_dig(&mut self, zone: u8, slot: u8) -> Reply {
        if zone != 0x02 || slot >= 16 || !self.config_locked() {
            return Err(StatusResponse::ExecutionError);
        }
        let prev = self.temp_key.ok_or(StatusResponse::ExecutionError)?;
        let value = gen_temp_key_from_digest(&prev.value, slot, &self.data[slot as usize])
            .map_err(|_| StatusResponse::ExecutionError)?;
        self.temp_key = Some(TempKey { value, ..prev });
        Ok(Vec::new())
    }

    fn mac(&mut self, mode_byte: u8, slot: u8, challenge: &[u8]) -> Reply {
        let mode = MacMode::from_byte(mode_byte);
        let slot_idx = slot as usize;
        if slot_idx >= 16 || self.slot_config(slot_idx).check_only {
            return Err(StatusResponse::ExecutionError);
        }
        if mode.needs_challenge() != (challenge.len() == 32) {
            return Err(StatusResponse::ParseError);
        }

        let uses_temp_key = mode.use_first_32_temp_key || mode.use_second_32_temp_key;
        let temp_key = match (uses_temp_key, self.temp_key) {
            (false, _) => [0u8; 32],
            (true, Some(tk)) if tk.input == mode.temp_key_source_flag => tk.value,
            (true, _) => return Err(StatusResponse::ExecutionError),
        };
        let first = if mode.use_first_32_temp_key {
            temp_key
        } else {
            self.data[slot_idx]
        };
        let second = if mode.use_second_32_temp_key {
            &temp_key[..]
        } else {
            challenge
        };

        let other = OtherData::from_device(&mode, &self.otp, &self.serial())
            .map_err(|_| StatusResponse::ExecutionError)?;
        let msg = PreimageBuilder::new(88)
            .bytes(&first)
            .bytes(second)
            .byte(Opcode::Mac.code())
            .byte(mode_byte)
            .u16_le(slot as u16)
            .bytes(&other.otp8)
            .bytes(&other.otp3)
            .byte(SN8)
            .bytes(&other.sn4)
            .bytes(&SN01)
            .bytes(&other.sn23)
            .finish()
            .map_err(|_| StatusResponse::ExecutionError)?;
        Ok(sha256(&msg).to_vec())
    }

    fn check_mac(&mut self, mode: u8, slot: u8, data: &[u8]) -> Reply {
        if data.len() != 77 || slot >= 16 {
            return Err(StatusResponse::ParseError);
        }
        let (challenge, rest) = data.split_at(32);
        let (response, other) = rest.split_at(32);

        let uses_temp_key = mode & 0x03 != 0;
        let temp_key = match (uses_temp_key, self.temp_key) {
            (false, _) => [0u8; 32],
            (true, Some(tk)) if tk.input == (mode & 0x04 != 0) => tk.value,
            (true, _) => return Err(StatusResponse::ExecutionError),
        };
        let first = if mode & 0x02 != 0 {
            temp_key
        } else {
            self.data[slot as usize]
        };
        let second = if mode & 0x01 != 0 {
            &temp_key[..]
        } else {
            challenge
        };
        let otp8 = if mode & 0x20 != 0 {
            &self.otp[..8]
        } else {
            &[0u8; 8][..]
        };

        let msg = PreimageBuilder::new(88)
            .bytes(&first)
            .bytes(second)
            .bytes(&other[0..4])
            .bytes(otp8)
            .bytes(&other[4..7])
            .byte(SN8)
            .bytes(&other[7..11])
            .bytes(&SN01)
            .bytes(&other[11..13])
            .finish()
            .map_err(|_| StatusResponse::ExecutionError)?;

        if crypto::digest_eq(&sha256(&msg), response) {
            Ok(Vec::new())
        } else {
            Err(StatusResponse::CheckMacMiscompare)
        }
    }

    fn hmac(&mut self, mode_byte: u8, slot: u8) -> Reply {
        let mode = MacMode::from_byte(mode_byte);
        let slot_idx = slot as usize;
        if slot_idx >= 16 || self.slot_config(slot_idx).check_only {
            return Err(StatusResponse::ExecutionError);
        }
        let temp_key = match self.temp_key {
            Some(tk) if tk.input == mode.temp_key_source_flag => tk.value,
            _ => return Err(StatusResponse::ExecutionError),
        };
        let other = OtherData::from_device(&mode, &self.otp, &self.serial())
            .map_err(|_| StatusResponse::ExecutionError)?;
        let digest = hmac_digest(&temp_key, &self.data[slot_idx], mode_byte, slot as u16, &other)
            .map_err(|_| StatusResponse::ExecutionError)?;
        Ok(digest.to_vec())
    }
}

/// Cloneable handle to one simulated chip.
#[derive(Clone)]
pub struct SimChip {
    chip: Arc<Mutex<Chip>>,
}

impl SimChip {
    pub fn factory() -> Self {
        Self {
            chip: Arc::new(Mutex::new(Chip::factory())),
        }
    }

    /// Set the OTP mode byte as if the config zone had been edited before.
    pub fn set_otp_mode(&self, mode: u8) {
        self.chip.lock().unwrap().config[OTP_MODE_WORD as usize * 4 + 2] = mode;
    }

    pub fn set_slot_config(&self, slot: usize, config: SlotConfig) {
        let at = 20 + slot * 2;
        self.chip.lock().unwrap().config[at..at + 2].copy_from_slice(&config.to_bytes());
    }

    pub fn inject(&self, fault: Fault) {
        self.chip.lock().unwrap().faults.push_back(fault);
    }

    /// NACK the next `reads` reads, as a device still executing does.
    pub fn stall_reads(&self, reads: usize) {
        self.chip.lock().unwrap().busy_reads = reads;
    }

    pub fn otp_read_only(&self) -> bool {
        self.chip.lock().unwrap().config[OTP_MODE_WORD as usize * 4 + 2] == OTP_MODE_READ_ONLY
    }

    pub fn data_slot(&self, slot: usize) -> [u8; 32] {
        self.chip.lock().unwrap().data[slot]
    }

    pub fn otp(&self) -> [u8; 64] {
        self.chip.lock().unwrap().otp
    }

    pub fn config(&self) -> [u8; 88] {
        self.chip.lock().unwrap().config
    }

    /// Opcodes of every command the chip executed, in order.
    pub fn executed(&self) -> Vec<Opcode> {
        self.chip.lock().unwrap().executed.clone()
    }

    pub fn clear_executed(&self) {
        self.chip.lock().unwrap().executed.clear();
    }

    /// Command frames received, executed or not.
    pub fn frames(&self) -> usize {
        self.chip.lock().unwrap().frames
    }

    pub fn is_awake(&self) -> bool {
        self.chip.lock().unwrap().awake
    }
}

impl Transport for SimChip {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        self.chip.lock().unwrap().handle_write(data);
        Ok(data.len())
    }

    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut chip = self.chip.lock().unwrap();
        if chip.busy_reads > 0 {
            chip.busy_reads -= 1;
            return Err(TransportError::ReadFailed(
                "Remote I/O error (os error 121)".into(),
            ));
        }
        let mut frame = chip
            .pending
            .take()
            .ok_or(TransportError::Timeout { timeout_ms: 0 })?;
        frame.resize(len.max(frame.len()), 0xFF);
        Ok(frame)
    }

    fn is_connected(&self) -> bool {
        true
    }
}
