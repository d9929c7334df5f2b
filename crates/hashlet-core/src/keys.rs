//! Keys written to the Data zone at personalization.

use std::fmt;

use zeroize::Zeroizing;

use crate::device::{Device, DeviceError};
use crate::keystore::{KeyStore, KeyStoreError};
use crate::protocol::constants::{BLOCK_SIZE, DATA_SLOT_COUNT, DATA_ZONE_SIZE};
use crate::transport::Transport;

pub type Key = [u8; BLOCK_SIZE];

/// One key per data slot. Wiped from memory when dropped.
#[derive(Clone)]
pub struct KeyContainer {
    keys: Zeroizing<[Key; DATA_SLOT_COUNT]>,
}

impl KeyContainer {
    pub fn new(keys: [Key; DATA_SLOT_COUNT]) -> Self {
        Self {
            keys: Zeroizing::new(keys),
        }
    }

    /// Draw 16 fresh keys from the device RNG without updating its seed.
    pub fn generate<T: Transport>(device: &mut Device<T>) -> Result<Self, DeviceError> {
        let mut keys = Zeroizing::new([[0u8; BLOCK_SIZE]; DATA_SLOT_COUNT]);
        for key in keys.iter_mut() {
            *key = device.random(false)?;
        }
        Ok(Self { keys })
    }

    /// Rebuild the container from a key store. Every slot must be present.
    pub fn from_key_store(store: &dyn KeyStore) -> Result<Self, KeyStoreError> {
        let mut keys = Zeroizing::new([[0u8; BLOCK_SIZE]; DATA_SLOT_COUNT]);
        for (slot, key) in keys.iter_mut().enumerate() {
            let slot = slot as u8;
            let text = store
                .parsed_key(slot)?
                .ok_or(KeyStoreError::MissingKey(slot))?;
            let raw = Zeroizing::new(hex::decode(text.as_str()).map_err(|e| {
                KeyStoreError::Parse {
                    line: 0,
                    message: format!("key_slot_{:02}: {}", slot, e),
                }
            })?);
            *key = raw.as_slice().try_into().map_err(|_| KeyStoreError::Parse {
                line: 0,
                message: format!("key_slot_{:02} is {} bytes", slot, raw.len()),
            })?;
        }
        Ok(Self { keys })
    }

    pub fn key(&self, slot: u8) -> Option<&Key> {
        self.keys.get(slot as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    /// Keys concatenated in slot order, as laid out in the Data zone.
    pub fn as_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(DATA_ZONE_SIZE));
        for key in self.keys.iter() {
            out.extend_from_slice(key);
        }
        out
    }
}

impl fmt::Debug for KeyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyContainer")
            .field("slots", &DATA_SLOT_COUNT)
            .finish_non_exhaustive()
    }
}
