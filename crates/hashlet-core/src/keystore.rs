//! Host-side record of the keys written at personalization.
//!
//! Plain text, one slot per line:
//!
//! ```text
//! # Hashlet key store written from version: 0.1.0
//! key_slot_00    00112233...
//! ```
//!
//! Lines starting with `#` and blank lines are ignored.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::keys::KeyContainer;
use crate::protocol::constants::{
    BLOCK_SIZE, DATA_SLOT_COUNT, KEY_STORE_DEFAULT_FILE, KEY_STORE_HEADER,
};

const SLOT_PREFIX: &str = "key_slot_";

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("Key store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key store line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("No key recorded for slot {0}")]
    MissingKey(u8),

    #[error("HOME is not set; pass a key store path")]
    NoHomeDir,
}

pub trait KeyStore {
    /// Persist every key in `keys`, replacing what was recorded before.
    fn record_keys(&mut self, keys: &KeyContainer) -> Result<(), KeyStoreError>;

    /// Hex text of the key recorded for `slot`, if any.
    fn parsed_key(&self, slot: u8) -> Result<Option<String>, KeyStoreError>;
}

/// Render a key store file.
pub fn format_key_store(keys: &KeyContainer, version: &str) -> String {
    let mut out = format!("{}{}\n", KEY_STORE_HEADER, version);
    for (slot, key) in keys.iter().enumerate() {
        out.push_str(&format!("{}{:02}    {}\n", SLOT_PREFIX, slot, hex::encode_upper(key)));
    }
    out
}

/// Parse key store text into slot -> hex.
pub fn parse_key_store(text: &str) -> Result<BTreeMap<u8, String>, KeyStoreError> {
    let mut keys = BTreeMap::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parse_err = |message: String| KeyStoreError::Parse { line, message };

        let mut fields = trimmed.split_whitespace();
        let (Some(name), Some(value), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(parse_err(format!("expected `{}NN <hex>`", SLOT_PREFIX)));
        };

        let slot: u8 = name
            .strip_prefix(SLOT_PREFIX)
            .and_then(|n| n.parse().ok())
            .filter(|&n: &u8| (n as usize) < DATA_SLOT_COUNT)
            .ok_or_else(|| parse_err(format!("bad slot name `{}`", name)))?;

        if value.len() != BLOCK_SIZE * 2 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(parse_err(format!(
                "key_slot_{:02} must be {} hex characters",
                slot,
                BLOCK_SIZE * 2
            )));
        }

        if keys.insert(slot, value.to_ascii_uppercase()).is_some() {
            return Err(parse_err(format!("key_slot_{:02} recorded twice", slot)));
        }
    }

    Ok(keys)
}

/// Key store kept in a file, `$HOME/.hashlet` by default.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn default_path() -> Result<PathBuf, KeyStoreError> {
        std::env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .map(|home| PathBuf::from(home).join(KEY_STORE_DEFAULT_FILE))
            .ok_or(KeyStoreError::NoHomeDir)
    }

    pub fn open_default() -> Result<Self, KeyStoreError> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> KeyStoreError {
        KeyStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl KeyStore for FileKeyStore {
    fn record_keys(&mut self, keys: &KeyContainer) -> Result<(), KeyStoreError> {
        let text = format_key_store(keys, env!("CARGO_PKG_VERSION"));
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.write_all(text.as_bytes()).map_err(|e| self.io_err(e))?;
        info!(path = %self.path.display(), "Recorded keys");
        Ok(())
    }

    fn parsed_key(&self, slot: u8) -> Result<Option<String>, KeyStoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No key store");
                return Ok(None);
            }
            Err(e) => return Err(self.io_err(e)),
        };
        Ok(parse_key_store(&text)?.remove(&slot))
    }
}

/// In-memory key store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyStore {
    text: Option<String>,
}

impl MemoryKeyStore {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl KeyStore for MemoryKeyStore {
    fn record_keys(&mut self, keys: &KeyContainer) -> Result<(), KeyStoreError> {
        self.text = Some(format_key_store(keys, env!("CARGO_PKG_VERSION")));
        Ok(())
    }

    fn parsed_key(&self, slot: u8) -> Result<Option<String>, KeyStoreError> {
        match &self.text {
            Some(text) => Ok(parse_key_store(text)?.remove(&slot)),
            None => Ok(None),
        }
    }
}
