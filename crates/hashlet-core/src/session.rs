//! Hashlet session - owns an awake device for the duration of one job.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::device::{Device, Pacing};
use crate::events::{HashletObserver, TracingObserver};
use crate::keystore::FileKeyStore;
use crate::protocol::constants::{DEFAULT_I2C_ADDRESS, DEFAULT_I2C_BUS, DEFAULT_RETRY_BUDGET};
use crate::transport::{I2cTransport, Transport};

/// Configuration for a Hashlet session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// I2C bus device node.
    pub bus: String,
    /// 7-bit device address.
    pub address: u16,
    /// Attempts per command before giving up.
    pub retry_budget: u32,
    /// Wait between command and response.
    pub pacing: Pacing,
    /// Key store file. Defaults to `$HOME/.hashlet`.
    pub key_store: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bus: DEFAULT_I2C_BUS.to_string(),
            address: DEFAULT_I2C_ADDRESS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            pacing: Pacing::default(),
            key_store: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: SessionConfig = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Key store named by the config, or the default one.
    pub fn key_store(&self) -> Result<FileKeyStore> {
        match &self.key_store {
            Some(path) => Ok(FileKeyStore::new(path)),
            None => Ok(FileKeyStore::open_default()?),
        }
    }
}

/// An awake device. The device is put back to sleep when the session drops.
pub struct Session<T: Transport> {
    device: Device<T>,
}

impl Session<I2cTransport> {
    /// Open the configured bus and wake the device.
    #[instrument(level = "info", skip(config), fields(bus = %config.bus, address = format!("0x{:02X}", config.address)))]
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let transport = I2cTransport::open(&config.bus, config.address)
            .with_context(|| format!("opening {}", config.bus))?;
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: Transport> Session<T> {
    /// Wake the device behind `transport`.
    pub fn with_observer(
        transport: T,
        config: &SessionConfig,
        observer: Arc<dyn HashletObserver>,
    ) -> Result<Self> {
        let mut device = Device::with_observer(transport, observer)
            .with_retry_budget(config.retry_budget)
            .with_pacing(config.pacing);
        device.wake().context("waking device")?;
        info!("Session started");
        Ok(Self { device })
    }

    pub fn device(&mut self) -> &mut Device<T> {
        &mut self.device
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.device.sleep() {
            warn!(error = %e, "Failed to put device to sleep");
        }
    }
}
