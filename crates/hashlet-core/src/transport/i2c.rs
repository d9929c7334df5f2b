//! Linux i2c-dev transport implementation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use tracing::{debug, info, instrument};

use super::traits::{Transport, TransportError};

/// `I2C_SLAVE` request from `linux/i2c-dev.h`.
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// Transport over a Linux `/dev/i2c-N` character device.
pub struct I2cTransport {
    file: File,
    bus: String,
    address: u16,
}

impl I2cTransport {
    /// Open `bus` and select the 7-bit slave `address`.
    #[instrument(level = "info", fields(address = format!("{:02X}", address)))]
    pub fn open(bus: &str, address: u16) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(bus)
            .map_err(|e| TransportError::OpenFailed {
                path: bus.to_string(),
                message: e.to_string(),
            })?;

        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, address as libc::c_ulong) };
        if ret < 0 {
            return Err(TransportError::AddressSelectFailed {
                address,
                message: std::io::Error::last_os_error().to_string(),
            });
        }

        info!(bus = %bus, address = %format!("0x{:02X}", address), "Opened I2C device");

        Ok(Self {
            file,
            bus: bus.to_string(),
            address,
        })
    }

    pub fn bus(&self) -> &str {
        &self.bus
    }

    pub fn address(&self) -> u16 {
        self.address
    }
}

impl Transport for I2cTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let written = (&self.file)
            .write(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!(len = written, "I2C write");
        Ok(written)
    }

    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        let n = (&self.file)
            .read(&mut buf)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        if n == 0 {
            return Err(TransportError::ReadFailed("Empty response".into()));
        }
        buf.truncate(n);
        debug!(len = n, "I2C read");
        Ok(buf)
    }

    fn is_connected(&self) -> bool {
        std::path::Path::new(&self.bus).exists()
    }
}
