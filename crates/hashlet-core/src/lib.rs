//! Hashlet-Core: ATSHA204 secure element driver in Rust.
//!
//! Drives the Cryptotronix Hashlet (an ATSHA204 on I2C) and reproduces the
//! device's digests on the host so its answers can be verified offline.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Opcodes, command/response frames, CRC16, mode bytes
//! - **Transport**: Linux i2c-dev and a mock for tests
//! - **Device**: Retry driver and the command catalog
//! - **Crypto**: Host-side MAC, HMAC, TempKey and encrypted write digests
//! - **State**: Lock-derived lifecycle state and slot configuration
//! - **Personalize**: One-way provisioning with the key store
//! - **Events**: Observer pattern for front ends
//! - **Session**: Wake on open, sleep on drop
//!
//! # Example
//!
//! ```no_run
//! use hashlet_core::session::{Session, SessionConfig};
//!
//! let config = SessionConfig::default();
//! let mut session = Session::open(&config).expect("open failed");
//! let random = session.device().random(false).expect("random failed");
//! println!("{}", hex::encode_upper(random));
//! ```

pub mod commands;
pub mod crypto;
pub mod device;
pub mod events;
pub mod keys;
pub mod keystore;
pub mod personalize;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod zone;

// Re-exports for convenience
pub use commands::{HmacResponse, MacResponse};
pub use crypto::CryptoError;
pub use device::{Device, DeviceError, Pacing, PreconditionError};
pub use events::{HashletEvent, HashletObserver, PersonalizePhase, TracingObserver};
pub use keys::KeyContainer;
pub use keystore::{FileKeyStore, KeyStore, KeyStoreError, MemoryKeyStore};
pub use personalize::{PersonalizeError, personalize};
pub use protocol::{CheckMacMode, MacMode, Opcode, StatusResponse};
pub use session::{Session, SessionConfig};
pub use state::{DeviceState, SlotConfig, WriteConfig};
pub use transport::{I2cTransport, MockTransport, Transport, TransportError};
pub use zone::Zone;
