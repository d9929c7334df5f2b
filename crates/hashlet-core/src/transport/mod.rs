//! Transport layer module.

pub mod i2c;
pub mod mock;
pub mod traits;

pub use i2c::I2cTransport;
pub use mock::MockTransport;
pub use traits::{Transport, TransportError};
