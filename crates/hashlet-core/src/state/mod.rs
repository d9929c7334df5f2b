//! Device state module.

pub mod machine;
pub mod slot_config;

pub use machine::DeviceState;
pub use slot_config::{SlotConfig, WriteConfig};
