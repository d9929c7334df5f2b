#![allow(dead_code)]

pub mod sim;

use std::sync::Arc;

use hashlet_core::events::NullObserver;
use hashlet_core::{Device, KeyContainer, Pacing};

pub use sim::{Fault, SimChip};

/// Awake device on a fresh simulated chip.
pub fn sim_device() -> (SimChip, Device<SimChip>) {
    let chip = SimChip::factory();
    let mut device =
        Device::with_observer(chip.clone(), Arc::new(NullObserver)).with_pacing(Pacing::Disabled);
    device.wake().unwrap();
    (chip, device)
}

/// Keys 0x00.., 0x01.., one fill byte per slot.
pub fn fixed_keys() -> KeyContainer {
    KeyContainer::new(core::array::from_fn(|slot| [0x10 + slot as u8; 32]))
}
