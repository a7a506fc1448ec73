//! Guest physical memory composition.
//!
//! This module provides the building blocks of the machine's physical
//! address map: owned backing stores, aliased windows onto them, and the
//! top-level composition that routes a guest physical address to the
//! correct region.

mod bus;
mod space;

pub use bus::AddressSpace;
pub use space::{AliasSpace, MemorySpace, Space, SpaceFlags};

/// Physical memory layout of the emulated platform.
pub mod layout {
    /// Total general RAM (8 GiB).
    pub const RAM_SIZE: u64 = 8 << 30;

    /// RAM exposed below the 4 GiB boundary (2 GiB window at address 0).
    pub const RAM_BELOW_4G: u64 = 0x8000_0000;

    /// Base address of the RAM remapped above 4 GiB.
    pub const HIGH_RAM_BASE: u64 = 4 << 30;

    /// Size of the UBIOS (boot ROM shadow) region.
    pub const UBIOS_SIZE: u64 = 0x8_0000;

    /// The UBIOS region sits directly below the 4 GiB boundary.
    pub const UBIOS_BASE: u64 = HIGH_RAM_BASE - UBIOS_SIZE;

    /// RAM offset of the boot parameter block the kernel inspects at boot.
    pub const BOOT_PARAMS_BASE: u64 = 0x60_0000;
}
