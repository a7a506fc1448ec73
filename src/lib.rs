//! # ps4vm
//!
//! An embeddable emulation core for a PS4-class machine: composes the
//! platform's guest physical address map out of RAM, aliased RAM windows,
//! and a boot-ROM-like region, and drives the firmware recovery boot path
//! that extracts a kernel from a recovery image and stages it in memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ps4vm::{Ps4Machine, Result};
//!
//! fn main() -> Result<()> {
//!     let mut machine = Ps4Machine::builder()
//!         .uart0(std::io::stdout())
//!         .build()?;
//!
//!     machine.recover("PS4UPDATE.PUP")?;
//!     machine.start()?;
//!     Ok(())
//! }
//! ```
//!
//! Instruction-level CPU execution, controller register semantics, and
//! signature validation of firmware images are external collaborators;
//! this crate owns the memory map, the machine lifecycle, and the
//! recovery pipeline.

mod builder;
mod error;
mod machine;

pub mod cpu;
pub mod device;
pub mod firmware;
pub mod hypervisor;
pub mod memory;

// Re-exports
pub use builder::{MachineBuilder, DEFAULT_CPU_COUNT};
pub use error::{Error, Result};
pub use machine::{MachineState, Ps4Machine};

/// Check if a hardware-accelerated hypervisor backend is available.
pub fn is_supported() -> bool {
    hypervisor::is_available()
}
