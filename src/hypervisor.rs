//! Hypervisor backend abstraction.
//!
//! The machine owns a virtual machine handle but does not itself execute
//! guest instructions; that is the hypervisor's job. This module defines
//! the trait the machine consumes and a software backend used when no
//! hardware accelerator is wired up.

use crate::error::Result;

/// Trait that hypervisor backends must implement.
pub trait HypervisorBackend: Send {
    /// Get the backend name (e.g., "core", "kvm").
    fn name(&self) -> &'static str;

    /// Map a host memory region into the guest physical address space.
    ///
    /// `host` must stay valid for the lifetime of the machine; the machine
    /// guarantees this by tearing backends down before memory spaces.
    fn map_region(&mut self, guest_base: u64, size: u64, host: *mut u8) -> Result<()>;

    /// Return all vCPU state to its power-on values.
    fn reset(&mut self) -> Result<()>;
}

/// Software backend: tracks mappings but performs no execution.
///
/// Stands in for a hardware accelerator during construction, testing, and
/// the recovery pipeline, none of which run guest code.
#[derive(Default)]
pub struct CoreBackend {
    regions: Vec<(u64, u64)>,
}

impl CoreBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of guest memory regions mapped so far.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

impl HypervisorBackend for CoreBackend {
    fn name(&self) -> &'static str {
        "core"
    }

    fn map_region(&mut self, guest_base: u64, size: u64, _host: *mut u8) -> Result<()> {
        self.regions.push((guest_base, size));
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Check if an accelerated hypervisor is available on this platform.
pub fn is_available() -> bool {
    // Only the software backend is wired up in this core.
    false
}

/// Create the backend for this platform.
pub fn create() -> Result<Box<dyn HypervisorBackend>> {
    Ok(Box::new(CoreBackend::new()))
}
