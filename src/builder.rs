//! Machine builder for configuring and creating a [`Ps4Machine`].

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::device::aeolia::{AeoliaHubConfig, UartBackend};
use crate::error::{Error, Result};
use crate::firmware::KernelPatchSet;
use crate::machine::Ps4Machine;
use crate::memory::layout::{RAM_BELOW_4G, RAM_SIZE};

/// Default CPU unit count of the platform.
pub const DEFAULT_CPU_COUNT: u32 = 8;

/// Builder for creating a [`Ps4Machine`].
///
/// # Example
///
/// ```rust,no_run
/// use ps4vm::Ps4Machine;
///
/// let machine = Ps4Machine::builder()
///     .cpus(8)
///     .uart0(std::io::stdout())
///     .build()?;
/// # Ok::<(), ps4vm::Error>(())
/// ```
#[derive(Default)]
pub struct MachineBuilder {
    cpus: Option<u32>,
    ram_size: Option<u64>,
    uart0: Option<UartBackend>,
    uart1: Option<UartBackend>,
    kernel_patches: Option<KernelPatchSet>,
}

impl MachineBuilder {
    /// Create a new machine builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of CPU units.
    ///
    /// Default: 8
    pub fn cpus(mut self, count: u32) -> Self {
        self.cpus = Some(count);
        self
    }

    /// Set the general RAM size in bytes.
    ///
    /// Default: 8 GiB. Must cover at least the below-4 GiB window.
    pub fn ram_size(mut self, bytes: u64) -> Self {
        self.ram_size = Some(bytes);
        self
    }

    /// Set the output backend for serial channel 0 (kernel console).
    pub fn uart0(mut self, writer: impl Write + Send + 'static) -> Self {
        self.uart0 = Some(Arc::new(Mutex::new(Box::new(writer))));
        self
    }

    /// Set the output backend for serial channel 1.
    pub fn uart1(mut self, writer: impl Write + Send + 'static) -> Self {
        self.uart1 = Some(Arc::new(Mutex::new(Box::new(writer))));
        self
    }

    /// Opt in to a revision-specific kernel patch set.
    ///
    /// No patches are applied unless one is configured.
    pub fn kernel_patches(mut self, patches: KernelPatchSet) -> Self {
        self.kernel_patches = Some(patches);
        self
    }

    /// Build the machine.
    ///
    /// Validates the configuration, then constructs backing stores, memory
    /// spaces, the address composition, CPU units, and controllers, in
    /// that dependency order.
    pub fn build(self) -> Result<Ps4Machine> {
        let cpus = self.cpus.unwrap_or(DEFAULT_CPU_COUNT);
        if cpus == 0 {
            return Err(Error::InvalidCpuCount(cpus));
        }

        let ram_size = self.ram_size.unwrap_or(RAM_SIZE);
        if ram_size < RAM_BELOW_4G {
            return Err(Error::InvalidMemorySize(ram_size));
        }

        let aeolia_config = AeoliaHubConfig {
            uart0: self.uart0,
            uart1: self.uart1,
        };

        Ps4Machine::new(cpus, ram_size, aeolia_config, self.kernel_patches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_cpus() {
        let err = MachineBuilder::new().cpus(0).ram_size(RAM_BELOW_4G).build();
        assert!(matches!(err, Err(Error::InvalidCpuCount(0))));
    }

    #[test]
    fn test_rejects_short_ram() {
        let err = MachineBuilder::new().ram_size(0x1000).build();
        assert!(matches!(err, Err(Error::InvalidMemorySize(0x1000))));
    }

    #[test]
    fn test_custom_cpu_count() {
        let machine = MachineBuilder::new()
            .cpus(2)
            .ram_size(RAM_BELOW_4G)
            .build()
            .unwrap();
        assert_eq!(machine.cpus().len(), 2);
    }

    #[test]
    fn test_uart_backends() {
        let machine = MachineBuilder::new()
            .ram_size(RAM_BELOW_4G)
            .uart0(Vec::new())
            .build()
            .unwrap();
        assert!(machine.aeolia().pcie.uart0().is_some());
        assert!(machine.aeolia().pcie.uart1().is_none());
    }
}
