//! Aeolia south-bridge controllers.
//!
//! Aeolia is the platform's southbridge ASIC: ACPI, gigabit ethernet, SATA,
//! SD host, the PCIe glue (which also fronts the two UARTs), a DMA
//! controller, an internal memory controller, and USB. The memory
//! controller owns a scratchpad store that the PCIe glue exposes to the
//! guest; the machine hands that capability over in an explicit wiring
//! phase after all controllers exist.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::device::{stub_controller, Device};
use crate::error::Result;
use crate::memory::MemorySpace;

/// Size of the Aeolia scratchpad memory (SPM).
pub const SPM_SIZE: u64 = 0x4_0000;

/// Serial output backend shared with the host.
pub type UartBackend = Arc<Mutex<Box<dyn Write + Send>>>;

/// Configuration for the Aeolia hub.
#[derive(Default)]
pub struct AeoliaHubConfig {
    /// Output backend for UART 0 (kernel console).
    pub uart0: Option<UartBackend>,
    /// Output backend for UART 1.
    pub uart1: Option<UartBackend>,
}

stub_controller!(
    /// ACPI controller.
    AeoliaAcpi,
    "aeolia-acpi"
);
stub_controller!(
    /// Gigabit ethernet controller.
    AeoliaGbe,
    "aeolia-gbe"
);
stub_controller!(
    /// AHCI (SATA) controller.
    AeoliaAhci,
    "aeolia-ahci"
);
stub_controller!(
    /// SD host controller.
    AeoliaSdhci,
    "aeolia-sdhci"
);
stub_controller!(
    /// DMA controller.
    AeoliaDmac,
    "aeolia-dmac"
);
stub_controller!(
    /// USB xHCI controller.
    AeoliaXhci,
    "aeolia-xhci"
);

/// Aeolia internal memory controller; owns the scratchpad store.
pub struct AeoliaMem {
    spm: Arc<MemorySpace>,
}

impl AeoliaMem {
    pub fn new() -> Result<Self> {
        Ok(Self {
            spm: Arc::new(MemorySpace::new(SPM_SIZE)?),
        })
    }

    /// The scratchpad memory this controller owns.
    pub fn scratchpad(&self) -> Arc<MemorySpace> {
        self.spm.clone()
    }
}

impl Device for AeoliaMem {
    fn name(&self) -> &'static str {
        "aeolia-mem"
    }

    fn reset(&mut self) {
        // Scratchpad contents survive reset, as on hardware.
    }
}

/// Aeolia PCIe glue; fronts the UARTs and the scratchpad window.
pub struct AeoliaPcie {
    uart0: Option<UartBackend>,
    uart1: Option<UartBackend>,
    spm: Option<Arc<MemorySpace>>,
}

impl AeoliaPcie {
    pub fn new(uart0: Option<UartBackend>, uart1: Option<UartBackend>) -> Self {
        Self {
            uart0,
            uart1,
            spm: None,
        }
    }

    /// Attach the memory controller's scratchpad.
    ///
    /// Called by the machine's wiring phase once all controllers exist;
    /// the scratchpad is owned by [`AeoliaMem`], this is a shared view.
    pub fn attach_scratchpad(&mut self, spm: Arc<MemorySpace>) {
        self.spm = Some(spm);
    }

    /// Whether the scratchpad capability has been wired.
    pub fn has_scratchpad(&self) -> bool {
        self.spm.is_some()
    }

    pub fn uart0(&self) -> Option<&UartBackend> {
        self.uart0.as_ref()
    }

    pub fn uart1(&self) -> Option<&UartBackend> {
        self.uart1.as_ref()
    }
}

impl Device for AeoliaPcie {
    fn name(&self) -> &'static str {
        "aeolia-pcie"
    }

    fn reset(&mut self) {
        // UART backends and the scratchpad wiring persist across reset.
    }
}

/// The Aeolia hub and its controllers, in construction order.
pub struct AeoliaHub {
    pub acpi: AeoliaAcpi,
    pub gbe: AeoliaGbe,
    pub ahci: AeoliaAhci,
    pub sdhci: AeoliaSdhci,
    pub pcie: AeoliaPcie,
    pub dmac: AeoliaDmac,
    pub mem: AeoliaMem,
    pub xhci: AeoliaXhci,
}

impl AeoliaHub {
    pub fn new(config: AeoliaHubConfig) -> Result<Self> {
        Ok(Self {
            acpi: AeoliaAcpi::new(),
            gbe: AeoliaGbe::new(),
            ahci: AeoliaAhci::new(),
            sdhci: AeoliaSdhci::new(),
            pcie: AeoliaPcie::new(config.uart0, config.uart1),
            dmac: AeoliaDmac::new(),
            mem: AeoliaMem::new()?,
            xhci: AeoliaXhci::new(),
        })
    }

    /// Reset every controller, in construction order.
    pub fn reset(&mut self) {
        self.acpi.reset();
        self.gbe.reset();
        self.ahci.reset();
        self.sdhci.reset();
        self.pcie.reset();
        self.dmac.reset();
        self.mem.reset();
        self.xhci.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Space;

    #[test]
    fn test_scratchpad_wiring() {
        let mut hub = AeoliaHub::new(AeoliaHubConfig::default()).unwrap();
        assert!(!hub.pcie.has_scratchpad());

        let spm = hub.mem.scratchpad();
        hub.pcie.attach_scratchpad(spm.clone());
        assert!(hub.pcie.has_scratchpad());
        assert_eq!(spm.size(), SPM_SIZE);
    }
}
