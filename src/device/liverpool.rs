//! Liverpool APU-side controllers.
//!
//! Liverpool is the platform's combined CPU/GPU package. The host hub owns
//! the root complex, graphics core, HD audio controller, IOMMU, root port,
//! and the six north-bridge PCI functions. Only construction/teardown order
//! and reset behavior matter to this core.

use crate::device::{stub_controller, Device};

stub_controller!(
    /// PCIe root complex.
    LiverpoolRc,
    "lvp-rc"
);
stub_controller!(
    /// Graphics core.
    LiverpoolGc,
    "lvp-gc"
);
stub_controller!(
    /// HD audio controller.
    LiverpoolHdac,
    "lvp-hdac"
);
stub_controller!(
    /// I/O memory management unit.
    LiverpoolIommu,
    "lvp-iommu"
);
stub_controller!(
    /// PCIe root port.
    LiverpoolRp,
    "lvp-rp"
);

/// One of the six north-bridge PCI functions.
pub struct LiverpoolNbFunc {
    function: u8,
    enabled: bool,
}

impl LiverpoolNbFunc {
    pub fn new(function: u8) -> Self {
        Self {
            function,
            enabled: true,
        }
    }

    pub fn function(&self) -> u8 {
        self.function
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Device for LiverpoolNbFunc {
    fn name(&self) -> &'static str {
        "lvp-nb"
    }

    fn reset(&mut self) {
        self.enabled = true;
    }
}

/// The Liverpool host hub and its controllers, in construction order.
pub struct LiverpoolHost {
    pub rc: LiverpoolRc,
    pub gc: LiverpoolGc,
    pub hdac: LiverpoolHdac,
    pub iommu: LiverpoolIommu,
    pub rp: LiverpoolRp,
    pub nb: Vec<LiverpoolNbFunc>,
}

impl LiverpoolHost {
    pub fn new() -> Self {
        Self {
            rc: LiverpoolRc::new(),
            gc: LiverpoolGc::new(),
            hdac: LiverpoolHdac::new(),
            iommu: LiverpoolIommu::new(),
            rp: LiverpoolRp::new(),
            nb: (0..6).map(LiverpoolNbFunc::new).collect(),
        }
    }

    /// Reset every controller, in construction order.
    pub fn reset(&mut self) {
        self.rc.reset();
        self.gc.reset();
        self.hdac.reset();
        self.iommu.reset();
        self.rp.reset();
        for func in &mut self.nb {
            func.reset();
        }
    }
}

impl Default for LiverpoolHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_function_roster() {
        let host = LiverpoolHost::new();
        let funcs: Vec<u8> = host.nb.iter().map(|f| f.function()).collect();
        assert_eq!(funcs, [0, 1, 2, 3, 4, 5]);
    }
}
