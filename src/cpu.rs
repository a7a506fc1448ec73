//! CPU execution units.

use std::sync::Arc;

use crate::memory::AddressSpace;

/// Execution state of a CPU unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// Held in reset; no instruction has executed since the last reset.
    Reset,
    /// Executing guest code under the hypervisor backend.
    Running,
}

/// One x86 CPU unit of the emulated machine.
///
/// Units are created once at machine construction with a stable zero-based
/// index and share the composed physical address space. Instruction-level
/// execution is driven by the hypervisor backend, not by this type.
pub struct X86Cpu {
    index: u32,
    mem: Arc<AddressSpace>,
    state: CpuState,
}

impl X86Cpu {
    pub(crate) fn new(index: u32, mem: Arc<AddressSpace>) -> Self {
        Self {
            index,
            mem,
            state: CpuState::Reset,
        }
    }

    /// Stable zero-based index of this unit.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current execution state.
    pub fn state(&self) -> CpuState {
        self.state
    }

    /// The physical address space this unit fetches from.
    pub fn memory(&self) -> &Arc<AddressSpace> {
        &self.mem
    }

    /// Return the unit to its power-on state.
    pub(crate) fn reset(&mut self) {
        self.state = CpuState::Reset;
    }

    pub(crate) fn set_running(&mut self) {
        self.state = CpuState::Running;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_starts_in_reset() {
        let mem = Arc::new(AddressSpace::new());
        let cpu = X86Cpu::new(3, mem);
        assert_eq!(cpu.index(), 3);
        assert_eq!(cpu.state(), CpuState::Reset);
    }
}
