//! PS4 machine aggregate.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cpu::X86Cpu;
use crate::device::aeolia::AeoliaHubConfig;
use crate::device::{AeoliaHub, LiverpoolHost};
use crate::error::{Error, Result};
use crate::firmware::boot::{
    BOOT_STRAPS, KASLR_PREIMAGE, KASLR_PREIMAGE_OFFSET, KERNEL_SELF_NAME, PUP_ENTRY_COREOS,
    UPDATE_PUP_NAME,
};
use crate::firmware::self_image::PT_LOAD;
use crate::firmware::{BlsArchive, KernelPatchSet, PatchOp, PupPackage, SelfImage};
use crate::hypervisor::{self, HypervisorBackend};
use crate::memory::layout::{
    BOOT_PARAMS_BASE, HIGH_RAM_BASE, RAM_BELOW_4G, UBIOS_BASE, UBIOS_SIZE,
};
use crate::memory::{AddressSpace, AliasSpace, MemorySpace, Space};

/// The lifecycle state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// All spaces, CPUs, and controllers exist; no CPU has executed yet.
    Constructed,
    /// CPU units are executing guest code.
    Running,
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineState::Constructed => write!(f, "constructed"),
            MachineState::Running => write!(f, "running"),
        }
    }
}

/// An emulated PS4 machine.
///
/// Owns the virtual machine handle, the composed physical address space,
/// the CPU units, and the bus-hosted controller hubs. Use
/// [`Ps4Machine::builder()`] to create one, then [`recover`] to boot a
/// kernel out of a recovery image.
///
/// [`recover`]: Ps4Machine::recover
///
/// # Example
///
/// ```rust,no_run
/// use ps4vm::Ps4Machine;
///
/// let mut machine = Ps4Machine::builder().build()?;
/// machine.recover("PS4UPDATE.PUP")?;
/// machine.start()?;
/// # Ok::<(), ps4vm::Error>(())
/// ```
pub struct Ps4Machine {
    // Fields drop in declaration order: controllers first, then CPUs, then
    // the VM handle, then the composed map, then the backing stores. The
    // handle and everything holding a view of a store goes away before the
    // store it points into.
    aeolia: AeoliaHub,
    liverpool: LiverpoolHost,
    cpus: Vec<X86Cpu>,
    vm: Box<dyn HypervisorBackend>,
    mem: Arc<AddressSpace>,
    ubios: Arc<MemorySpace>,
    ram: Arc<MemorySpace>,
    state: MachineState,
    patches: Option<KernelPatchSet>,
}

impl Ps4Machine {
    /// Create a new machine builder.
    pub fn builder() -> crate::builder::MachineBuilder {
        crate::builder::MachineBuilder::new()
    }

    pub(crate) fn new(
        cpu_count: u32,
        ram_size: u64,
        aeolia_config: AeoliaHubConfig,
        patches: Option<KernelPatchSet>,
    ) -> Result<Self> {
        let mut vm = hypervisor::create()?;

        // General RAM, exposed to the guest as two disjoint windows: the
        // low 2 GiB at address 0 and the remainder above 4 GiB.
        let ram = Arc::new(MemorySpace::new(ram_size)?);
        let ram_below = Arc::new(AliasSpace::new(ram.clone(), 0, RAM_BELOW_4G)?);
        let ram_above = Arc::new(AliasSpace::new(
            ram.clone(),
            RAM_BELOW_4G,
            ram_size - RAM_BELOW_4G,
        )?);

        // UBIOS area, directly below the 4 GiB boundary.
        let ubios = Arc::new(MemorySpace::new(UBIOS_SIZE)?);

        let mut mem = AddressSpace::new();
        mem.add_subspace(0, ram_below.clone())?;
        if ram_above.size() > 0 {
            mem.add_subspace(HIGH_RAM_BASE, ram_above.clone())?;
        }
        mem.add_subspace(UBIOS_BASE, ubios.clone())?;
        let mem = Arc::new(mem);

        vm.map_region(0, ram_below.size(), ram_below.as_ptr())?;
        if ram_above.size() > 0 {
            vm.map_region(HIGH_RAM_BASE, ram_above.size(), ram_above.as_ptr())?;
        }
        vm.map_region(UBIOS_BASE, ubios.size(), ubios.as_ptr())?;

        let cpus = (0..cpu_count).map(|i| X86Cpu::new(i, mem.clone())).collect();

        let liverpool = LiverpoolHost::new();
        let aeolia = AeoliaHub::new(aeolia_config)?;

        let mut machine = Self {
            aeolia,
            liverpool,
            cpus,
            vm,
            mem,
            ubios,
            ram,
            state: MachineState::Constructed,
            patches,
        };
        machine.wire_devices();

        debug!(cpu_count, ram_size, "machine constructed");
        Ok(machine)
    }

    /// Post-construction wiring between controllers.
    ///
    /// Cross-controller references are established here, by the machine,
    /// once every controller exists; controllers never reach into each
    /// other's internals. Currently the Aeolia PCIe glue receives the
    /// memory controller's scratchpad.
    fn wire_devices(&mut self) {
        let spm = self.aeolia.mem.scratchpad();
        self.aeolia.pcie.attach_scratchpad(spm);
        debug!("aeolia scratchpad wired into pcie glue");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// CPU units, in index order.
    pub fn cpus(&self) -> &[X86Cpu] {
        &self.cpus
    }

    /// The composed guest physical address space.
    pub fn memory(&self) -> &Arc<AddressSpace> {
        &self.mem
    }

    /// The general RAM store backing both aliased windows.
    pub fn ram(&self) -> &Arc<MemorySpace> {
        &self.ram
    }

    /// The UBIOS (boot ROM shadow) store.
    pub fn ubios(&self) -> &Arc<MemorySpace> {
        &self.ubios
    }

    /// The Aeolia hub.
    pub fn aeolia(&self) -> &AeoliaHub {
        &self.aeolia
    }

    /// The Liverpool host.
    pub fn liverpool(&self) -> &LiverpoolHost {
        &self.liverpool
    }

    /// Return the machine to its power-on state.
    ///
    /// CPU units and controllers are reset in place, not reconstructed;
    /// memory contents are left as-is.
    pub fn reset(&mut self) -> Result<()> {
        self.vm.reset()?;
        for cpu in &mut self.cpus {
            cpu.reset();
        }
        self.liverpool.reset();
        self.aeolia.reset();
        self.state = MachineState::Constructed;
        debug!("machine reset");
        Ok(())
    }

    /// Start CPU execution.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            MachineState::Constructed => {
                for cpu in &mut self.cpus {
                    cpu.set_running();
                }
                self.state = MachineState::Running;
                info!("machine started");
                Ok(())
            }
            _ => Err(Error::InvalidState {
                expected: MachineState::Constructed.to_string(),
                actual: self.state.to_string(),
            }),
        }
    }

    /// Boot a kernel out of a recovery image.
    ///
    /// Resets the machine, unwraps the nested container chain in `path`
    /// (archive, update package, core-OS archive, kernel SELF), loads the
    /// kernel's single loadable segment into RAM at its physical address
    /// and mirrors it into the UBIOS region, then writes the boot strap
    /// bytes. The machine is left constructed and ready for [`start`];
    /// CPU execution is not begun here.
    ///
    /// On failure the machine has been reset but memory contents are
    /// indeterminate; retry recovery before starting CPUs.
    ///
    /// [`start`]: Ps4Machine::start
    pub fn recover(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.state == MachineState::Running {
            return Err(Error::InvalidState {
                expected: MachineState::Constructed.to_string(),
                actual: self.state.to_string(),
            });
        }
        self.reset()?;

        info!(path = %path.display(), "recovering");
        if !path.exists() {
            return Err(Error::ImageNotFound(path.to_path_buf()));
        }

        // Unwrap the container chain down to the kernel image.
        let bls = BlsArchive::from_reader(File::open(path)?)?;
        let pup = PupPackage::parse(bls.get(UPDATE_PUP_NAME)?)?;
        let fw_version = pup.fw_version();
        debug!(version = %fw_version, "update package firmware revision");
        let coreos = BlsArchive::parse(pup.get(PUP_ENTRY_COREOS)?)?;
        let kernel = SelfImage::parse(coreos.get(KERNEL_SELF_NAME)?)?;

        // The kernel is expected to carry exactly one loadable segment.
        // Validate before touching memory so a bad image writes nothing.
        if kernel.phnum() != 1 {
            return Err(Error::SegmentCount(kernel.phnum()));
        }
        let phdr = kernel.phdr(0)?;
        if phdr.p_type != PT_LOAD {
            return Err(Error::SegmentType(phdr.p_type));
        }
        let segment = kernel.segment_data(0)?;
        debug!(
            paddr = phdr.p_paddr,
            len = segment.len(),
            "loading kernel segment"
        );

        // Kernel into RAM at its physical load address, and a ROM-shadow
        // mirror of it into the UBIOS region, truncated or zero-padded to
        // the region's capacity.
        self.mem.write(phdr.p_paddr, segment)?;
        let mirror_len = segment.len().min(UBIOS_SIZE as usize);
        self.mem.write(UBIOS_BASE, &segment[..mirror_len])?;
        if (mirror_len as u64) < UBIOS_SIZE {
            let pad = vec![0u8; (UBIOS_SIZE as usize) - mirror_len];
            self.mem.write(UBIOS_BASE + mirror_len as u64, &pad)?;
        }

        // Strapping values the kernel expects in the boot parameter block.
        for &(offset, value) in BOOT_STRAPS {
            self.mem.write(BOOT_PARAMS_BASE + offset, &[value])?;
        }
        self.mem
            .write(BOOT_PARAMS_BASE + KASLR_PREIMAGE_OFFSET, &KASLR_PREIMAGE)?;

        // Opt-in kernel patches, gated on the revision the image ships:
        // a set built for one revision never touches another.
        match self.patches.as_ref() {
            Some(set) if set.version() == fw_version => {
                info!(version = %set.version(), count = set.patches().len(), "applying kernel patches");
                for patch in set.patches() {
                    let addr = phdr.p_paddr + patch.offset;
                    match &patch.op {
                        PatchOp::Or32(mask) => {
                            let mut word = [0u8; 4];
                            self.mem.read(addr, &mut word)?;
                            let patched = u32::from_le_bytes(word) | mask;
                            self.mem.write(addr, &patched.to_le_bytes())?;
                        }
                        PatchOp::Write(bytes) => {
                            self.mem.write(addr, bytes)?;
                        }
                    }
                }
            }
            Some(set) => {
                warn!(
                    configured = %set.version(),
                    detected = %fw_version,
                    "skipping kernel patches built for a different revision"
                );
            }
            None => {}
        }

        info!("recovery complete");
        Ok(())
    }
}
