//! Boot contract constants and the kernel patch policy.
//!
//! The guest kernel expects a block of hardware identification and
//! configuration bytes at a fixed RAM offset before it boots. These are
//! constants of the platform's boot contract, not derived from the loaded
//! image; a different firmware revision would supply a different table.

/// Archive entry holding the update package inside a recovery image.
pub const UPDATE_PUP_NAME: &str = "PS4UPDATE1.PUP";

/// Update-package entry identifier of the core-OS payload.
pub const PUP_ENTRY_COREOS: u64 = 0x5;

/// Core-OS archive entry holding the kernel SELF.
pub const KERNEL_SELF_NAME: &str = "80010002";

/// Strapping bytes the kernel reads from the boot parameter block,
/// as (offset, value) pairs relative to [`BOOT_PARAMS_BASE`].
///
/// [`BOOT_PARAMS_BASE`]: crate::memory::layout::BOOT_PARAMS_BASE
pub const BOOT_STRAPS: &[(u64, u8)] = &[
    // Security processor firmware version.
    (0x000, 0x06),
    // sceSblRcMgrIsAllowSLDebugger
    (0x006, 0x04),
    (0x009, 0x02),
    // Read by the sceSblAIMgrIs* platform checks; always 0x01.
    (0x00C, 0x01),
    // Target ID.
    (0x00D, 0x82),
    // Security processor identification tag.
    (0x1C8, b'W'),
    (0x1C9, b'5'),
    (0x1CA, b'C'),
    (0x1CB, b'2'),
    (0x1CC, b'1'),
];

/// Offset of the address-randomization preimage within the boot parameter
/// block.
pub const KASLR_PREIMAGE_OFFSET: u64 = 0x160;

/// Preimage that defeats the kernel's address-randomization self-check.
pub const KASLR_PREIMAGE: [u8; 20] = {
    let mut block = [0u8; 20];
    block[0] = 0xF8;
    block[1] = 0x6F;
    block
};

/// A firmware revision the patch policy can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    pub const V5_00: FirmwareVersion = FirmwareVersion { major: 5, minor: 0 };

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// One byte-level edit applied to the loaded kernel image.
#[derive(Debug, Clone)]
pub struct KernelPatch {
    /// Offset relative to the kernel's physical load address.
    pub offset: u64,
    pub op: PatchOp,
}

/// The edit a [`KernelPatch`] performs.
#[derive(Debug, Clone)]
pub enum PatchOp {
    /// OR a mask into a little-endian u32.
    Or32(u32),
    /// Overwrite bytes.
    Write(Vec<u8>),
}

/// An ordered, revision-specific set of kernel patches.
///
/// Patches are opt-in maintenance hooks; none are applied unless a set is
/// handed to the machine builder, and a set only applies to the revision
/// it was built for.
#[derive(Debug, Clone)]
pub struct KernelPatchSet {
    version: FirmwareVersion,
    patches: Vec<KernelPatch>,
}

impl KernelPatchSet {
    /// The built-in patches known for `version`.
    ///
    /// Revisions without known patches yield an empty set.
    pub fn for_version(version: FirmwareVersion) -> Self {
        let patches = match version {
            // boothowto: enable boot verbosity.
            FirmwareVersion::V5_00 => vec![KernelPatch {
                offset: 0x3B_341E,
                op: PatchOp::Or32(0x800),
            }],
            _ => Vec::new(),
        };
        Self { version, patches }
    }

    /// A custom patch set for `version`.
    pub fn new(version: FirmwareVersion, patches: Vec<KernelPatch>) -> Self {
        Self { version, patches }
    }

    pub fn version(&self) -> FirmwareVersion {
        self.version
    }

    pub fn patches(&self) -> &[KernelPatch] {
        &self.patches
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_patch_revisions() {
        let set = KernelPatchSet::for_version(FirmwareVersion::V5_00);
        assert_eq!(set.patches().len(), 1);
        assert_eq!(set.patches()[0].offset, 0x3B_341E);

        let set = KernelPatchSet::for_version(FirmwareVersion::new(4, 55));
        assert!(set.is_empty());
    }

    #[test]
    fn test_preimage_layout() {
        assert_eq!(KASLR_PREIMAGE[..2], [0xF8, 0x6F]);
        assert!(KASLR_PREIMAGE[2..].iter().all(|&b| b == 0));
    }
}
