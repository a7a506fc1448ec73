//! Firmware container formats.
//!
//! A recovery image nests its kernel four containers deep: an SLB2 archive
//! holds the update package, the update package holds a core-OS blob, that
//! blob is another SLB2 archive, and the kernel inside it is wrapped in a
//! SELF envelope around a plain ELF image. Each format here implements only
//! the extraction contract the recovery pipeline consumes: open a container,
//! look up one entry, get its bytes.

pub mod bls;
pub mod boot;
pub mod pup;
pub mod self_image;

pub use bls::BlsArchive;
pub use boot::{FirmwareVersion, KernelPatch, KernelPatchSet, PatchOp};
pub use pup::PupPackage;
pub use self_image::{ProgramHeader, SelfImage};

/// Little-endian field reads with truncation checks.
pub(crate) mod bytes {
    pub fn u16_at(data: &[u8], off: usize) -> Option<u16> {
        let b = data.get(off..off + 2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_at(data: &[u8], off: usize) -> Option<u32> {
        let b = data.get(off..off + 4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64_at(data: &[u8], off: usize) -> Option<u64> {
        let b = data.get(off..off + 8)?;
        Some(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Builders for synthetic recovery images.

    use super::bls::{BLS_BLOCK_SIZE, BLS_ENTRY_SIZE, BLS_HEADER_SIZE, BLS_MAGIC};
    use super::boot::FirmwareVersion;
    use super::pup::{PUP_ENTRY_SIZE, PUP_HEADER_SIZE, PUP_MAGIC};
    use super::self_image::{SELF_ENTRY_SIZE, SELF_HEADER_SIZE, SELF_MAGIC};

    /// Build an SLB2 archive holding the given named entries.
    pub fn build_bls(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let table_len = BLS_HEADER_SIZE + entries.len() * BLS_ENTRY_SIZE;
        let mut data_block = table_len.div_ceil(BLS_BLOCK_SIZE);

        let mut header = Vec::new();
        header.extend_from_slice(&BLS_MAGIC);
        header.extend_from_slice(&1u32.to_le_bytes()); // version
        header.extend_from_slice(&0u32.to_le_bytes()); // flags
        header.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes()); // block_count, fixed up below
        header.extend_from_slice(&[0u8; 12]);
        assert_eq!(header.len(), BLS_HEADER_SIZE);

        let mut payload = Vec::new();
        for (name, bytes) in entries {
            header.extend_from_slice(&(data_block as u32).to_le_bytes());
            header.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            header.extend_from_slice(&[0u8; 8]);
            let mut name_buf = [0u8; 32];
            name_buf[..name.len()].copy_from_slice(name.as_bytes());
            header.extend_from_slice(&name_buf);

            payload.extend_from_slice(bytes);
            // Entries start on block boundaries.
            let blocks = bytes.len().div_ceil(BLS_BLOCK_SIZE);
            payload.resize(payload.len().next_multiple_of(BLS_BLOCK_SIZE), 0);
            data_block += blocks;
        }

        let mut out = header;
        out.resize(out.len().next_multiple_of(BLS_BLOCK_SIZE), 0);
        out.extend_from_slice(&payload);
        let total_blocks = (out.len() / BLS_BLOCK_SIZE) as u32;
        out[16..20].copy_from_slice(&total_blocks.to_le_bytes());
        out
    }

    /// Build an update package shipping firmware revision 5.00.
    pub fn build_pup(entries: &[(u64, &[u8])]) -> Vec<u8> {
        build_pup_with_version(FirmwareVersion::V5_00, entries)
    }

    /// Build an update package holding the given (id, bytes) entries.
    pub fn build_pup_with_version(fw: FirmwareVersion, entries: &[(u64, &[u8])]) -> Vec<u8> {
        let data_start = PUP_HEADER_SIZE + entries.len() * PUP_ENTRY_SIZE;

        let mut out = Vec::new();
        out.extend_from_slice(&PUP_MAGIC.to_le_bytes());
        out.push(1); // version
        out.push(0); // mode
        out.push(1); // endian: little
        out.push(0); // attr
        out.extend_from_slice(&4u16.to_le_bytes()); // content: update package
        out.extend_from_slice(&(data_start as u16).to_le_bytes()); // header_size
        out.extend_from_slice(&0u64.to_le_bytes()); // file_size, unused here
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.push(fw.major);
        out.push(fw.minor);
        out.extend_from_slice(&[0u8; 8]);
        assert_eq!(out.len(), PUP_HEADER_SIZE);

        let mut offset = data_start as u64;
        for (id, bytes) in entries {
            out.extend_from_slice(&(id << 20).to_le_bytes()); // flags, plain entry
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
            out.extend_from_slice(&(bytes.len() as u64).to_le_bytes()); // memory_size
            offset += bytes.len() as u64;
        }
        for (_, bytes) in entries {
            out.extend_from_slice(bytes);
        }
        out
    }

    /// Build a fake-SELF wrapping an ELF64 with one segment per entry.
    pub fn build_self(segments: &[(u64, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&SELF_MAGIC.to_le_bytes());
        out.push(1); // version
        out.push(0); // mode
        out.push(1); // endian: little
        out.push(0); // attr
        out.extend_from_slice(&1u16.to_le_bytes()); // content: SELF
        out.extend_from_slice(&(SELF_HEADER_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&(segments.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 10]);
        assert_eq!(out.len(), SELF_HEADER_SIZE);

        // One wrapper entry per segment; the pipeline reads the embedded
        // ELF, so only the count has to line up.
        for _ in segments {
            out.extend_from_slice(&[0u8; SELF_ENTRY_SIZE]);
        }

        out.extend_from_slice(&build_elf(segments));
        out
    }

    /// Build a minimal ELF64 image with PT_LOAD segments.
    pub fn build_elf(segments: &[(u64, &[u8])]) -> Vec<u8> {
        const EHDR_SIZE: usize = 0x40;
        const PHDR_SIZE: usize = 0x38;

        let mut elf = vec![0u8; EHDR_SIZE];
        elf[0..4].copy_from_slice(b"\x7fELF");
        elf[4] = 2; // ELFCLASS64
        elf[5] = 1; // ELFDATA2LSB
        elf[6] = 1; // EV_CURRENT
        elf[0x10..0x12].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        elf[0x12..0x14].copy_from_slice(&0x3eu16.to_le_bytes()); // EM_X86_64
        elf[0x20..0x28].copy_from_slice(&(EHDR_SIZE as u64).to_le_bytes()); // e_phoff
        elf[0x36..0x38].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        elf[0x38..0x3a].copy_from_slice(&(segments.len() as u16).to_le_bytes());

        let mut offset = (EHDR_SIZE + segments.len() * PHDR_SIZE) as u64;
        for (paddr, bytes) in segments {
            let mut phdr = vec![0u8; PHDR_SIZE];
            phdr[0..4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
            phdr[4..8].copy_from_slice(&7u32.to_le_bytes()); // RWX
            phdr[8..16].copy_from_slice(&offset.to_le_bytes());
            phdr[16..24].copy_from_slice(&paddr.to_le_bytes()); // p_vaddr
            phdr[24..32].copy_from_slice(&paddr.to_le_bytes()); // p_paddr
            phdr[32..40].copy_from_slice(&(bytes.len() as u64).to_le_bytes());
            phdr[40..48].copy_from_slice(&(bytes.len() as u64).to_le_bytes());
            elf.extend_from_slice(&phdr);
            offset += bytes.len() as u64;
        }
        for (_, bytes) in segments {
            elf.extend_from_slice(bytes);
        }
        elf
    }
}
