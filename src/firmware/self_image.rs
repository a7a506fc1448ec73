//! Signed-executable (SELF) container.
//!
//! A SELF wraps a standard ELF image in a signature envelope. This core
//! consumes the unsigned "fake SELF" maintenance form: the envelope is a
//! plain header plus one wrapper entry per segment, followed by the
//! unencrypted ELF image. Signature validation is bypassed by contract;
//! the parser exposes the embedded ELF's program headers and segment
//! bytes.

use crate::error::{Error, Result};
use crate::firmware::bytes::{u16_at, u32_at, u64_at};

pub const SELF_MAGIC: u32 = 0x1D3D_154F;
pub const SELF_HEADER_SIZE: usize = 0x20;
pub const SELF_ENTRY_SIZE: usize = 0x20;

/// ELF segment type for loadable segments.
pub const PT_LOAD: u32 = 1;

const EHDR_SIZE: usize = 0x40;

/// One ELF program header of the embedded image.
#[derive(Debug, Clone, Copy)]
pub struct ProgramHeader {
    /// Segment type (`PT_LOAD` for loadable segments).
    pub p_type: u32,
    /// Offset of the segment bytes within the ELF image.
    pub p_offset: u64,
    /// Physical load address.
    pub p_paddr: u64,
    /// Size of the segment bytes in the file.
    pub p_filesz: u64,
    /// Size of the segment in memory.
    pub p_memsz: u64,
}

/// A parsed fake-SELF image.
pub struct SelfImage {
    /// The embedded ELF image.
    elf: Vec<u8>,
    phoff: u64,
    phentsize: u16,
    phnum: u16,
}

impl SelfImage {
    /// Parse a fake-SELF held in memory.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let err = |reason: &str| Error::container("SELF", reason);

        if data.len() < SELF_HEADER_SIZE {
            return Err(err("truncated header"));
        }
        if u32_at(&data, 0).unwrap() != SELF_MAGIC {
            return Err(err("bad magic"));
        }
        let num_entries = u16_at(&data, 0x14).unwrap() as usize;

        let elf_start = SELF_HEADER_SIZE + num_entries * SELF_ENTRY_SIZE;
        if data.len() < elf_start + EHDR_SIZE {
            return Err(err("truncated envelope"));
        }
        let elf = data[elf_start..].to_vec();

        if elf[0..4] != *b"\x7fELF" {
            return Err(err("embedded image is not ELF"));
        }
        if elf[4] != 2 || elf[5] != 1 {
            return Err(err("embedded image is not little-endian ELF64"));
        }

        let phoff = u64_at(&elf, 0x20).ok_or_else(|| err("truncated ELF header"))?;
        let phentsize = u16_at(&elf, 0x36).unwrap();
        let phnum = u16_at(&elf, 0x38).unwrap();

        if phnum > 0 && (phentsize as usize) < 0x38 {
            return Err(err("bad program header entry size"));
        }

        let table_end = phoff
            .checked_add(phnum as u64 * phentsize as u64)
            .ok_or_else(|| err("bad program header table"))?;
        if table_end > elf.len() as u64 {
            return Err(err("program header table extends past end of image"));
        }

        Ok(Self {
            elf,
            phoff,
            phentsize,
            phnum,
        })
    }

    /// Number of program headers in the embedded image.
    pub fn phnum(&self) -> usize {
        self.phnum as usize
    }

    /// Get program header `i`.
    pub fn phdr(&self, i: usize) -> Result<ProgramHeader> {
        if i >= self.phnum as usize {
            return Err(Error::container("SELF", format!("no program header {i}")));
        }
        let base = self.phoff as usize + i * self.phentsize as usize;
        Ok(ProgramHeader {
            p_type: u32_at(&self.elf, base).unwrap(),
            p_offset: u64_at(&self.elf, base + 0x08).unwrap(),
            p_paddr: u64_at(&self.elf, base + 0x18).unwrap(),
            p_filesz: u64_at(&self.elf, base + 0x20).unwrap(),
            p_memsz: u64_at(&self.elf, base + 0x28).unwrap(),
        })
    }

    /// Get the raw bytes of segment `i`.
    pub fn segment_data(&self, i: usize) -> Result<&[u8]> {
        let phdr = self.phdr(i)?;
        let start = phdr.p_offset as usize;
        self.elf
            .get(start..start + phdr.p_filesz as usize)
            .ok_or_else(|| Error::container("SELF", format!("segment {i} extends past end of image")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::testutil::build_self;

    #[test]
    fn test_single_segment() {
        let data = build_self(&[(0x20_0000, b"kernel bytes")]);
        let image = SelfImage::parse(data).unwrap();

        assert_eq!(image.phnum(), 1);
        let phdr = image.phdr(0).unwrap();
        assert_eq!(phdr.p_type, PT_LOAD);
        assert_eq!(phdr.p_paddr, 0x20_0000);
        assert_eq!(phdr.p_filesz, 12);
        assert_eq!(image.segment_data(0).unwrap(), b"kernel bytes");
    }

    #[test]
    fn test_multiple_segments_visible() {
        let data = build_self(&[(0x1000, b"one"), (0x2000, b"two")]);
        let image = SelfImage::parse(data).unwrap();
        assert_eq!(image.phnum(), 2);
        assert_eq!(image.segment_data(1).unwrap(), b"two");
    }

    #[test]
    fn test_bad_magic() {
        let mut data = build_self(&[(0x1000, b"seg")]);
        data[0] = 0;
        assert!(matches!(
            SelfImage::parse(data),
            Err(Error::InvalidContainer { format: "SELF", .. })
        ));
    }

    #[test]
    fn test_non_elf_payload() {
        let mut data = build_self(&[(0x1000, b"seg")]);
        let elf_start = SELF_HEADER_SIZE + SELF_ENTRY_SIZE;
        data[elf_start] = 0;
        assert!(SelfImage::parse(data).is_err());
    }

    #[test]
    fn test_phdr_out_of_range() {
        let data = build_self(&[(0x1000, b"seg")]);
        let image = SelfImage::parse(data).unwrap();
        assert!(image.phdr(1).is_err());
    }
}
