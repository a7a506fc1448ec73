//! Update package container.
//!
//! Distributes the firmware/OS bundle as a flat list of entries keyed by a
//! numeric identifier packed into the upper bits of each entry's flags
//! word. The header carries the firmware revision the bundle ships
//! (major at offset 0x16, minor at 0x17), which gates the kernel patch
//! policy. Entries may be compressed or split into blocks on real images;
//! this core only consumes the plain core-OS entry and rejects the rest.

use crate::error::{Error, Result};
use crate::firmware::boot::FirmwareVersion;
use crate::firmware::bytes::{u16_at, u32_at, u64_at};

pub const PUP_MAGIC: u32 = 0x1D3D_154F;
pub const PUP_HEADER_SIZE: usize = 0x20;
pub const PUP_ENTRY_SIZE: usize = 0x20;

/// Entry flag bit: payload is compressed.
const ENTRY_COMPRESSED: u64 = 0x8;
/// Entry flag bit: payload is split into hashed blocks.
const ENTRY_BLOCKED: u64 = 0x800;

struct PupEntry {
    flags: u64,
    offset: u64,
    size: u64,
}

impl PupEntry {
    fn id(&self) -> u64 {
        self.flags >> 20
    }
}

/// A parsed update package.
pub struct PupPackage {
    data: Vec<u8>,
    fw_version: FirmwareVersion,
    entries: Vec<PupEntry>,
}

impl PupPackage {
    /// Parse a package held in memory.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let err = |reason: &str| Error::container("PUP", reason);

        if data.len() < PUP_HEADER_SIZE {
            return Err(err("truncated header"));
        }
        if u32_at(&data, 0).unwrap() != PUP_MAGIC {
            return Err(err("bad magic"));
        }
        let entry_count = u16_at(&data, 0x14).unwrap() as usize;
        let fw_version = FirmwareVersion::new(data[0x16], data[0x17]);

        let mut entries = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let base = PUP_HEADER_SIZE + i * PUP_ENTRY_SIZE;
            let flags = u64_at(&data, base).ok_or_else(|| err("truncated entry table"))?;
            let offset = u64_at(&data, base + 8).ok_or_else(|| err("truncated entry table"))?;
            let size = u64_at(&data, base + 16).ok_or_else(|| err("truncated entry table"))?;

            if offset.checked_add(size).is_none_or(|end| end > data.len() as u64) {
                return Err(err("entry extends past end of package"));
            }
            entries.push(PupEntry { flags, offset, size });
        }

        Ok(Self {
            data,
            fw_version,
            entries,
        })
    }

    /// The firmware revision this bundle ships.
    pub fn fw_version(&self) -> FirmwareVersion {
        self.fw_version
    }

    /// Entry identifiers, in table order.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|e| e.id())
    }

    /// Get the bytes of the entry with identifier `id`.
    pub fn get(&self, id: u64) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id() == id)
            .ok_or(Error::PupEntryNotFound(id))?;

        if entry.flags & (ENTRY_COMPRESSED | ENTRY_BLOCKED) != 0 {
            return Err(Error::container(
                "PUP",
                format!("entry {id:#x} is compressed or blocked"),
            ));
        }

        let offset = entry.offset as usize;
        Ok(self.data[offset..offset + entry.size as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::testutil::{build_pup, build_pup_with_version};

    #[test]
    fn test_get_by_id() {
        let data = build_pup(&[(0x3, b"three"), (0x5, b"coreos")]);
        let pup = PupPackage::parse(data).unwrap();

        assert_eq!(pup.ids().collect::<Vec<_>>(), [0x3, 0x5]);
        assert_eq!(pup.get(0x5).unwrap(), b"coreos");
    }

    #[test]
    fn test_firmware_revision() {
        let data = build_pup_with_version(FirmwareVersion::new(4, 55), &[(0x5, b"coreos")]);
        let pup = PupPackage::parse(data).unwrap();
        assert_eq!(pup.fw_version(), FirmwareVersion::new(4, 55));

        let data = build_pup(&[(0x5, b"coreos")]);
        let pup = PupPackage::parse(data).unwrap();
        assert_eq!(pup.fw_version(), FirmwareVersion::V5_00);
    }

    #[test]
    fn test_missing_id() {
        let data = build_pup(&[(0x3, b"three")]);
        let pup = PupPackage::parse(data).unwrap();
        assert!(matches!(pup.get(0x5), Err(Error::PupEntryNotFound(0x5))));
    }

    #[test]
    fn test_compressed_entry_rejected() {
        let mut data = build_pup(&[(0x5, b"coreos")]);
        // Set the compression bit in the first entry's flags.
        data[PUP_HEADER_SIZE] |= ENTRY_COMPRESSED as u8;
        let pup = PupPackage::parse(data).unwrap();
        assert!(matches!(pup.get(0x5), Err(Error::InvalidContainer { .. })));
    }

    #[test]
    fn test_bad_magic_and_truncation() {
        let mut data = build_pup(&[(0x5, b"coreos")]);
        data[3] = 0;
        assert!(PupPackage::parse(data).is_err());

        let mut data = build_pup(&[(0x5, b"coreos")]);
        data.truncate(data.len() - 3);
        assert!(PupPackage::parse(data).is_err());
    }
}
