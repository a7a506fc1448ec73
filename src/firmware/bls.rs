//! SLB2 archive container.
//!
//! The outermost layer of a recovery image: a block-oriented archive with
//! a fixed entry table addressing named payloads at 512-byte block
//! granularity.
//!
//! ## Layout
//!
//! | Offset | Field       | Description                 |
//! |--------|-------------|-----------------------------|
//! | 0x00   | magic       | `"SLB2"`                    |
//! | 0x04   | version     | format version              |
//! | 0x08   | flags       | reserved                    |
//! | 0x0C   | entry_count | number of entries           |
//! | 0x10   | block_count | total file size in blocks   |
//! | 0x20   | entries     | 0x30 bytes each             |
//!
//! Each entry: block offset (u32), file size (u32), 8 reserved bytes, and
//! a NUL-padded 32-byte name.

use std::io::Read;

use crate::error::{Error, Result};
use crate::firmware::bytes::u32_at;

pub const BLS_MAGIC: [u8; 4] = *b"SLB2";
pub const BLS_BLOCK_SIZE: usize = 512;
pub const BLS_HEADER_SIZE: usize = 0x20;
pub const BLS_ENTRY_SIZE: usize = 0x30;

struct BlsEntry {
    name: String,
    offset: usize,
    size: usize,
}

/// A parsed SLB2 archive.
pub struct BlsArchive {
    data: Vec<u8>,
    entries: Vec<BlsEntry>,
}

impl BlsArchive {
    /// Read and parse an archive from `reader`.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::parse(data)
    }

    /// Parse an archive held in memory.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let err = |reason: &str| Error::container("SLB2", reason);

        if data.len() < BLS_HEADER_SIZE {
            return Err(err("truncated header"));
        }
        if data[0..4] != BLS_MAGIC {
            return Err(err("bad magic"));
        }
        let entry_count = u32_at(&data, 0x0C).unwrap() as usize;

        let mut entries = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let base = BLS_HEADER_SIZE + i * BLS_ENTRY_SIZE;
            let block_offset = u32_at(&data, base).ok_or_else(|| err("truncated entry table"))?;
            let size = u32_at(&data, base + 4).ok_or_else(|| err("truncated entry table"))? as usize;
            let name_raw = data
                .get(base + 0x10..base + BLS_ENTRY_SIZE)
                .ok_or_else(|| err("truncated entry table"))?;
            let name_len = name_raw.iter().position(|&b| b == 0).unwrap_or(32);
            let name = String::from_utf8_lossy(&name_raw[..name_len]).into_owned();

            let offset = block_offset as usize * BLS_BLOCK_SIZE;
            if offset + size > data.len() {
                return Err(err("entry extends past end of archive"));
            }
            entries.push(BlsEntry { name, offset, size });
        }

        Ok(Self { data, entries })
    }

    /// Names of all entries, in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Get the bytes of the entry called `name`.
    pub fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| self.data[e.offset..e.offset + e.size].to_vec())
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }
}
