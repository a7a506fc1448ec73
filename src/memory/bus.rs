//! Top-level address space composition.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::memory::Space;

struct Subspace {
    base: u64,
    span: u64,
    space: Arc<dyn Space>,
}

impl Subspace {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + self.span
    }
}

/// A composed guest physical address space.
///
/// Routes any access to the registered subspace covering the address and
/// delegates at a translated local offset. Subspaces are registered during
/// machine construction and the map is immutable afterward; the registered
/// spans never overlap.
///
/// An access must fall entirely within one subspace. Firmware and devices
/// are expected to issue single-region-bounded accesses; an access crossing
/// a region boundary fails with a range error from the child space.
#[derive(Default)]
pub struct AddressSpace {
    // Sorted by base address.
    subspaces: Vec<Subspace>,
}

impl AddressSpace {
    /// Create an empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `space` at `base`. Construction-time only.
    ///
    /// Fails with a configuration error if the new span overlaps any
    /// registered span.
    pub fn add_subspace(&mut self, base: u64, space: Arc<dyn Space>) -> Result<()> {
        let span = space.size();
        let end = base
            .checked_add(span)
            .ok_or(Error::Overlap { base, end: u64::MAX })?;

        let idx = self.subspaces.partition_point(|s| s.base < base);
        if let Some(prev) = idx.checked_sub(1).and_then(|i| self.subspaces.get(i)) {
            if prev.base + prev.span > base {
                return Err(Error::Overlap { base, end });
            }
        }
        if let Some(next) = self.subspaces.get(idx) {
            if end > next.base {
                return Err(Error::Overlap { base, end });
            }
        }

        self.subspaces.insert(idx, Subspace { base, span, space });
        Ok(())
    }

    /// Find the subspace covering `addr`.
    fn route(&self, addr: u64) -> Result<&Subspace> {
        let idx = self.subspaces.partition_point(|s| s.base <= addr);
        idx.checked_sub(1)
            .map(|i| &self.subspaces[i])
            .filter(|s| s.contains(addr))
            .ok_or(Error::Unmapped(addr))
    }

    /// Read `buf.len()` bytes starting at guest physical address `addr`.
    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let sub = self.route(addr)?;
        sub.space.read(addr - sub.base, buf)
    }

    /// Write `data` starting at guest physical address `addr`.
    pub fn write(&self, addr: u64, data: &[u8]) -> Result<()> {
        let sub = self.route(addr)?;
        sub.space.write(addr - sub.base, data)
    }
}
