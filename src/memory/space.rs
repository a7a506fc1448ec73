//! Memory spaces: owned stores and aliased views.

use std::sync::Arc;

use bitflags::bitflags;

use crate::error::{Error, Result};

bitflags! {
    /// Access flags for a memory space.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpaceFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const RW = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Byte-addressable storage visible to CPUs and DMA-capable controllers.
///
/// Accesses take `&self`: once the machine is running, multiple CPU threads
/// and controllers issue reads and writes concurrently. Byte-range copies on
/// disjoint ranges are safe; callers that need atomicity across overlapping
/// ranges must coordinate at a higher level.
pub trait Space: Send + Sync {
    /// Size of the space in bytes.
    fn size(&self) -> u64;

    /// Read `buf.len()` bytes starting at `offset`.
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `offset`.
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;
}

/// Validate an `(offset, len)` range against a space of `size` bytes.
fn check_range(offset: u64, len: usize, size: u64) -> Result<usize> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(offset as usize),
        _ => Err(Error::OutOfBounds {
            offset,
            len: len as u64,
            size,
        }),
    }
}

/// Contiguous backing allocation for a [`MemorySpace`].
///
/// The allocation is page-aligned, zero-initialized anonymous memory so a
/// multi-gigabyte RAM store stays lazily committed until touched.
struct Backing {
    ptr: *mut u8,
    size: usize,
}

// Safety: Backing owns its allocation for its whole lifetime and all access
// goes through bounds-checked byte copies. Concurrent access to disjoint
// ranges is safe; overlapping access is the caller's coordination problem.
unsafe impl Send for Backing {}
unsafe impl Sync for Backing {}

impl Backing {
    fn new(size: u64) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidMemorySize(size));
        }
        let size = size as usize;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::MemoryAllocationFailed(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size,
        })
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

/// A memory space that owns its backing store.
pub struct MemorySpace {
    backing: Backing,
    flags: SpaceFlags,
}

impl MemorySpace {
    /// Allocate a read-write memory space of `size` bytes.
    pub fn new(size: u64) -> Result<Self> {
        Self::with_flags(size, SpaceFlags::RW)
    }

    /// Allocate a memory space with explicit access flags.
    pub fn with_flags(size: u64, flags: SpaceFlags) -> Result<Self> {
        Ok(Self {
            backing: Backing::new(size)?,
            flags,
        })
    }

    /// Access flags of this space.
    pub fn flags(&self) -> SpaceFlags {
        self.flags
    }

    /// Raw pointer to the backing store.
    ///
    /// Privileged accessor for the recovery pipeline and for mapping the
    /// store into the hypervisor. The pointer is valid for the lifetime of
    /// the space.
    pub fn as_ptr(&self) -> *mut u8 {
        self.backing.ptr
    }
}

impl Space for MemorySpace {
    fn size(&self) -> u64 {
        self.backing.size as u64
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let offset = check_range(offset, buf.len(), self.size())?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.backing.ptr.add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.flags.contains(SpaceFlags::WRITE) {
            return Err(Error::ReadOnly(offset));
        }
        let offset = check_range(offset, data.len(), self.size())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.backing.ptr.add(offset), data.len());
        }
        Ok(())
    }
}

/// A bounded window onto another memory space.
///
/// An alias never allocates storage; reads and writes translate the offset
/// and pass through to the underlying store. Holding the underlying space
/// by `Arc` means an alias cannot outlive its store.
pub struct AliasSpace {
    underlying: Arc<MemorySpace>,
    offset: u64,
    len: u64,
}

impl AliasSpace {
    /// Create a window of `len` bytes at `offset` into `underlying`.
    pub fn new(underlying: Arc<MemorySpace>, offset: u64, len: u64) -> Result<Self> {
        match offset.checked_add(len) {
            Some(end) if end <= underlying.size() => Ok(Self {
                underlying,
                offset,
                len,
            }),
            _ => Err(Error::AliasWindow {
                offset,
                len,
                size: underlying.size(),
            }),
        }
    }

    /// Raw pointer into the underlying store at the window offset.
    pub fn as_ptr(&self) -> *mut u8 {
        // The window was validated against the underlying size at creation.
        unsafe { self.underlying.as_ptr().add(self.offset as usize) }
    }
}

impl Space for AliasSpace {
    fn size(&self) -> u64 {
        self.len
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;
        self.underlying.read(self.offset + offset, buf)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_range(offset, data.len(), self.len)?;
        self.underlying.write(self.offset + offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_round_trip() {
        let mem = MemorySpace::new(4096).unwrap();
        let data = b"Hello, PS4!";
        mem.write(128, data).unwrap();

        let mut buf = [0u8; 11];
        mem.read(128, &mut buf).unwrap();
        assert_eq!(&buf, data);
    }

    #[test]
    fn test_space_zero_initialized() {
        let mem = MemorySpace::new(4096).unwrap();
        let mut buf = [0xAAu8; 64];
        mem.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_space_bounds() {
        let mem = MemorySpace::new(4096).unwrap();
        assert!(matches!(
            mem.read(4090, &mut [0u8; 16]),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            mem.write(4096, &[0u8; 1]),
            Err(Error::OutOfBounds { .. })
        ));
        // Offset arithmetic must not wrap.
        assert!(matches!(
            mem.read(u64::MAX, &mut [0u8; 2]),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_read_only_space() {
        let mem = MemorySpace::with_flags(4096, SpaceFlags::READ).unwrap();
        assert!(matches!(mem.write(0, &[1, 2, 3]), Err(Error::ReadOnly(0))));
        mem.read(0, &mut [0u8; 4]).unwrap();
    }

    #[test]
    fn test_alias_translates_offsets() {
        let mem = Arc::new(MemorySpace::new(4096).unwrap());
        let alias = AliasSpace::new(mem.clone(), 1024, 512).unwrap();

        alias.write(16, b"windowed").unwrap();

        let mut buf = [0u8; 8];
        mem.read(1024 + 16, &mut buf).unwrap();
        assert_eq!(&buf, b"windowed");
    }

    #[test]
    fn test_alias_bounded_by_window() {
        let mem = Arc::new(MemorySpace::new(4096).unwrap());
        let alias = AliasSpace::new(mem, 1024, 512).unwrap();
        assert_eq!(alias.size(), 512);
        assert!(matches!(
            alias.write(508, &[0u8; 8]),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_alias_window_validation() {
        let mem = Arc::new(MemorySpace::new(4096).unwrap());
        assert!(matches!(
            AliasSpace::new(mem, 4000, 512),
            Err(Error::AliasWindow { .. })
        ));
    }

    #[test]
    fn test_two_aliases_share_one_store() {
        let mem = Arc::new(MemorySpace::new(8192).unwrap());
        let low = AliasSpace::new(mem.clone(), 0, 4096).unwrap();
        let high = AliasSpace::new(mem.clone(), 4096, 4096).unwrap();

        low.write(0, b"low").unwrap();
        high.write(0, b"high").unwrap();

        let mut buf = [0u8; 4];
        mem.read(4096, &mut buf).unwrap();
        assert_eq!(&buf, b"high");
        assert_eq!(unsafe { *high.as_ptr() }, b'h');
    }
}
