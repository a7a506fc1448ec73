//! Error types for ps4vm.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using ps4vm's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with an emulated machine.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("invalid memory size: {0:#x} bytes")]
    InvalidMemorySize(u64),

    #[error("invalid CPU count: {0} (must be > 0)")]
    InvalidCpuCount(u32),

    #[error("subspace at {base:#x}..{end:#x} overlaps an existing mapping")]
    Overlap { base: u64, end: u64 },

    #[error("alias window {offset:#x}+{len:#x} exceeds underlying space of {size:#x} bytes")]
    AliasWindow { offset: u64, len: u64, size: u64 },

    #[error("memory allocation failed: {0}")]
    MemoryAllocationFailed(String),

    // Per-access errors
    #[error("access at offset {offset:#x} (length {len:#x}) outside space of {size:#x} bytes")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("address {0:#x} not covered by any mapped subspace")]
    Unmapped(u64),

    #[error("write to read-only space at offset {0:#x}")]
    ReadOnly(u64),

    // Firmware extraction errors
    #[error("recovery image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("invalid {format} container: {reason}")]
    InvalidContainer {
        format: &'static str,
        reason: String,
    },

    #[error("archive entry not found: {0:?}")]
    EntryNotFound(String),

    #[error("update package entry not found: id {0:#x}")]
    PupEntryNotFound(u64),

    #[error("expected exactly one loadable segment, image has {0} program headers")]
    SegmentCount(usize),

    #[error("program header has type {0:#x}, expected PT_LOAD")]
    SegmentType(u32),

    // Lifecycle errors
    #[error("machine not in expected state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("hypervisor not available on this platform")]
    HypervisorNotAvailable,

    #[error("hypervisor error: {0}")]
    HypervisorError(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an extraction error for a malformed container.
    pub(crate) fn container(format: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidContainer {
            format,
            reason: reason.into(),
        }
    }
}
