//! Error types for the ukern runtime

use core::fmt;

/// Result type for runtime operations
pub type KernResult<T> = Result<T, KernError>;

/// Errors that can occur in runtime operations
///
/// Note that queue full/empty are NOT errors - they are ordinary
/// value-returns (`false` / `None`) expected in normal operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernError {
    /// Requested capacity was zero or otherwise unusable
    InvalidCapacity(usize),

    /// Memory allocation/mapping failed
    Memory(MemoryError),

    /// Platform-specific error (errno or equivalent)
    Platform(i32),
}

impl fmt::Display for KernError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernError::InvalidCapacity(n) => write!(f, "invalid capacity: {}", n),
            KernError::Memory(e) => write!(f, "memory error: {}", e),
            KernError::Platform(code) => write!(f, "platform error: {}", code),
        }
    }
}

impl std::error::Error for KernError {}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Backing heap returned no memory
    AllocationFailed,

    /// mmap failed
    MapFailed,

    /// munmap failed
    UnmapFailed,

    /// Size overflowed when computing a layout
    SizeOverflow,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "allocation failed"),
            MemoryError::MapFailed => write!(f, "memory map failed"),
            MemoryError::UnmapFailed => write!(f, "memory unmap failed"),
            MemoryError::SizeOverflow => write!(f, "size overflow"),
        }
    }
}

impl From<MemoryError> for KernError {
    fn from(e: MemoryError) -> Self {
        KernError::Memory(e)
    }
}
