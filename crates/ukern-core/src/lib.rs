//! # ukern-core
//!
//! Core types for the ukern runtime kernel/userspace boundary.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Platform heaps (mmap-backed page heap) live in `ukern-runtime`.
//!
//! ## Modules
//!
//! - `heap` - Allocator handle trait and platform-neutral heaps
//! - `queue` - Lock-free bounded MPMC/SPSC queue (work handoff backbone)
//! - `error` - Error types
//! - `spinlock` - Internal spinlock primitive
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

#![allow(dead_code)]

pub mod heap;
pub mod queue;
pub mod error;
pub mod spinlock;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use heap::{Heap, SystemHeap, LeakyHeap};
pub use queue::Queue;
pub use error::{KernError, KernResult, MemoryError};
pub use spinlock::SpinLock;
pub use kprint::{LogLevel, set_log_level};
pub use env::{env_get, env_get_bool, env_get_opt};

/// Constants shared across the runtime
pub mod constants {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "aarch64")] {
            /// Cache line size for alignment of contended atomics
            /// (aarch64 prefetches line pairs)
            pub const CACHE_LINE_SIZE: usize = 128;
        } else {
            /// Cache line size for alignment of contended atomics
            pub const CACHE_LINE_SIZE: usize = 64;
        }
    }

    /// Default queue capacity used by the cmd tools when none is given
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

    /// Fallback page size when a heap has no better answer
    pub const DEFAULT_PAGESIZE: usize = 4096;
}
