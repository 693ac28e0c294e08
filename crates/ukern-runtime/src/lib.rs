//! # ukern-runtime
//!
//! Platform-specific pieces of the ukern runtime. Currently that is the
//! page-granular mmap heap backing long-lived runtime objects; the
//! platform-neutral heaps and the queue live in `ukern-core`.

#![allow(dead_code)]

pub mod memory;

// Re-exports
pub use memory::PageHeap;
