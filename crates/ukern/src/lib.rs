//! # ukern - unikernel-style runtime core
//!
//! The concurrent backbone of a small execution runtime: a fixed-capacity,
//! allocator-backed queue handing machine words between threads and
//! interrupt-like contexts, with a lock-free MPMC protocol and a cheaper
//! SPSC fast path.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use ukern::{Heap, Queue, SystemHeap};
//!
//! let heap: Arc<dyn Heap> = Arc::new(SystemHeap::new());
//! let q = Queue::new(heap, 1024)?;
//!
//! assert!(q.enqueue(42));          // MPMC, false when full
//! assert_eq!(q.dequeue(), Some(42)); // MPMC, None when empty
//! ```
//!
//! ## Crates
//!
//! - `ukern-core` - queue, heap trait, platform-neutral heaps
//! - `ukern-runtime` - mmap-backed page heap
//!
//! Every operation completes or fails immediately; nothing here blocks,
//! parks, or yields. Retry and backoff are the caller's business.

pub use ukern_core::{
    env_get, env_get_bool, env_get_opt, set_log_level, Heap, KernError, KernResult, LeakyHeap,
    LogLevel, MemoryError, Queue, SpinLock, SystemHeap,
};

pub use ukern_core::constants;

pub use ukern_runtime::PageHeap;

pub use ukern_core::kprint;
pub use ukern_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};
