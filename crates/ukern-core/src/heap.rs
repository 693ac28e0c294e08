//! Allocator handle trait and platform-neutral heaps
//!
//! Runtime objects (the queue included) never call a global allocator
//! directly; they take a `Heap` handle at construction and return their
//! backing storage to the same handle at destruction. Platform heaps
//! (mmap-backed pages) live in `ukern-runtime`.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::Arc;

use crate::constants::{CACHE_LINE_SIZE, DEFAULT_PAGESIZE};
use crate::spinlock::SpinLock;

/// Allocation alignment every heap guarantees
pub const HEAP_ALIGN: usize = CACHE_LINE_SIZE;

/// An allocator handle
///
/// Contract: memory obtained from `allocate` is returned with `deallocate`
/// on the *same* heap, with the same size. Allocations are zeroed and
/// aligned to [`HEAP_ALIGN`].
pub trait Heap: Send + Sync {
    /// Allocate `size` bytes, or `None` if the heap is exhausted
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Return a block to the heap
    ///
    /// # Safety
    ///
    /// `ptr`/`size` must match a prior `allocate` on this heap, and the
    /// block must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize);

    /// Allocation granularity hint
    fn pagesize(&self) -> usize {
        DEFAULT_PAGESIZE
    }

    /// Bytes currently allocated from this heap
    fn allocated(&self) -> usize;
}

fn heap_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size, HEAP_ALIGN).ok()
}

/// Heap backed by the process allocator
///
/// The default collaborator for tests and tools; real deployments hand
/// objects a `PageHeap` or a `LeakyHeap` instead.
pub struct SystemHeap {
    allocated: AtomicUsize,
}

impl SystemHeap {
    pub const fn new() -> Self {
        SystemHeap {
            allocated: AtomicUsize::new(0),
        }
    }
}

impl Default for SystemHeap {
    fn default() -> Self {
        SystemHeap::new()
    }
}

impl Heap for SystemHeap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let layout = heap_layout(size)?;
        // Safety: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr)?;
        self.allocated.fetch_add(size, Ordering::Relaxed);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        let layout = match heap_layout(size) {
            Some(l) => l,
            None => return,
        };
        dealloc(ptr.as_ptr(), layout);
        self.allocated.fetch_sub(size, Ordering::Relaxed);
    }

    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// Default chunk size the leaky heap requests from its parent
const LEAKY_CHUNK_SIZE: usize = 64 * 1024;

struct LeakyState {
    /// Bump cursor into the current chunk (null when no chunk yet)
    cursor: *mut u8,

    /// Bytes left in the current chunk
    remaining: usize,

    /// All chunks taken from the parent, for return on drop
    chunks: Vec<(*mut u8, usize)>,
}

/// Bump heap over a parent heap
///
/// `allocate` bumps a cursor; `deallocate` only adjusts accounting - the
/// bytes are reclaimed when the whole heap is dropped and its chunks go
/// back to the parent. Intended for transient object graphs torn down in
/// one step.
pub struct LeakyHeap {
    parent: Arc<dyn Heap>,
    chunk_size: usize,
    state: SpinLock<LeakyState>,
    allocated: AtomicUsize,
}

// Safety: the raw chunk pointers are only touched under the spinlock or
// in Drop, where we have exclusive access
unsafe impl Send for LeakyHeap {}
unsafe impl Sync for LeakyHeap {}

impl LeakyHeap {
    /// Create a leaky heap drawing chunks of the default size from `parent`
    pub fn new(parent: Arc<dyn Heap>) -> Self {
        Self::with_chunk_size(parent, LEAKY_CHUNK_SIZE)
    }

    /// Create a leaky heap with an explicit chunk size
    pub fn with_chunk_size(parent: Arc<dyn Heap>, chunk_size: usize) -> Self {
        LeakyHeap {
            parent,
            chunk_size: chunk_size.max(DEFAULT_PAGESIZE),
            state: SpinLock::new(LeakyState {
                cursor: core::ptr::null_mut(),
                remaining: 0,
                chunks: Vec::new(),
            }),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Bytes handed out and never individually returned
    pub fn leaked(&self) -> usize {
        self.allocated()
    }
}

impl Heap for LeakyHeap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        // Keep every returned pointer HEAP_ALIGN-aligned
        let padded = size.checked_add(HEAP_ALIGN - 1)? & !(HEAP_ALIGN - 1);

        let mut state = self.state.lock();

        // Oversized requests get a dedicated chunk
        if padded > self.chunk_size {
            let ptr = self.parent.allocate(padded)?;
            state.chunks.push((ptr.as_ptr(), padded));
            self.allocated.fetch_add(size, Ordering::Relaxed);
            return Some(ptr);
        }

        if state.remaining < padded {
            let chunk = self.parent.allocate(self.chunk_size)?;
            state.chunks.push((chunk.as_ptr(), self.chunk_size));
            state.cursor = chunk.as_ptr();
            state.remaining = self.chunk_size;
        }

        let ptr = state.cursor;
        // Safety: padded <= remaining, cursor stays inside the chunk
        state.cursor = unsafe { ptr.add(padded) };
        state.remaining -= padded;
        self.allocated.fetch_add(size, Ordering::Relaxed);
        NonNull::new(ptr)
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, size: usize) {
        // Leaky on purpose: accounting only
        self.allocated.fetch_sub(size, Ordering::Relaxed);
    }

    fn pagesize(&self) -> usize {
        self.parent.pagesize()
    }

    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Drop for LeakyHeap {
    fn drop(&mut self) {
        let state = self.state.lock();
        for &(ptr, size) in state.chunks.iter() {
            if let Some(p) = NonNull::new(ptr) {
                // Safety: each entry came from exactly one parent allocate
                unsafe { self.parent.deallocate(p, size) };
            }
        }
    }
}
