//! Page-granular heap over the platform's virtual memory
//!
//! Platform-specific mapping primitives live in the per-OS submodules;
//! this module holds the heap itself.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as platform;
    } else {
        compile_error!("Unsupported platform");
    }
}

use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use ukern_core::heap::Heap;

/// Heap that maps whole pages per allocation
///
/// Every `allocate` is its own anonymous mapping rounded up to the page
/// size, so frees return memory to the OS immediately and a stray write
/// past an allocation faults instead of corrupting a neighbor.
pub struct PageHeap {
    pagesize: usize,
    allocated: AtomicUsize,
}

impl PageHeap {
    pub fn new() -> Self {
        PageHeap {
            pagesize: platform::page_size(),
            allocated: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn pad(&self, size: usize) -> Option<usize> {
        size.checked_add(self.pagesize - 1)
            .map(|s| s & !(self.pagesize - 1))
    }
}

impl Default for PageHeap {
    fn default() -> Self {
        PageHeap::new()
    }
}

impl Heap for PageHeap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let padded = self.pad(size)?;
        let ptr = platform::map_pages(padded)?;
        self.allocated.fetch_add(padded, Ordering::Relaxed);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        let padded = match self.pad(size) {
            Some(p) => p,
            None => return,
        };
        if platform::unmap_pages(ptr, padded) {
            self.allocated.fetch_sub(padded, Ordering::Relaxed);
        }
    }

    fn pagesize(&self) -> usize {
        self.pagesize
    }

    /// Mapped bytes (page-padded, unlike the byte-exact `SystemHeap`)
    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ukern_core::Queue;

    #[test]
    fn test_page_heap_roundtrip() {
        let heap = PageHeap::new();
        let ps = heap.pagesize();
        assert!(ps.is_power_of_two());

        let p = heap.allocate(100).unwrap();
        assert_eq!(heap.allocated(), ps);

        // Mapped zeroed and writable
        unsafe {
            let bytes = core::slice::from_raw_parts_mut(p.as_ptr(), 100);
            assert!(bytes.iter().all(|&b| b == 0));
            bytes[0] = 0xab;
            bytes[99] = 0xcd;
        }

        unsafe { heap.deallocate(p, 100) };
        assert_eq!(heap.allocated(), 0);
    }

    #[test]
    fn test_page_heap_multi_page() {
        let heap = PageHeap::new();
        let ps = heap.pagesize();
        let p = heap.allocate(ps + 1).unwrap();
        assert_eq!(heap.allocated(), 2 * ps);
        unsafe { heap.deallocate(p, ps + 1) };
        assert_eq!(heap.allocated(), 0);
    }

    #[test]
    fn test_queue_on_page_heap() {
        let heap = Arc::new(PageHeap::new());
        {
            let q = Queue::new(Arc::clone(&heap) as Arc<dyn Heap>, 128).unwrap();
            for i in 0..128 {
                assert!(q.enqueue(i));
            }
            assert!(q.is_full());
            for i in 0..128 {
                assert_eq!(q.dequeue(), Some(i));
            }
            assert!(heap.allocated() > 0);
        }
        assert_eq!(heap.allocated(), 0);
    }
}
