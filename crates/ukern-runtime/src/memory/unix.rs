//! Unix page mapping via mmap

use core::ptr::{self, NonNull};
use ukern_core::constants::DEFAULT_PAGESIZE;

/// System page size, with a sane fallback if sysconf fails
pub(super) fn page_size() -> usize {
    let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ps > 0 {
        ps as usize
    } else {
        DEFAULT_PAGESIZE
    }
}

/// Map `size` bytes of zeroed anonymous memory; `size` is page-aligned
pub(super) fn map_pages(size: usize) -> Option<NonNull<u8>> {
    let base = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return None;
    }
    NonNull::new(base as *mut u8)
}

/// Unmap a region previously returned by `map_pages`
///
/// # Safety
///
/// `ptr`/`size` must exactly match a prior `map_pages`.
pub(super) unsafe fn unmap_pages(ptr: NonNull<u8>, size: usize) -> bool {
    libc::munmap(ptr.as_ptr() as *mut libc::c_void, size) == 0
}
