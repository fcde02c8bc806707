//! Component G (added): the adapter onto the process's real allocator.
//!
//! Every page this crate hands out, and every LARGE-class allocation, is
//! ultimately backed by one `libc::calloc` call. Centralizing that call
//! here keeps `directory`/`page` free of `unsafe extern "C"` plumbing and
//! gives a single place to log and fail fast on exhaustion, mirroring how
//! the rest of the crate treats the backing store as fallible-but-fatal
//! rather than a recoverable error. Zeroing the buffer up front mirrors the
//! original's `memset(idle_page, 0, page_size)` ahead of `mem_page_initialize`,
//! so a freshly carved debug block never exposes another block's leftover
//! header bytes before anything has explicitly written to it.
use core::ffi::c_void;

use log::error;

/// Requests `size` zeroed bytes from the system allocator. Logs and aborts
/// the process on failure: every caller in this crate treats a backing
/// allocation as unconditionally available once the allocator has been
/// started, the same way the page-carving logic assumes its freelist is
/// never empty mid-carve.
pub fn page_alloc(size: usize) -> *mut u8 {
    let ptr = unsafe { libc::calloc(1, size) } as *mut u8;
    if ptr.is_null() {
        error!("backing allocator exhausted requesting {size} bytes");
        panic!("out of memory: backing allocator returned null for {size} bytes");
    }
    ptr
}

/// Releases a buffer previously returned by `page_alloc`.
///
/// # Safety
/// `ptr` must have been returned by `page_alloc` and not already freed.
pub unsafe fn page_free(ptr: *mut u8) {
    libc::free(ptr as *mut c_void);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_malloc_and_free() {
        let p = page_alloc(64);
        assert!(!p.is_null());
        unsafe {
            p.write_bytes(0xAB, 64);
            page_free(p);
        }
    }
}
