//! A size-class slab allocator with an optional debug mode that records
//! call-site provenance for every live allocation, for leak reporting.
//!
//! The public surface mirrors a conventional `malloc`/`free` API plus a
//! handful of diagnostic entry points, all funneled through one
//! process-wide mutex. [`start`] must run before any other call; [`stop`]
//! tears everything down and is the only point at which outstanding
//! allocations are reported as leaks.
//!
//! ```
//! slabcore::start().unwrap();
//! let p = slabcore::allocate(16).unwrap();
//! slabcore::free(p);
//! slabcore::stop().unwrap();
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::io::Write;
use std::sync::Mutex;

mod backing;
mod debug;
mod diagnostics;
mod directory;
mod error;
mod list;
mod page;
mod size_class;

pub use error::AllocError;

use directory::Directory;
use page::{DEBUG_HEADER_SIZE, PLAIN_HEADER_SIZE};
use size_class::LARGE_CLASS;

enum State {
    Uninit,
    Active(Directory),
}

static ALLOCATOR: Mutex<State> = Mutex::new(State::Uninit);

/// Initializes process-wide state. Must precede any other call in this
/// module.
pub fn start() -> Result<(), AllocError> {
    let mut guard = ALLOCATOR.lock().unwrap();
    match *guard {
        State::Uninit => {
            *guard = State::Active(Directory::new());
            Ok(())
        }
        State::Active(_) => Err(AllocError::AlreadyStarted),
    }
}

/// Tears down process-wide state, releasing every page still held by any
/// class (and, for ZERO/LARGE classes, the external buffers they point
/// at). Calls made after `stop` return `AllocError::NotStarted` until the
/// next `start`.
pub fn stop() -> Result<(), AllocError> {
    let mut guard = ALLOCATOR.lock().unwrap();
    match &mut *guard {
        State::Active(dir) => {
            unsafe {
                dir.teardown();
            }
            *guard = State::Uninit;
            Ok(())
        }
        State::Uninit => Err(AllocError::NotStarted),
    }
}

fn with_directory<T>(f: impl FnOnce(&mut Directory) -> T) -> Option<T> {
    let mut guard = ALLOCATOR.lock().unwrap();
    match &mut *guard {
        State::Active(dir) => Some(f(dir)),
        State::Uninit => {
            log::error!("slabcore: call made before start()");
            None
        }
    }
}

/// Returns a pointer to at least `len` usable bytes, zero-filled, aligned
/// to 8. Returns `None` only if the allocator has not been started; a
/// backing-allocator failure is fatal rather than a returned error (see
/// the design notes on fail-fast exhaustion).
pub fn allocate(len: usize) -> Option<*mut u8> {
    allocate_with(len, None)
}

/// As [`allocate`], additionally recording `file`/`line`/`func` as the
/// allocation's provenance for later leak reporting.
pub fn allocate_dbg(len: usize, file: &str, line: i32, func: &str) -> Option<*mut u8> {
    allocate_with(len, Some((file, line, func)))
}

fn allocate_with(len: usize, provenance: Option<(&str, i32, &str)>) -> Option<*mut u8> {
    let header_size = if provenance.is_some() { DEBUG_HEADER_SIZE } else { PLAIN_HEADER_SIZE };
    let class = size_class::class_of_length(len);
    with_directory(|dir| unsafe {
        let data = match class {
            0 => dir.allocate_external(0, 0, header_size),
            LARGE_CLASS => dir.allocate_external(LARGE_CLASS, len, header_size),
            _ => dir.allocate_slab(class, header_size),
        };
        if let Some((file, line, func)) = provenance {
            debug::fill_provenance(page::debug_header_of(data), file, line, func);
        }
        data
    })
}

/// Given an existing allocation and a new length, returns a pointer to a
/// region of at least `len` usable bytes, preserving the first
/// `min(old_len, len)` bytes. Returns the same pointer unchanged when the
/// new length still fits in the existing block and does not require a
/// smaller class. `ptr == null` does nothing and returns `None`.
pub fn reallocate(ptr: *mut u8, len: usize) -> Option<*mut u8> {
    reallocate_with(ptr, len, None)
}

/// As [`reallocate`], recording new provenance when the allocation
/// actually moves; an in-place reallocation keeps its original record.
pub fn reallocate_dbg(ptr: *mut u8, len: usize, file: &str, line: i32, func: &str) -> Option<*mut u8> {
    reallocate_with(ptr, len, Some((file, line, func)))
}

fn reallocate_with(ptr: *mut u8, len: usize, provenance: Option<(&str, i32, &str)>) -> Option<*mut u8> {
    if ptr.is_null() {
        return None;
    }
    with_directory(|dir| unsafe {
        let old_class = dir.class_of(ptr);
        let new_class = size_class::class_of_length(len);
        let old_size = dir.size_of(ptr);

        if old_size >= len && old_class <= new_class {
            return ptr;
        }

        let header_size = dir.header_size_of(ptr);
        let new_ptr = match new_class {
            0 => dir.allocate_external(0, 0, header_size),
            LARGE_CLASS => dir.allocate_external(LARGE_CLASS, len, header_size),
            _ => dir.allocate_slab(new_class, header_size),
        };
        std::ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(len));
        if header_size == DEBUG_HEADER_SIZE {
            if let Some((file, line, func)) = provenance {
                debug::fill_provenance(page::debug_header_of(new_ptr), file, line, func);
            }
        }
        dir.free(ptr);
        new_ptr
    })
}

/// Releases an allocation previously returned by [`allocate`] or
/// [`allocate_dbg`]. A null pointer is a no-op; freeing the same pointer
/// twice is undefined, matching the backing freelist's assumptions.
pub fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    with_directory(|dir| unsafe { dir.free(ptr) });
}

/// Alias of [`free`]. The original API distinguished a debug free
/// entry point because the caller had to restate which header layout a
/// block used; this implementation always recovers that from the page
/// itself, so there is nothing left for the `_dbg` variant to do
/// differently.
pub fn free_dbg(ptr: *mut u8) {
    free(ptr)
}

/// Volatile-zeroes `len` bytes starting at `ptr`, so the write survives
/// even when the compiler can prove the memory is about to be freed.
pub fn zero(ptr: *mut u8, len: usize) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        for i in 0..len {
            std::ptr::write_volatile(ptr.add(i), 0);
        }
    }
}

/// Writes a per-class, per-page summary to `out`.
pub fn print_info(out: &mut dyn Write) {
    with_directory(|dir| {
        let _ = diagnostics::print_info(dir, out);
    });
}

/// Alias of [`print_info`]; debug provenance, where present, is rendered
/// automatically rather than gated by a separate call.
pub fn print_info_dbg(out: &mut dyn Write) {
    print_info(out)
}

/// Writes every block's status and size, restricted to classes whose
/// block size is at least `min_len`.
pub fn print_block_list(min_len: usize, out: &mut dyn Write) {
    with_directory(|dir| {
        let _ = diagnostics::print_block_list(dir, min_len, out);
    });
}

/// Alias of [`print_block_list`]; see [`print_info_dbg`].
pub fn print_block_list_dbg(min_len: usize, out: &mut dyn Write) {
    print_block_list(min_len, out)
}

/// Writes a leak report: every page with at least one live block, or a
/// bare `"No leak!"` line if none remain.
pub fn print_leak_info(out: &mut dyn Write) {
    with_directory(|dir| {
        let _ = diagnostics::print_leak_info(dir, out);
    });
}

/// Alias of [`print_leak_info`]; see [`print_info_dbg`].
pub fn print_leak_info_dbg(out: &mut dyn Write) {
    print_leak_info(out)
}

/// Byte alignment every pointer returned by [`allocate`]/[`reallocate`]
/// satisfies; requests for a stricter alignment through [`SlabAlloc`] fall
/// back to the system allocator.
pub const ALIGN: usize = size_class::ALIGN;

/// A [`GlobalAlloc`] adapter over this module's facade, for processes that
/// want it as their default allocator. Requests whose alignment exceeds
/// [`ALIGN`] are forwarded to [`System`] rather than serviced here, since
/// the slab layout only ever guarantees 8-byte alignment.
pub struct SlabAlloc;

unsafe impl GlobalAlloc for SlabAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGN {
            return System.alloc(layout);
        }
        allocate(layout.size()).unwrap_or(std::ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.align() > ALIGN {
            System.dealloc(ptr, layout);
            return;
        }
        free(ptr);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGN {
            return System.realloc(ptr, layout, new_size);
        }
        reallocate(ptr, new_size).unwrap_or(std::ptr::null_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    // The facade is process-wide global state; tests that call
    // start/stop must not interleave with each other.
    fn serialize() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    #[test]
    fn simple_reuse_returns_the_same_pointer() {
        let _guard = serialize();
        start().unwrap();
        let p1 = allocate(16).unwrap();
        free(p1);
        let p2 = allocate(16).unwrap();
        assert_eq!(p1, p2);
        free(p2);
        stop().unwrap();
    }

    #[test]
    fn realloc_in_place_when_new_length_still_fits() {
        let _guard = serialize();
        start().unwrap();
        let p = allocate(12).unwrap();
        let q = reallocate(p, 14).unwrap();
        assert_eq!(p, q);
        free(q);
        stop().unwrap();
    }

    #[test]
    fn realloc_moves_and_preserves_bytes_when_growing_class() {
        let _guard = serialize();
        start().unwrap();
        let p = allocate(8).unwrap();
        unsafe {
            p.write_bytes(0x42, 8);
        }
        let q = reallocate(p, 200).unwrap();
        assert_ne!(p, q);
        unsafe {
            let bytes = std::slice::from_raw_parts(q, 8);
            assert!(bytes.iter().all(|&b| b == 0x42));
        }
        free(q);
        stop().unwrap();
    }

    #[test]
    fn zero_length_and_oversized_requests_round_trip() {
        let _guard = serialize();
        start().unwrap();
        let z = allocate(0).unwrap();
        assert!(!z.is_null());
        free(z);

        let large = allocate(10_000).unwrap();
        assert_eq!(with_directory(|dir| unsafe { dir.size_of(large) }).unwrap(), 10_000);
        free(large);
        stop().unwrap();
    }

    #[test]
    fn calls_before_start_do_not_panic() {
        assert!(allocate(16).is_none());
        assert_eq!(stop(), Err(AllocError::NotStarted));
    }

    #[test]
    fn leak_report_reflects_an_outstanding_debug_allocation() {
        let _guard = serialize();
        start().unwrap();
        let _leak = allocate_dbg(10, "x.c", 42, "f").unwrap();
        let mut buf = Vec::new();
        print_leak_info(&mut buf);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("file = x.c"));
        assert!(text.contains("line = 42"));
        assert!(!text.contains("No leak!"));
        stop().unwrap();
    }

    #[test]
    fn freed_debug_block_provenance_does_not_survive_into_its_next_tenant() {
        let _guard = serialize();
        start().unwrap();
        let first = allocate_dbg(10, "old.c", 1, "old_fn").unwrap();
        free(first);
        let _second = allocate_dbg(10, "new.c", 2, "new_fn").unwrap();

        let mut buf = Vec::new();
        print_leak_info(&mut buf);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("file = new.c"));
        assert!(!text.contains("old.c"));
        stop().unwrap();
    }

    #[test]
    fn reallocate_of_a_null_pointer_returns_none() {
        let _guard = serialize();
        start().unwrap();
        assert!(reallocate(std::ptr::null_mut(), 16).is_none());
        stop().unwrap();
    }
}
