//! Component D: one page list per size class, with the discipline for
//! which page serves allocations and when an idle page is handed back.
//!
//! Grounded on `mem_page_malloc`/`alloc_block`/`free_block`/`mem_page_free`
//! from the original: the serving page is always the list head, a page
//! that fills up is pushed to the tail, and a page that frees its last
//! block is promoted back to head before idle-count bookkeeping decides
//! whether to reclaim it.

use crate::backing::{page_alloc, page_free};
use crate::list::{Linked, List};
use crate::page::{self, PageHeader, PageKind, PageStatus};
use crate::size_class::{self, ClassInfo, CLASSES, CLASS_COUNT, LARGE_CLASS};

/// A class stops offering an idle page back to the backing allocator once
/// it is already holding this many spares.
pub const MAX_IDLE: usize = 2;

#[derive(Clone, Copy)]
struct ClassDirectory {
    pages: List<PageHeader>,
    idle_num: usize,
}

impl ClassDirectory {
    const fn new() -> Self {
        ClassDirectory { pages: List::new(), idle_num: 0 }
    }
}

/// The full set of per-class page lists, guarded by the facade's mutex.
pub struct Directory {
    classes: [ClassDirectory; CLASS_COUNT],
}

/// Summary of one class's page list, for diagnostics and tests.
pub struct ClassSnapshot {
    pub count: usize,
    pub idle_num: usize,
    pub head_status: Option<PageStatus>,
}

// Only the mutex-holding facade ever touches a `Directory`; the raw
// pointers inside it are never read or written without that lock held.
unsafe impl Send for Directory {}

impl Directory {
    pub const fn new() -> Self {
        Directory { classes: [ClassDirectory::new(); CLASS_COUNT] }
    }

    pub fn snapshot(&self, class: usize) -> ClassSnapshot {
        let dir = &self.classes[class];
        let head_status = unsafe {
            if dir.pages.head().is_null() {
                None
            } else {
                Some((*dir.pages.head()).status)
            }
        };
        ClassSnapshot { count: dir.pages.len(), idle_num: dir.idle_num, head_status }
    }

    /// Iterates every page currently held by every class, in directory
    /// order then list order. Used by diagnostics and teardown.
    pub fn for_each_page<F: FnMut(usize, *mut PageHeader)>(&self, mut f: F) {
        for (class, dir) in self.classes.iter().enumerate() {
            if dir.pages.is_empty() {
                continue;
            }
            unsafe {
                let mut cursor = dir.pages.head();
                for _ in 0..dir.pages.len() {
                    f(class, cursor);
                    cursor = PageHeader::next(cursor);
                }
            }
        }
    }

    /// Allocates one block from a pooled slab class (never ZERO/LARGE),
    /// creating a fresh page if the class has no usable one.
    ///
    /// # Safety
    /// Caller holds the facade's mutex for the duration of this call.
    pub unsafe fn allocate_slab(&mut self, class: usize, header_size: usize) -> *mut u8 {
        debug_assert!(class != 0 && class != LARGE_CLASS);
        let info = CLASSES[class];
        let dir = &mut self.classes[class];

        let usable = !dir.pages.is_empty() && !(*dir.pages.head()).is_full();
        if !usable {
            let page = create_slab_page(info, header_size);
            if dir.pages.is_empty() || (*dir.pages.head()).is_full() {
                dir.pages.insert(0, page);
            } else {
                let head = dir.pages.head();
                dir.pages.insert_after(head, page);
            }
            dir.idle_num += 1;
        }

        let head = dir.pages.head();
        let was_idle = (*head).is_fully_free();
        let will_fill = (*head).in_use + 1 == (*head).blocks_per_page;

        if will_fill && head != dir.pages.tail() {
            dir.pages.remove_force(head);
            dir.pages.push(head);
        }
        if was_idle {
            dir.idle_num -= 1;
        }

        PageHeader::carve(head)
    }

    /// Creates a dedicated ZERO/LARGE page and its externally backed
    /// buffer, filling in the buffer's own header (and, if `provenance` is
    /// given, its debug fields).
    ///
    /// # Safety
    /// Caller holds the facade's mutex; `class` is 0 (ZERO) or
    /// `LARGE_CLASS`.
    pub unsafe fn allocate_external(
        &mut self,
        class: usize,
        payload_len: usize,
        header_size: usize,
    ) -> *mut u8 {
        debug_assert!(class == 0 || class == LARGE_CLASS);
        let info = CLASSES[class];
        let page = create_handle_page(info, header_size);

        let buffer = page_alloc(header_size + payload_len);
        let data = buffer.add(header_size);
        let header = page::header_of(data);
        (*header).page = page;
        (*header).status = page::BlockStatus::Using;

        PageHeader::assign_external(page, buffer, payload_len);

        let dir = &mut self.classes[class];
        dir.pages.insert(0, page);

        data
    }

    /// The header size (`PLAIN_HEADER_SIZE` or `DEBUG_HEADER_SIZE`) the
    /// owning page was carved with, so reallocate can preserve whichever
    /// mode the original allocation used.
    ///
    /// # Safety
    /// `data` must be a live allocation from this directory.
    pub unsafe fn header_size_of(&self, data: *mut u8) -> usize {
        let header = page::header_of(data);
        (*(*header).page).block_header_size
    }

    /// The usable size of a live allocation, per §4.E's returned-size
    /// query: `block_size` for slab kinds, the originally requested length
    /// for ZERO/LARGE.
    ///
    /// # Safety
    /// `data` must be a live allocation from this directory.
    pub unsafe fn size_of(&self, data: *mut u8) -> usize {
        let header = page::header_of(data);
        let page = (*header).page;
        match (*page).kind {
            PageKind::Zero | PageKind::Large => (*page).external_payload_len(),
            _ => (*page).block_size,
        }
    }

    /// The size class a live allocation belongs to.
    ///
    /// # Safety
    /// `data` must be a live allocation from this directory.
    pub unsafe fn class_of(&self, data: *mut u8) -> usize {
        let header = page::header_of(data);
        size_class::class_of_page(&*(*header).page)
    }

    /// Frees a block previously returned by `allocate_slab` or
    /// `allocate_external`; dispatches on the owning page's kind.
    ///
    /// # Safety
    /// Caller holds the facade's mutex; `data` must be a live allocation
    /// from this directory.
    pub unsafe fn free(&mut self, data: *mut u8) {
        let header = page::header_of(data);
        let page = (*header).page;
        debug_assert!(!(*page).is_corrupt());

        match (*page).kind {
            PageKind::Zero | PageKind::Large => self.free_external(page),
            _ => self.free_slab(page, data),
        }
    }

    unsafe fn free_slab(&mut self, page: *mut PageHeader, data: *mut u8) {
        let class = size_class::class_of_page(&*page);
        PageHeader::release(page, data);

        let dir = &mut self.classes[class];
        if page != dir.pages.head() {
            dir.pages.remove_force(page);
            dir.pages.insert(0, page);
        }

        if (*page).is_fully_free() {
            dir.idle_num += 1;
            if dir.idle_num > MAX_IDLE {
                dir.pages.remove_force(page);
                dir.idle_num -= 1;
                destroy_slab_page(page);
            }
        }
    }

    unsafe fn free_external(&mut self, page: *mut PageHeader) {
        let class = size_class::class_of_page(&*page);
        let buffer = (*page).external();
        page_free(buffer);
        PageHeader::clear_external(page);

        let dir = &mut self.classes[class];
        dir.pages.remove_force(page);
        destroy_handle_page(page);
    }

    /// Tears down every page in every class, releasing their backing
    /// buffers. Leaves the directory in its freshly-initialized state.
    ///
    /// # Safety
    /// Caller holds the facade's mutex; no further calls are valid until a
    /// fresh `Directory` is installed.
    pub unsafe fn teardown(&mut self) {
        for (class, dir) in self.classes.iter_mut().enumerate() {
            while !dir.pages.is_empty() {
                let page = dir.pages.pop();
                if class == 0 || class == LARGE_CLASS {
                    let buffer = (*page).external();
                    if !buffer.is_null() {
                        page_free(buffer);
                    }
                    destroy_handle_page(page);
                } else {
                    destroy_slab_page(page);
                }
            }
            dir.idle_num = 0;
        }
    }
}

unsafe fn create_slab_page(info: ClassInfo, header_size: usize) -> *mut PageHeader {
    let size = PageHeader::required_size(info.block_size, header_size, info.blocks_per_page);
    let raw = page_alloc(size);
    PageHeader::init(raw, info.kind, info.block_size, header_size, info.blocks_per_page)
}

unsafe fn destroy_slab_page(page: *mut PageHeader) {
    page_free(page as *mut u8);
}

/// ZERO/LARGE pages need no block array of their own; they are a bare
/// header used only to anchor an externally allocated buffer.
unsafe fn create_handle_page(info: ClassInfo, header_size: usize) -> *mut PageHeader {
    let size = core::mem::size_of::<PageHeader>();
    let raw = page_alloc(size);
    PageHeader::init(raw, info.kind, info.block_size, header_size, 1)
}

unsafe fn destroy_handle_page(page: *mut PageHeader) {
    page_free(page as *mut u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slab_allocate_then_free_reuses_the_same_block() {
        let mut dir = Directory::new();
        unsafe {
            let a = dir.allocate_slab(6, page::PLAIN_HEADER_SIZE);
            dir.free(a);
            let b = dir.allocate_slab(6, page::PLAIN_HEADER_SIZE);
            assert_eq!(a, b);
            dir.teardown();
        }
    }

    #[test]
    fn filling_a_page_promotes_a_new_head_after_it() {
        let mut dir = Directory::new();
        let class = 6; // 128-byte class, 8 blocks per page
        unsafe {
            for _ in 0..CLASSES[class].blocks_per_page {
                dir.allocate_slab(class, page::PLAIN_HEADER_SIZE);
            }
            let snap = dir.snapshot(class);
            assert_eq!(snap.count, 1);
            assert_eq!(snap.head_status, Some(PageStatus::Full));

            dir.allocate_slab(class, page::PLAIN_HEADER_SIZE);
            let snap = dir.snapshot(class);
            assert_eq!(snap.count, 2);

            dir.teardown();
        }
    }

    #[test]
    fn idle_pages_beyond_max_idle_are_reclaimed() {
        let mut dir = Directory::new();
        let class = 1; // 8-byte class, 128 blocks per page
        let per_page = CLASSES[class].blocks_per_page;
        let mut pointers = Vec::new();
        unsafe {
            for _ in 0..3 {
                for _ in 0..per_page {
                    pointers.push(dir.allocate_slab(class, page::PLAIN_HEADER_SIZE));
                }
            }
            for p in pointers {
                dir.free(p);
            }
            let snap = dir.snapshot(class);
            assert_eq!(snap.count, MAX_IDLE);
            assert_eq!(snap.idle_num, MAX_IDLE);

            dir.teardown();
        }
    }

    #[test]
    fn external_allocation_round_trips_through_free() {
        let mut dir = Directory::new();
        unsafe {
            let ptr = dir.allocate_external(LARGE_CLASS, 10_000, page::PLAIN_HEADER_SIZE);
            assert!(!ptr.is_null());
            dir.free(ptr);
            let snap = dir.snapshot(LARGE_CLASS);
            assert_eq!(snap.count, 0);
        }
    }

    #[test]
    fn zero_class_allocation_is_non_null() {
        let mut dir = Directory::new();
        unsafe {
            let ptr = dir.allocate_external(0, 0, page::PLAIN_HEADER_SIZE);
            assert!(!ptr.is_null());
            dir.free(ptr);
        }
    }

    #[test]
    fn debug_external_allocation_recovers_its_own_header() {
        let mut dir = Directory::new();
        unsafe {
            let ptr = dir.allocate_external(LARGE_CLASS, 10_000, page::DEBUG_HEADER_SIZE);
            assert_eq!(dir.class_of(ptr), LARGE_CLASS);
            assert_eq!(dir.size_of(ptr), 10_000);
            dir.free(ptr);
        }
    }
}
