//! Component B: the fixed size-class table and the two pure lookup functions
//! that dispatch a request length, or an existing page, to a class index.

use crate::page::{PageHeader, PageKind};

/// Number of entries in the size-class table (14 slab classes + LARGE).
pub const CLASS_COUNT: usize = 15;

/// Largest length that still reuses a pooled slab page; anything bigger is LARGE.
pub const MAX_REUSABLE_LEN: usize = 512;

/// Byte alignment every returned pointer satisfies.
pub const ALIGN: usize = 8;

/// Index of the LARGE class, always the last table entry.
pub const LARGE_CLASS: usize = CLASS_COUNT - 1;

/// One row of the size-class table: the page kind it is served from, the
/// per-block data size, and how many such blocks fit in one page.
#[derive(Clone, Copy)]
pub struct ClassInfo {
    pub kind: PageKind,
    pub block_size: usize,
    pub blocks_per_page: usize,
}

/// `block_size * blocks_per_page` for slab kinds; the declared "page size"
/// used only for documentation purposes (ZERO/LARGE carry a single block).
impl ClassInfo {
    const fn new(kind: PageKind, block_size: usize, blocks_per_page: usize) -> Self {
        ClassInfo { kind, block_size, blocks_per_page }
    }
}

/// The size-class table, ordered by `block_size`. Index 0 is the ZERO class,
/// index `LARGE_CLASS` is LARGE; everything in between is a pooled slab
/// class. Reproduced exactly from the original design; do not reorder.
pub static CLASSES: [ClassInfo; CLASS_COUNT] = [
    ClassInfo::new(PageKind::Zero, 8, 1),      // 0
    ClassInfo::new(PageKind::OneK, 8, 128),    // 1
    ClassInfo::new(PageKind::OneK, 16, 64),    // 2
    ClassInfo::new(PageKind::OneK, 32, 32),    // 3
    ClassInfo::new(PageKind::OneK, 64, 16),    // 4
    ClassInfo::new(PageKind::OneK, 96, 10),    // 5
    ClassInfo::new(PageKind::OneK, 128, 8),    // 6
    ClassInfo::new(PageKind::TwoK, 160, 12),   // 7
    ClassInfo::new(PageKind::TwoK, 192, 10),   // 8
    ClassInfo::new(PageKind::TwoK, 256, 8),    // 9
    ClassInfo::new(PageKind::FourK, 320, 12),  // 10
    ClassInfo::new(PageKind::FourK, 384, 10),  // 11
    ClassInfo::new(PageKind::FourK, 448, 9),   // 12
    ClassInfo::new(PageKind::FourK, 512, 8),   // 13
    ClassInfo::new(PageKind::Large, 8, 1),     // 14
];

/// Lookup table keyed by `align_up(len, 8) >> 3`, i.e. the number of 8-byte
/// words the (aligned) request spans. Not monotonic by construction: several
/// consecutive word-counts collapse onto the same class so that, e.g., any
/// request between 25 and 32 bytes lands in the 32-byte class. This table is
/// load-bearing and must be reproduced byte for byte.
const LOOKUP: [u8; 65] = [
    0,
    1, 2, 3, 3, 4, 4, 4, 4,
    5, 5, 5, 5, 6, 6, 6, 6,
    7, 7, 7, 7, 8, 8, 8, 8,
    9, 9, 9, 9, 9, 9, 9, 9,
    10, 10, 10, 10, 10, 10, 10, 10,
    11, 11, 11, 11, 11, 11, 11, 11,
    12, 12, 12, 12, 12, 12, 12, 12,
    13, 13, 13, 13, 13, 13, 13, 13,
];

const fn align_up(len: usize, align: usize) -> usize {
    (len + align - 1) & !(align - 1)
}

/// Maps a request length to a class index. Never fails: lengths over
/// `MAX_REUSABLE_LEN` always resolve to `LARGE_CLASS`.
pub fn class_of_length(len: usize) -> usize {
    if len > MAX_REUSABLE_LEN {
        return LARGE_CLASS;
    }
    let aligned = align_up(len, ALIGN);
    let word_index = aligned >> 3;
    LOOKUP[word_index] as usize
}

/// Maps a page back to its class index without the page storing one
/// explicitly. ZERO and LARGE pages are identified by kind; slab pages
/// recompute the class from their own `block_size` via the length rule,
/// which is exact because every slab class's `block_size` is itself a
/// valid request length that routes back to that same class.
pub fn class_of_page(page: &PageHeader) -> usize {
    match page.kind {
        PageKind::Zero => 0,
        PageKind::Large => LARGE_CLASS,
        _ => class_of_length(page.block_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_routes_to_zero_class() {
        assert_eq!(class_of_length(0), 0);
    }

    #[test]
    fn class_boundaries_land_in_their_own_class() {
        let boundaries = [
            (8usize, 1usize),
            (16, 2),
            (32, 3),
            (64, 4),
            (96, 5),
            (128, 6),
            (160, 7),
            (192, 8),
            (256, 9),
            (320, 10),
            (384, 11),
            (448, 12),
            (512, 13),
        ];
        for (len, expected) in boundaries {
            assert_eq!(class_of_length(len), expected, "len={len}");
            assert_eq!(CLASSES[expected].block_size, len);
        }
    }

    #[test]
    fn one_more_byte_crosses_into_next_class() {
        assert_eq!(class_of_length(9), 2);
        assert_eq!(class_of_length(17), 3);
        assert_eq!(class_of_length(33), 4);
        assert_eq!(class_of_length(65), 5);
        assert_eq!(class_of_length(513), LARGE_CLASS);
    }

    #[test]
    fn oversized_and_huge_both_land_on_large() {
        assert_eq!(class_of_length(513), LARGE_CLASS);
        assert_eq!(class_of_length(10_000), LARGE_CLASS);
    }

    #[test]
    fn nine_through_sixteen_all_route_to_sixteen_byte_class() {
        for len in 9..=16 {
            assert_eq!(class_of_length(len), 2, "len={len}");
        }
    }
}
