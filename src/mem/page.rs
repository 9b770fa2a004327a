//! The per-page descriptor stored inside the metadata table.

use bitflags::bitflags;

bitflags! {
    /// State bits of a [`Page`].
    pub struct PageFlags: u8 {
        /// The page heads a block that is owned by a caller.
        const ALLOCATED = 1 << 0;
        /// The page was absorbed into a larger block and heads nothing.
        const TAIL = 1 << 1;
    }
}

/// Descriptor for a single physical page.
///
/// Only the descriptor of a block's head page (its lowest page) is
/// authoritative. The links thread the page through the free list of
/// its order while it heads a free block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    order: usize,
    flags: PageFlags,
    pub(super) prev: Option<usize>,
    pub(super) next: Option<usize>,
}

impl Page {
    /// A zeroed descriptor, used to build metadata tables.
    pub const EMPTY: Page = Page {
        order: 0,
        flags: PageFlags::empty(),
        prev: None,
        next: None,
    };

    /// The order of the block this page heads.
    pub fn order(&self) -> usize {
        self.order
    }

    /// The raw state bits of this page.
    pub fn flags(&self) -> PageFlags {
        self.flags
    }

    /// Whether this page heads an allocated block.
    pub fn is_allocated(&self) -> bool {
        self.flags.contains(PageFlags::ALLOCATED)
    }

    /// Whether this page is a non-head page of some block.
    pub fn is_tail(&self) -> bool {
        self.flags.contains(PageFlags::TAIL)
    }

    pub(super) fn set_order(&mut self, order: usize) {
        self.order = order;
    }

    /// Turn this page into the head of a free block of `order`.
    pub(super) fn make_free_head(&mut self, order: usize) {
        self.order = order;
        self.flags = PageFlags::empty();
    }

    /// Turn this page into the head of an allocated block of `order`.
    pub(super) fn make_allocated_head(&mut self, order: usize) {
        self.order = order;
        self.flags = PageFlags::ALLOCATED;
    }

    pub(super) fn make_tail(&mut self) {
        self.flags = PageFlags::TAIL;
        self.prev = None;
        self.next = None;
    }

    pub(super) fn set_allocated(&mut self, allocated: bool) {
        self.flags.set(PageFlags::ALLOCATED, allocated);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::EMPTY
    }
}
