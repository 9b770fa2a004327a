//! Implementation of a buddy pool that is responsible for handing out
//! physical pages to the rest of the kernel.
//!
//! The pool manages `page_num` pages that start at a page aligned physical
//! address. Each page is described by a [`Page`] inside a metadata table
//! supplied by the caller. Blocks of `2^order` pages are always aligned to
//! their own size (relative to the start of the pool), which makes it possible
//! to find the buddy of a block by flipping a single bit of its index:
//!
//! ```text
//! order 2:  +---------------+---------------+
//!           |  block 0..4   |  block 4..8   |   4 = 0 ^ (1 << 2)
//!           +---------------+---------------+
//! order 3:  +-------------------------------+
//!           |          block 0..8           |
//!           +-------------------------------+
//! ```
//!
//! The head of a merged block is always the lower one of the two buddies.

use super::{
    addr::PhysAddr,
    free_list::{self, FreeList},
    is_page_aligned, order_for_pages, size_for_order,
    page::Page,
    AllocStats, Error, Result, Violation, MAX_ORDER, PAGE_SIZE,
};
use crate::unit;
use core::{cmp, slice};


/// Calculate the index of the buddy of the block at `index`, if the block
/// had the given `order`.
///
/// Returns `None` if the buddy is outside of a pool with `page_num` pages.
fn buddy_at(index: usize, order: usize, page_num: usize) -> Option<usize> {
    let buddy = index ^ 1usize.checked_shl(order as u32)?;
    if buddy < page_num {
        Some(buddy)
    } else {
        None
    }
}

/// A block of `2^order` pages that was handed out by a [`BuddyPool`].
///
/// A `Block` can't be cloned and is consumed by [`BuddyPool::free`],
/// so every block is given back exactly once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a block leaks its pages"]
pub struct Block {
    index: usize,
    order: usize,
}

impl Block {
    /// Rebuild a block from the index of its head page and its order.
    ///
    /// # Safety
    ///
    /// The block must have been handed out by the pool it is freed to,
    /// and no other `Block` for it may exist.
    pub unsafe fn from_raw_parts(index: usize, order: usize) -> Self {
        Self { index, order }
    }

    /// Split this block into the index of its head page and its order.
    pub fn into_raw_parts(self) -> (usize, usize) {
        (self.index, self.order)
    }

    /// The index of the head page inside the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The order of this block.
    pub fn order(&self) -> usize {
        self.order
    }

    /// The number of pages inside this block.
    pub fn page_count(&self) -> usize {
        1 << self.order
    }

    /// The size of this block in bytes.
    pub fn size(&self) -> usize {
        size_for_order(self.order)
    }
}

/// The central structure that is responsible for allocating
/// pages using the buddy allocation algorithm.
///
/// `ORDERS` is the number of orders this pool manages, the largest
/// block it can form holds `2^(ORDERS - 1)` pages.
pub struct BuddyPool<'a, const ORDERS: usize = MAX_ORDER> {
    pages: &'a mut [Page],
    start: PhysAddr,
    free_lists: [FreeList; ORDERS],
}

impl<'a, const ORDERS: usize> BuddyPool<'a, ORDERS> {
    /// Create a pool that manages `page_num` pages starting at `start`.
    ///
    /// The first `page_num` entries of `metadata` are used as the page
    /// descriptors, their previous content is discarded. Every page is
    /// released into the pool in ascending order, so the pool ends up with
    /// the largest aligned blocks that fit.
    pub fn init(metadata: &'a mut [Page], start: PhysAddr, page_num: usize) -> Result<Self> {
        if ORDERS == 0 {
            return Err(Error::ZeroOrders);
        }

        if metadata.len() < page_num {
            return Err(Error::MetadataTooSmall(metadata.len()));
        }

        if !is_page_aligned(start.as_usize()) {
            return Err(Error::UnalignedAddress);
        }

        // the pool must not wrap around the address space
        page_num
            .checked_mul(PAGE_SIZE)
            .and_then(|size| start.as_usize().checked_add(size))
            .ok_or(Error::AddressOutOfRange)?;

        let pages = &mut metadata[..page_num];
        for page in pages.iter_mut() {
            *page = Page::EMPTY;
            page.make_allocated_head(0);
        }

        let mut pool = Self {
            pages,
            start,
            free_lists: [FreeList::EMPTY; ORDERS],
        };

        for index in 0..page_num {
            pool.release(index, 0);
        }

        if page_num > 0 {
            let largest = (usize::BITS - 1 - page_num.leading_zeros()) as usize;
            let largest = cmp::min(largest, ORDERS - 1);
            if !start.is_aligned(size_for_order(largest)) {
                log::warn!(
                    "pool start {} is not aligned to its largest block ({}), \
                     blocks are only aligned relative to the pool",
                    start,
                    unit::bytes(size_for_order(largest))
                );
            }
        }

        log::debug!(
            "initialized buddy pool at {} with {} pages ({})",
            start,
            page_num,
            unit::bytes(page_num * PAGE_SIZE)
        );

        Ok(pool)
    }

    /// Create a pool from a raw pointer to the metadata table.
    ///
    /// # Safety
    ///
    /// `metadata` must point to `page_num` writable [`Page`]s that
    /// are not used by anything else for the lifetime `'a`.
    pub unsafe fn from_raw(metadata: *mut Page, start: PhysAddr, page_num: usize) -> Result<Self> {
        if metadata.is_null() {
            return Err(Error::NullPointer);
        }

        let metadata = slice::from_raw_parts_mut(metadata, page_num);
        Self::init(metadata, start, page_num)
    }

    /// Allocates a block of `2^order` pages.
    ///
    /// If there's no free block of exactly this order, the smallest larger
    /// block is split until a block of the requested order exists.
    pub fn allocate(&mut self, order: usize) -> Result<Block> {
        if order >= ORDERS {
            return Err(Error::OrderOutOfRange(order));
        }

        // fast path: take a block of exactly the requested order
        let index = match self.free_lists[order].pop_front(self.pages) {
            Some(index) => index,
            None => {
                // slow path: find the smallest order that has a block left
                // and split it down to the requested order
                let (from, head) = (order + 1..ORDERS)
                    .find_map(|o| self.free_lists[o].front().map(|head| (o, head)))
                    .ok_or(Error::OutOfMemory)?;

                log::trace!(
                    "splitting order {} block at page {} down to order {}",
                    from,
                    head,
                    order
                );

                let index = self.split(head, order)?;
                self.free_lists[order].remove(self.pages, index);
                index
            }
        };

        self.pages[index].set_allocated(true);
        log::trace!("allocated order {} block at page {}", order, index);

        Ok(Block { index, order })
    }

    /// Allocates the smallest block that holds at least `count` pages.
    pub fn allocate_pages(&mut self, count: usize) -> Result<Block> {
        if count == 0 {
            return Err(Error::ZeroPages);
        }

        self.allocate(order_for_pages(count))
    }

    /// Give a block back to this pool.
    ///
    /// The block is merged with its buddy for as long as possible.
    /// If the descriptor of the block disagrees with the block, the pool
    /// is left untouched and a [`Violation`] is returned.
    pub fn free(&mut self, block: Block) -> Result<()> {
        let order = self.allocated_head(block.index)?;
        if order != block.order {
            return Err(Violation::OrderMismatch(block.index).into());
        }

        let head = self.release(block.index, order);
        log::trace!(
            "freed order {} block at page {}, merged into order {} block at page {}",
            order,
            block.index,
            self.pages[head].order(),
            head
        );

        Ok(())
    }

    /// Give back the block whose head page contains `addr`.
    ///
    /// # Safety
    ///
    /// The block must be owned by the caller and must not be used,
    /// or freed again, afterwards.
    pub unsafe fn free_address(&mut self, addr: PhysAddr) -> Result<()> {
        let index = self.page_index(addr)?;
        let order = self.allocated_head(index)?;
        self.free(Block::from_raw_parts(index, order))
    }

    /// Returns the index of the buddy of the block that is headed by
    /// the page at `index`, using the current order of that page.
    ///
    /// Returns `None` if the buddy would be outside of this pool.
    pub fn buddy(&self, index: usize) -> Option<usize> {
        let order = self.pages.get(index)?.order();
        buddy_at(index, order, self.pages.len())
    }

    /// Validate that `index` heads an allocated block, returning its order.
    fn allocated_head(&self, index: usize) -> Result<usize> {
        let page = self.pages.get(index).ok_or(Error::PageOutOfRange(index))?;

        if page.is_tail() {
            return Err(Violation::NotBlockHead(index).into());
        }

        if !page.is_allocated() {
            return Err(Violation::NotAllocated(index).into());
        }

        let order = page.order();
        if order >= ORDERS || index + (1 << order) > self.pages.len() {
            return Err(Violation::OrderMismatch(index).into());
        }

        if index & ((1 << order) - 1) != 0 {
            return Err(Violation::Misaligned(index).into());
        }

        Ok(order)
    }

    /// Put a validated block into its free list and merge it.
    ///
    /// Returns the head of the block it ended up in.
    fn release(&mut self, index: usize, order: usize) -> usize {
        self.pages[index].set_allocated(false);
        self.free_lists[order].push_back(self.pages, index);
        self.merge(index)
    }

    /// Split the free block at `index` until it has the `target` order.
    ///
    /// The upper halves that are split off along the way are inserted into
    /// the free list of their order. The block itself stays in the free list
    /// of the `target` order. Every buddy is checked up front, so a failed
    /// split leaves the pool untouched.
    fn split(&mut self, index: usize, target: usize) -> Result<usize> {
        let order = self.pages[index].order();
        let page_num = self.pages.len();
        if (target..order).any(|half| buddy_at(index, half, page_num).is_none()) {
            return Err(Violation::MissingBuddy(index).into());
        }

        self.halve(index, target);
        Ok(index)
    }

    /// Recursively halve the block at `index` down to `target`.
    /// All buddies must be inside the pool.
    fn halve(&mut self, index: usize, target: usize) {
        let page = &self.pages[index];
        if page.order() <= target || page.is_allocated() {
            return;
        }

        // walk down from the largest order, so every step
        // only has to halve the block once
        if page.order() - target > 1 {
            self.halve(index, target + 1);
        }

        let order = self.pages[index].order();
        let half = order - 1;
        let buddy = index ^ (1 << half);

        // +-- `index`        +-- `buddy`
        // v                  v
        // +------------------+------------------+
        // |      half        |      half        |
        // +------------------+------------------+
        self.free_lists[order].remove(self.pages, index);
        self.pages[index].set_order(half);
        self.pages[buddy].make_free_head(half);

        self.free_lists[half].push_front(self.pages, index);
        self.free_lists[half].push_front(self.pages, buddy);
    }

    /// Merge the free block at `index` with its buddy, as long as
    /// the buddy is a free block of the same order.
    ///
    /// Returns the head of the largest block that was formed.
    fn merge(&mut self, index: usize) -> usize {
        let order = self.pages[index].order();
        if order + 1 >= ORDERS {
            return index;
        }

        let buddy = match self.buddy(index) {
            Some(buddy) => buddy,
            None => return index,
        };

        // a buddy with a different order was split further,
        // or is part of a larger block.
        let peer = &self.pages[buddy];
        if peer.is_allocated() || peer.is_tail() || peer.order() != order {
            return index;
        }

        let head = cmp::min(index, buddy);
        let tail = cmp::max(index, buddy);

        self.free_lists[order].remove(self.pages, index);
        self.free_lists[order].remove(self.pages, buddy);

        self.pages[tail].make_tail();
        self.pages[head].make_free_head(order + 1);
        self.free_lists[order + 1].push_back(self.pages, head);

        self.merge(head)
    }

    /// Returns the physical address of the page at `index`.
    pub fn page_address(&self, index: usize) -> Result<PhysAddr> {
        if index >= self.pages.len() {
            return Err(Error::PageOutOfRange(index));
        }

        Ok(self.start.offset(index * PAGE_SIZE))
    }

    /// Returns the physical address of the first page of `block`.
    pub fn block_address(&self, block: &Block) -> PhysAddr {
        self.start.offset(block.index * PAGE_SIZE)
    }

    /// Returns the index of the page that contains `addr`.
    pub fn page_index(&self, addr: PhysAddr) -> Result<usize> {
        let offset = addr
            .as_usize()
            .checked_sub(self.start.as_usize())
            .ok_or(Error::AddressOutOfRange)?;

        let index = offset / PAGE_SIZE;
        if index >= self.pages.len() {
            return Err(Error::AddressOutOfRange);
        }

        Ok(index)
    }

    /// Returns the descriptor of the page at `index`.
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    /// Returns the whole metadata table of this pool.
    pub fn pages(&self) -> &[Page] {
        &*self.pages
    }

    /// The physical address of the first page.
    pub fn start(&self) -> PhysAddr {
        self.start
    }

    /// The number of pages this pool manages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// The number of bytes this pool manages.
    pub fn total_bytes(&self) -> usize {
        self.pages.len() * PAGE_SIZE
    }

    /// The number of free blocks of the given order.
    pub fn free_blocks(&self, order: usize) -> usize {
        self.free_lists.get(order).map_or(0, FreeList::len)
    }

    /// Returns an iterator over the head indices of the free blocks
    /// of the given order.
    ///
    /// # Panics
    ///
    /// Panics if `order` is not below `ORDERS`.
    pub fn free_list(&self, order: usize) -> free_list::Iter<'_> {
        self.free_lists[order].iter(&*self.pages)
    }

    /// Sum up the size of every free block in this pool.
    pub fn total_free_bytes(&self) -> usize {
        self.free_lists
            .iter()
            .enumerate()
            .map(|(order, list)| {
                let size = size_for_order(order);

                if cfg!(feature = "logging") {
                    log::debug!(
                        "order {:>2}: {} free blocks of {:#x} bytes",
                        order,
                        list.len(),
                        size
                    );
                }

                list.len() * size
            })
            .sum()
    }

    /// Return a snapshot of the statistics for this pool.
    pub fn stats(&self) -> AllocStats {
        let total = self.total_bytes();
        let free = self.total_free_bytes();

        AllocStats {
            allocated: total - free,
            free,
            total,
            ..AllocStats::with_name("Buddy Pool")
        }
    }

    /// Log the occupancy of every free list.
    pub fn dump(&self) {
        log::debug!("buddy pool at {} ({} pages)", self.start, self.pages.len());
        for (order, list) in self.free_lists.iter().enumerate() {
            log::debug!(
                "  order {:>2} ({:>10}): {} free",
                order,
                unit::bytes(size_for_order(order)),
                list.len()
            );
        }
    }

    /// Verify every invariant of this pool.
    ///
    /// The blocks must tile the pool without gaps or overlaps, every block
    /// must be aligned to its order, and the free lists must hold exactly
    /// the free blocks of their order.
    pub fn check(&self) -> Result<()> {
        let page_num = self.pages.len();
        let mut free_heads = [0usize; ORDERS];

        let mut index = 0;
        while index < page_num {
            let page = &self.pages[index];
            if page.is_tail() {
                return Err(Violation::Gap(index).into());
            }

            let order = page.order();
            if order >= ORDERS || index + (1 << order) > page_num {
                return Err(Violation::OrderMismatch(index).into());
            }

            if index & ((1 << order) - 1) != 0 {
                return Err(Violation::Misaligned(index).into());
            }

            let end = index + (1 << order);
            if let Some(inner) = (index + 1..end).find(|&i| !self.pages[i].is_tail()) {
                return Err(Violation::Overlap(inner).into());
            }

            if !page.is_allocated() {
                free_heads[order] += 1;
            }

            index = end;
        }

        for (order, list) in self.free_lists.iter().enumerate() {
            let corrupted = || Error::Consistency(Violation::ListCorrupted(order));

            let mut count = 0;
            let mut last = None;
            for head in list.iter(&*self.pages) {
                let page = self.pages.get(head).ok_or_else(corrupted)?;
                if page.is_allocated() || page.is_tail() || page.order() != order {
                    return Err(corrupted());
                }

                count += 1;
                last = Some(head);
            }

            let terminated = last.map_or(true, |last| self.pages[last].next.is_none());
            if count != list.len() || count != free_heads[order] || last != list.back() || !terminated
            {
                return Err(corrupted());
            }
        }

        Ok(())
    }
}
