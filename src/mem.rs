//! Physical page management.

pub mod addr;
pub mod buddy;
pub mod free_list;
pub mod locked;
pub mod page;

use crate::unit::{self, KIB};
use core::fmt;
use displaydoc_lite::displaydoc;

/// The size of a single page is 4KiB,
/// this is also the size of order-0 in the buddy pool.
pub const PAGE_SIZE: usize = 4 * KIB;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: usize = 12;

/// The default number of orders a pool manages.
///
/// Valid orders are `0..MAX_ORDER`, so the largest block
/// holds `2^(MAX_ORDER - 1)` pages (32MiB).
pub const MAX_ORDER: usize = 14;

/// Result for every pool operation.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Calculates the size in bytes for the given order.
pub const fn size_for_order(order: usize) -> usize {
    PAGE_SIZE << order
}

/// Calculates the first order that can hold `pages` pages.
///
/// `0` pages map to order `0`. The result may exceed the number of
/// orders a pool supports. If no power of two above `pages` fits into
/// a `usize`, `usize::BITS` is returned.
pub fn order_for_pages(pages: usize) -> usize {
    pages
        .max(1)
        .checked_next_power_of_two()
        .map_or(usize::BITS, usize::trailing_zeros) as usize
}

/// Calculates the first order where the given `size` in bytes would fit in.
pub fn order_for_size(size: usize) -> usize {
    let partial = size & (PAGE_SIZE - 1) != 0;
    order_for_pages((size >> PAGE_SHIFT) + partial as usize)
}

/// Checks if `addr` is aligned to the page size.
pub const fn is_page_aligned(addr: usize) -> bool {
    addr & (PAGE_SIZE - 1) == 0
}

displaydoc! {
    /// Any error that can happen while managing a pool.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Error {
        /// tried to allocate order {_0}, which the pool does not support.
        OrderOutOfRange(usize),
        /// there's no free block left that is large enough.
        OutOfMemory,
        /// tried to allocate zero pages.
        ZeroPages,
        /// a pool needs at least one order.
        ZeroOrders,
        /// the metadata table only holds {_0} page descriptors.
        MetadataTooSmall(usize),
        /// the start of the usable memory is not page aligned.
        UnalignedAddress,
        /// the metadata table pointer was null.
        NullPointer,
        /// the address is outside of the pool.
        AddressOutOfRange,
        /// page {_0} is outside of the pool.
        PageOutOfRange(usize),
        /// the pool was not initialized yet.
        Uninitialized,
        /// the pool was already initialized.
        AlreadyInitialized,
        /// pool consistency violated: {_0}
        Consistency(Violation),
    }
}

displaydoc! {
    /// A broken invariant that was detected inside a pool.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Violation {
        /// page {_0} is not allocated.
        NotAllocated(usize),
        /// page {_0} is not the head of a block.
        NotBlockHead(usize),
        /// page {_0} is not aligned to the order of its block.
        Misaligned(usize),
        /// the order of page {_0} does not match.
        OrderMismatch(usize),
        /// the buddy of page {_0} is outside of the pool.
        MissingBuddy(usize),
        /// the free list of order {_0} is corrupted.
        ListCorrupted(usize),
        /// page {_0} belongs to more than one block.
        Overlap(usize),
        /// page {_0} does not belong to any block.
        Gap(usize),
    }
}

impl From<Violation> for Error {
    fn from(violation: Violation) -> Self {
        Error::Consistency(violation)
    }
}

/// Statistics for a page pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocStats {
    /// The name of the pool that collected these stats.
    pub name: &'static str,
    /// The number of bytes that are handed out.
    pub allocated: usize,
    /// The number of bytes that are left for allocation.
    pub free: usize,
    /// The total number of bytes that this pool manages.
    pub total: usize,
}

impl AllocStats {
    /// Create a new [`AllocStats`] instance for the given pool name.
    pub const fn with_name(name: &'static str) -> Self {
        Self {
            name,
            allocated: 0,
            free: 0,
            total: 0,
        }
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f, "\nAllocated: {}", unit::bytes(self.allocated))?;
        writeln!(f, "Free: {}", unit::bytes(self.free))?;
        writeln!(f, "Total: {}", unit::bytes(self.total))?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f)
    }
}
