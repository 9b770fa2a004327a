//! A [`BuddyPool`] behind a spinlock, so it can live inside a `static`
//! and be shared between harts.

use super::{
    addr::PhysAddr,
    buddy::{Block, BuddyPool},
    page::Page,
    AllocStats, Error, Result, MAX_ORDER,
};
use spin::{Mutex, MutexGuard};

/// A [`BuddyPool`] that is initialized at runtime and protected by a lock.
///
/// Every operation locks the pool for its whole duration.
pub struct LockedPool<'a, const ORDERS: usize = MAX_ORDER> {
    inner: Mutex<Option<BuddyPool<'a, ORDERS>>>,
}

impl<'a, const ORDERS: usize> LockedPool<'a, ORDERS> {
    /// Create a new pool that has to be initialized using [`Self::init`]
    /// before it can hand out blocks.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Initialize this pool, see [`BuddyPool::init`].
    pub fn init(&self, metadata: &'a mut [Page], start: PhysAddr, page_num: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        *inner = Some(BuddyPool::init(metadata, start, page_num)?);
        Ok(())
    }

    /// Lock the pool and get direct access to it.
    pub fn lock(&self) -> MutexGuard<'_, Option<BuddyPool<'a, ORDERS>>> {
        self.inner.lock()
    }

    fn with<T>(&self, f: impl FnOnce(&mut BuddyPool<'a, ORDERS>) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.lock();
        let pool = inner.as_mut().ok_or(Error::Uninitialized)?;
        f(pool)
    }

    /// Allocate a block of `2^order` pages.
    pub fn allocate(&self, order: usize) -> Result<Block> {
        self.with(|pool| pool.allocate(order))
    }

    /// Allocate the smallest block that holds `count` pages.
    pub fn allocate_pages(&self, count: usize) -> Result<Block> {
        self.with(|pool| pool.allocate_pages(count))
    }

    /// Give a block back to the pool.
    pub fn free(&self, block: Block) -> Result<()> {
        self.with(|pool| pool.free(block))
    }

    /// Sum up the size of every free block.
    pub fn total_free_bytes(&self) -> Result<usize> {
        self.with(|pool| Ok(pool.total_free_bytes()))
    }

    /// Return the statistics of the inner pool.
    pub fn stats(&self) -> Result<AllocStats> {
        self.with(|pool| Ok(pool.stats()))
    }
}

impl<const ORDERS: usize> Default for LockedPool<'_, ORDERS> {
    fn default() -> Self {
        Self::new()
    }
}
