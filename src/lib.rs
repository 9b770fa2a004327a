//! A buddy-system allocator for physical pages.
//!
//! The pool manages a contiguous region of physical memory and hands out
//! blocks of `2^order` pages, aligned to their own size. Every page is
//! described by a [`Page`](mem::page::Page) inside a metadata table that is
//! supplied by the caller, so the allocator itself never needs a heap.
//!
//! ```
//! use buddy_pool::{BuddyPool, Page, PhysAddr};
//!
//! let mut metadata = [Page::EMPTY; 16];
//! let mut pool: BuddyPool<'_> =
//!     BuddyPool::init(&mut metadata, PhysAddr::new(0x8000_0000), 16).unwrap();
//!
//! let block = pool.allocate(2).unwrap();
//! assert_eq!(pool.total_free_bytes(), 12 * buddy_pool::PAGE_SIZE);
//! pool.free(block).unwrap();
//! assert_eq!(pool.total_free_bytes(), 16 * buddy_pool::PAGE_SIZE);
//! ```
#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![no_std]

#[cfg(test)]
extern crate std;

pub mod mem;
pub mod unit;

pub use mem::{
    addr::PhysAddr,
    buddy::{Block, BuddyPool},
    locked::LockedPool,
    page::{Page, PageFlags},
    AllocStats, Error, Result, Violation, MAX_ORDER, PAGE_SHIFT, PAGE_SIZE,
};
