//! Doubly linked list of free blocks, threaded through the page descriptors.
//!
//! The list itself only stores the head, the tail and the length. The links
//! live inside the [`Page`]s, as indices into the metadata table, so every
//! operation takes the table it operates on.

use super::page::Page;

/// Free list of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl FreeList {
    /// An empty list.
    pub const EMPTY: FreeList = FreeList {
        head: None,
        tail: None,
        len: 0,
    };

    /// Returns whether this list is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The number of blocks in this list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// The first block of this list.
    pub fn front(&self) -> Option<usize> {
        self.head
    }

    /// The last block of this list.
    pub fn back(&self) -> Option<usize> {
        self.tail
    }

    /// Insert the page at `index` at the front of the list.
    pub fn push_front(&mut self, pages: &mut [Page], index: usize) {
        pages[index].prev = None;
        pages[index].next = self.head;

        match self.head {
            Some(old) => pages[old].prev = Some(index),
            None => {
                debug_assert!(self.tail.is_none());
                debug_assert_eq!(self.len, 0);
                self.tail = Some(index);
            }
        }

        self.head = Some(index);
        self.len += 1;
    }

    /// Insert the page at `index` at the back of the list.
    pub fn push_back(&mut self, pages: &mut [Page], index: usize) {
        pages[index].prev = self.tail;
        pages[index].next = None;

        match self.tail {
            Some(old) => pages[old].next = Some(index),
            None => {
                debug_assert!(self.head.is_none());
                debug_assert_eq!(self.len, 0);
                self.head = Some(index);
            }
        }

        self.tail = Some(index);
        self.len += 1;
    }

    /// Remove the first block from this list.
    pub fn pop_front(&mut self, pages: &mut [Page]) -> Option<usize> {
        let index = self.head?;
        self.remove(pages, index);
        Some(index)
    }

    /// Unlink the page at `index` from this list.
    ///
    /// The page must be a member of this list.
    pub fn remove(&mut self, pages: &mut [Page], index: usize) {
        debug_assert!(self.len > 0, "removing from an empty free list");

        let prev = pages[index].prev.take();
        let next = pages[index].next.take();

        match prev {
            Some(prev) => pages[prev].next = next,
            None => {
                debug_assert_eq!(self.head, Some(index), "page is not part of this list");
                self.head = next;
            }
        }

        match next {
            Some(next) => pages[next].prev = prev,
            None => {
                debug_assert_eq!(self.tail, Some(index), "page is not part of this list");
                self.tail = prev;
            }
        }

        self.len -= 1;
    }

    /// Returns an iterator over the indices of the blocks in this list.
    pub fn iter<'list>(&'list self, pages: &'list [Page]) -> Iter<'list> {
        Iter {
            pages,
            next: self.head,
            remaining: self.len,
        }
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Iterator over the block indices of a [`FreeList`].
pub struct Iter<'list> {
    pages: &'list [Page],
    next: Option<usize>,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        // `remaining` bounds the walk even if the links form a cycle.
        if self.remaining == 0 {
            return None;
        }

        let index = self.next?;
        self.next = self.pages.get(index).and_then(|page| page.next);
        self.remaining -= 1;
        Some(index)
    }
}
