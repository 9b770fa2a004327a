//! Physical addresses.

use core::fmt;

/// A physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// Create a new physical address.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Return the raw value of this address.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Calculates the wrapping offset from this physical address.
    pub const fn offset(self, off: usize) -> Self {
        Self(self.0.wrapping_add(off))
    }

    /// Check if this address is a multiple of `align`.
    ///
    /// `align` must be a power of two.
    pub const fn is_aligned(self, align: usize) -> bool {
        self.0 & (align - 1) == 0
    }
}

impl From<usize> for PhysAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<PhysAddr> for usize {
    fn from(x: PhysAddr) -> usize {
        x.0
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
