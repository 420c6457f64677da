//! Physical address type.
//!
//! The pipeline never translates addresses (no MMU is in scope); uops carry
//! an already-resolved `PhysAddr` by the time they reach the load/store
//! queue, produced by the `Frontend` collaborator.

/// A physical address as seen by the memory module and coherence directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    /// Creates a new physical address from a raw 64-bit value.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub fn val(&self) -> u64 {
        self.0
    }

    /// Returns the address of the cache block containing this address.
    #[inline(always)]
    pub fn block(&self, line_bytes: u64) -> Self {
        Self(self.0 - (self.0 % line_bytes))
    }
}
