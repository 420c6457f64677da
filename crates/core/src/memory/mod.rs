//! Memory-module boundary: the pipeline's view of everything below the L1
//! (spec.md §1 "Out of scope": "the core assumes a memory module exposes a
//! non-blocking `access` operation returning an access handle that later
//! signals completion"), plus the directory-based coherence state the
//! pipeline's memory uops synchronize against (spec.md §3, §4.12).
//!
//! Grounded on the teacher's `core/units/cache/mod.rs` for the non-blocking
//! access shape, generalized to an opaque trait boundary since sub-L1
//! timing is explicitly out of scope here.

pub mod directory;
pub mod simple;

use crate::common::{AccessKind, PhysAddr};

/// A handle to an outstanding, non-blocking memory access. Opaque to the
/// pipeline beyond `is_complete`; a `MemoryModule` implementation is free to
/// encode whatever bookkeeping it needs into the `u64` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessHandle(pub u64);

/// The pipeline's view of everything below the L1: issues non-blocking
/// accesses and reports their completion. Sub-L1 timing (cache/interconnect
/// queueing) is an external collaborator's concern; implementations range
/// from a fixed-latency stub ([`simple::SimpleMemoryModule`]) to a full
/// coherence directory ([`directory::DirectoryMemoryModule`]).
pub trait MemoryModule {
    /// Issues a non-blocking access to `addr` of `kind`, returning a handle
    /// that later reports completion via `is_complete`.
    fn access(&mut self, addr: PhysAddr, kind: AccessKind, now: u64) -> AccessHandle;

    /// Reports whether the access behind `handle` has completed as of
    /// cycle `now`.
    fn is_complete(&self, handle: AccessHandle, now: u64) -> bool;
}

#[cfg(test)]
mockall::mock! {
    /// A `MemoryModule` double whose calls can be asserted on directly,
    /// for stage tests that need to pin down exactly which access a stage
    /// issues rather than just observing a real module's completion timing.
    pub MemoryModule {}

    impl MemoryModule for MemoryModule {
        fn access(&mut self, addr: PhysAddr, kind: AccessKind, now: u64) -> AccessHandle;
        fn is_complete(&self, handle: AccessHandle, now: u64) -> bool;
    }
}
