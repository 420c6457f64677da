//! Stable identifier newtypes threaded through the pipeline.
//!
//! Queues and structures never hold pointers or references to uops or
//! registers; they hold one of these small `Copy` ids and look the real
//! data up in its owning slab (`UopPool`, `PhysRegFile`, ...). This keeps
//! the simultaneous membership of a uop in several lists (fetch queue, uop
//! queue, IQ, LQ/SQ, ROB, event queue) representable without aliasing.

use std::fmt;

use serde::Serialize;

/// Monotonic per-thread program-order sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Seq(pub u64);

/// Monotonic per-core dispatch-order sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DiSeq(pub u64);

/// Index of a simulated core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CoreId(pub u32);

/// Index of a hardware thread within a core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ThreadId(pub u32);

/// Identifier for a guest context (as produced by the `Frontend`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContextId(pub u32);

/// Stable slab key for a live `Uop`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct UopId(pub u32);

/// Unique tag identifying a reorder-buffer entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RobTag(pub u32);

/// Index of a physical register within its register class's file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PhysReg(pub u32);

macro_rules! impl_display_as_inner {
    ($($t:ty),+ $(,)?) => {
        $(
            impl fmt::Display for $t {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )+
    };
}

impl_display_as_inner!(Seq, DiSeq, CoreId, ThreadId, ContextId, UopId, RobTag, PhysReg);
