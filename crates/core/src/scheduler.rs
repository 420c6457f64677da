//! Context scheduler: C15. Static and dynamic binding of guest contexts to
//! `(core, thread)` hardware-thread slots (spec.md §4.11).
//!
//! No teacher module generalizes directly to guest-context scheduling (the
//! teacher is single-context RISC-V); built fresh from spec.md's static/
//! dynamic protocol, following the crate's existing newtype-id and
//! `thiserror` idioms.

use std::collections::VecDeque;

use crate::common::{ContextId, CoreId, ScheduleError, ThreadId};

/// A hardware-thread slot: one `(core, thread)` pair a context can be bound
/// to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pub core: CoreId,
    pub thread: ThreadId,
}

/// One context's binding state, plus (in dynamic mode) the cycle it was
/// allocated and whether its eviction has been signaled.
#[derive(Clone, Copy, Debug)]
struct Allocation {
    ctx: ContextId,
    slot: Slot,
    allocated_at: u64,
    eviction_signaled: bool,
}

/// Whether the scheduler may evict a running context to make room for
/// another (spec.md §4.11 "Dynamic mode").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Static,
    Dynamic { context_quantum: u64 },
}

/// Reports that `ctx`'s eviction was signaled; the pipeline must suppress
/// dispatch on `ctx`'s thread until [`ContextScheduler::drain_evicted`]
/// observes the thread has drained and frees the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvictionSignal {
    pub ctx: ContextId,
    pub slot: Slot,
}

/// Binds guest contexts to hardware-thread slots.
pub struct ContextScheduler {
    mode: Mode,
    free_slots: VecDeque<Slot>,
    allocations: Vec<Allocation>,
    context_switch: bool,
}

impl ContextScheduler {
    /// Builds a scheduler over `slots`, operating in `mode`.
    /// `context_switch` mirrors `General.ContextSwitch`: when `false` and no
    /// slot is free for a runnable context, `bind` fails rather than
    /// waiting.
    #[must_use]
    pub fn new(slots: Vec<Slot>, mode: Mode, context_switch: bool) -> Self {
        Self {
            mode,
            free_slots: slots.into(),
            allocations: Vec::new(),
            context_switch,
        }
    }

    /// True iff `ctx` currently holds a slot.
    #[must_use]
    pub fn is_bound(&self, ctx: ContextId) -> bool {
        self.allocations.iter().any(|a| a.ctx == ctx)
    }

    /// The slot `ctx` is bound to, if any.
    #[must_use]
    pub fn slot_of(&self, ctx: ContextId) -> Option<Slot> {
        self.allocations
            .iter()
            .find(|a| a.ctx == ctx)
            .map(|a| a.slot)
    }

    /// Binds a newly-runnable, unallocated `ctx` to the first free slot
    /// (spec.md §4.11 "Static mode": "pick the first free `(core, thread)`
    /// slot and map it"). Fails with `NoFreeHardwareThread` if no slot is
    /// free and `context_switch` is `false`.
    pub fn bind(&mut self, ctx: ContextId, now: u64) -> Result<Slot, ScheduleError> {
        let Some(slot) = self.free_slots.pop_front() else {
            return Err(ScheduleError::NoFreeHardwareThread);
        };
        self.allocations.push(Allocation {
            ctx,
            slot,
            allocated_at: now,
            eviction_signaled: false,
        });
        Ok(slot)
    }

    /// In dynamic mode, signals eviction for the oldest-allocated context
    /// once `context_quantum` cycles have elapsed since its allocation
    /// (spec.md §4.11 "Dynamic mode"). Returns the signal if one was newly
    /// raised; idempotent once already signaled.
    pub fn maybe_signal_eviction(&mut self, now: u64) -> Option<EvictionSignal> {
        let Mode::Dynamic { context_quantum } = self.mode else {
            return None;
        };
        let oldest = self
            .allocations
            .iter_mut()
            .filter(|a| !a.eviction_signaled)
            .min_by_key(|a| a.allocated_at)?;
        if now.saturating_sub(oldest.allocated_at) < context_quantum {
            return None;
        }
        oldest.eviction_signaled = true;
        Some(EvictionSignal {
            ctx: oldest.ctx,
            slot: oldest.slot,
        })
    }

    /// True iff `ctx`'s eviction has been signaled and dispatch on its
    /// thread must therefore be suppressed (spec.md §4.11: "Dispatch is
    /// suppressed on a thread whose eviction signal is pending").
    #[must_use]
    pub fn eviction_pending(&self, ctx: ContextId) -> bool {
        self.allocations
            .iter()
            .any(|a| a.ctx == ctx && a.eviction_signaled)
    }

    /// Frees `ctx`'s slot once its pipeline has drained (fetch, decode,
    /// dispatch empty for its thread and its ROB entries retired), making
    /// the slot available to a future `bind`. The caller is responsible for
    /// verifying drain completion; this only performs the bookkeeping.
    pub fn drain_evicted(&mut self, ctx: ContextId) {
        if let Some(pos) = self.allocations.iter().position(|a| a.ctx == ctx) {
            let alloc = self.allocations.remove(pos);
            self.free_slots.push_back(alloc.slot);
        }
    }

    /// Unconditionally unbinds `ctx` (e.g. on frontend-reported finish),
    /// freeing its slot without requiring a prior eviction signal.
    pub fn unbind(&mut self, ctx: ContextId) {
        self.drain_evicted(ctx);
    }
}
