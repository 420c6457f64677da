//! Per-hardware-thread fetch-side state (spec.md §3 `Context`, §4.2).
//!
//! One `ThreadState` exists per `(core, thread)` slot regardless of whether a
//! guest context is currently bound to it; an unbound thread simply sits
//! idle with an empty `fetchq`/`uopq`. Grounded on the teacher's
//! `core/pipeline/thread.rs`, which plays the same role for its single
//! always-bound hardware thread.

use std::collections::VecDeque;

use crate::common::{ContextId, UopId};
use crate::memory::AccessHandle;
use crate::tracecache::TraceBuilder;

/// One macro-instruction's worth of already-decoded uops, staged in the
/// fetch queue pending the bandwidth-limited move into the uop queue
/// ("decode", spec.md §4.3). The frontend hands us fully-decomposed uops, so
/// what the teacher's decode stage spends on instruction decode this crate
/// spends purely on the `decode_width` bandwidth gate.
#[derive(Debug)]
pub struct FetchSlot {
    pub uops: Vec<UopId>,
    pub mop_size: u64,
}

/// Per-thread fetch/decode-side pipeline state.
#[derive(Debug)]
pub struct ThreadState {
    /// Guest context currently bound to this hardware thread, if any.
    pub ctx: Option<ContextId>,
    /// Next guest `eip` to fetch from.
    pub fetch_eip: u64,
    /// Fetch is stalled (recovery penalty, i-cache miss) until this cycle.
    pub fetch_stall_until: u64,
    /// Outstanding i-cache access for the macro-instruction at `fetch_eip`,
    /// if fetch is waiting on one (`(handle, eip)`).
    pub icache_pending: Option<(AccessHandle, u64)>,
    /// Raw fetched-but-undecoded macro-instructions, budgeted in bytes
    /// against `Queues.FetchQueueSize`.
    pub fetchq: VecDeque<FetchSlot>,
    /// Running sum of `mop_size` over `fetchq`'s resident slots.
    pub fetchq_bytes: u64,
    /// Decoded uops awaiting dispatch, budgeted in count against
    /// `Queues.UopQueueSize`.
    pub uopq: VecDeque<UopId>,
    /// Count of dispatched-but-unresolved control uops belonging to this
    /// thread. Nonzero means uops now entering the pipeline are speculative
    /// (`specmode = true`, spec.md §4.1/§4.8); it is what fetch/dispatch
    /// consult instead of rescanning the ROB every cycle.
    pub unresolved_branches: u32,
    /// Trace under construction for the trace cache (C8), fed one committed
    /// uop at a time.
    pub trace_builder: TraceBuilder,
    /// `true` once the bound context's frontend reports `Finished` and every
    /// uop it produced has retired.
    pub finished: bool,
}

impl ThreadState {
    /// Builds an idle thread with no bound context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ctx: None,
            fetch_eip: 0,
            fetch_stall_until: 0,
            icache_pending: None,
            fetchq: VecDeque::new(),
            fetchq_bytes: 0,
            uopq: VecDeque::new(),
            unresolved_branches: 0,
            trace_builder: TraceBuilder::default(),
            finished: false,
        }
    }

    /// Binds `ctx` to this (previously idle) thread, starting fetch at
    /// `entry_eip`.
    pub fn bind(&mut self, ctx: ContextId, entry_eip: u64) {
        self.ctx = Some(ctx);
        self.fetch_eip = entry_eip;
        self.fetch_stall_until = 0;
        self.icache_pending = None;
        self.fetchq.clear();
        self.fetchq_bytes = 0;
        self.uopq.clear();
        self.unresolved_branches = 0;
        self.finished = false;
    }

    /// `true` once every fetch/decode-side structure has drained — the
    /// condition the context scheduler's eviction protocol (C15) waits on
    /// before freeing this thread's slot.
    #[must_use]
    pub fn frontend_drained(&self) -> bool {
        self.fetchq.is_empty() && self.uopq.is_empty() && self.icache_pending.is_none()
    }

    /// Whether speculative-mode admission applies to uops produced now.
    #[must_use]
    pub fn in_specmode(&self) -> bool {
        self.unresolved_branches > 0
    }
}

impl Default for ThreadState {
    fn default() -> Self {
        Self::new()
    }
}
