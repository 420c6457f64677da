//! C1 — the uop record and its slab allocator.
//!
//! A uop is produced by decode, shared by reference across several
//! membership lists, and destroyed only once every membership flag is clear
//! and it has either committed or been squashed (spec.md §3, §9). Rather
//! than model that lifetime with real references, uops live in a slab
//! (`UopPool`) keyed by a stable `UopId`; every queue in the pipeline stores
//! ids, never pointers, following the slab-with-stable-key approach spec.md
//! §9 calls for.

use std::collections::HashMap;

use crate::common::{ContextId, DiSeq, PhysAddr, PhysReg, RobTag, Seq, UopId};

/// Flat index into the ~40 symbolic logical registers a uop can reference:
/// GPRs, segment registers, flag groups, the 8 FP stack slots, the 8 XMM
/// registers, plus the internal temporaries `ea`, `data`, `aux`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LogicalReg(pub u8);

/// Named constants for the symbolic logical register space, mirroring the
/// original's fixed architectural-plus-internal register set.
pub mod logical {
    use super::LogicalReg;

    /// First of 16 general-purpose integer registers.
    pub const GPR_BASE: u8 = 0;
    /// Number of general-purpose integer registers.
    pub const GPR_COUNT: u8 = 16;
    /// First of 6 segment registers.
    pub const SEG_BASE: u8 = GPR_BASE + GPR_COUNT;
    /// Number of segment registers.
    pub const SEG_COUNT: u8 = 6;
    /// First of 4 flag groups (carry/overflow, sign/zero, parity, aux-carry).
    pub const FLAGS_BASE: u8 = SEG_BASE + SEG_COUNT;
    /// Number of flag groups.
    pub const FLAGS_COUNT: u8 = 4;
    /// First of 8 FP stack slots.
    pub const FP_BASE: u8 = FLAGS_BASE + FLAGS_COUNT;
    /// Number of FP stack slots.
    pub const FP_COUNT: u8 = 8;
    /// First of 8 XMM registers.
    pub const XMM_BASE: u8 = FP_BASE + FP_COUNT;
    /// Number of XMM registers.
    pub const XMM_COUNT: u8 = 8;
    /// Internal effective-address temporary.
    pub const EA: LogicalReg = LogicalReg(XMM_BASE + XMM_COUNT);
    /// Internal data temporary (store data staging, etc).
    pub const DATA: LogicalReg = LogicalReg(XMM_BASE + XMM_COUNT + 1);
    /// Internal auxiliary temporary.
    pub const AUX: LogicalReg = LogicalReg(XMM_BASE + XMM_COUNT + 2);
    /// Total number of symbolic logical registers (GPR+SEG+FLAGS+FP+XMM+3).
    pub const TOTAL: u8 = XMM_BASE + XMM_COUNT + 3;

    /// Returns the logical register for integer GPR `idx` (0-based).
    #[must_use]
    pub fn gpr(idx: u8) -> LogicalReg {
        LogicalReg(GPR_BASE + idx)
    }

    /// Returns the logical register for FP stack slot `idx` (0-based).
    #[must_use]
    pub fn fp(idx: u8) -> LogicalReg {
        LogicalReg(FP_BASE + idx)
    }
}

/// Register class a logical/physical register belongs to, used to pick the
/// correct `PhysRegFile` partition (C2) and functional-unit class (C5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// Integer (GPR/segment/flags) registers.
    Int,
    /// Floating-point / XMM registers.
    Fp,
}

/// Uop classification bitset.
///
/// The base set {INT, LOGIC, FP, MEM, XMM, CTRL, COND, UNCOND} is exactly
/// spec.md §3; `INDEX` and `PREFETCH` are supplemented from
/// `original_source`'s `UInstFlags` per SPEC_FULL §3 (scaled-index
/// addressing informs effective-address computation at issue; a prefetch
/// retires without a coherence-state change).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct UopFlags(u16);

impl UopFlags {
    /// Integer ALU operation.
    pub const INT: Self = Self(1 << 0);
    /// Logical (bitwise) operation.
    pub const LOGIC: Self = Self(1 << 1);
    /// Floating-point operation.
    pub const FP: Self = Self(1 << 2);
    /// Memory operation (load/store/prefetch).
    pub const MEM: Self = Self(1 << 3);
    /// XMM/SIMD operation.
    pub const XMM: Self = Self(1 << 4);
    /// Control-flow operation.
    pub const CTRL: Self = Self(1 << 5);
    /// Conditional branch.
    pub const COND: Self = Self(1 << 6);
    /// Unconditional branch (jump, call, return).
    pub const UNCOND: Self = Self(1 << 7);
    /// Memory operation with scaled-index addressing.
    pub const INDEX: Self = Self(1 << 8);
    /// Software prefetch.
    pub const PREFETCH: Self = Self(1 << 9);
    /// Store rather than load; only meaningful alongside `MEM`. Supplements
    /// the base flag set so dispatch can route a memory uop to the store
    /// queue rather than the load queue without a separate opcode table.
    pub const STORE: Self = Self(1 << 10);
    /// Call instruction; only meaningful alongside `CTRL`/`UNCOND`. Pushes
    /// the return-address stack at fetch (spec.md §3's `BtbSource::Call`).
    pub const CALL: Self = Self(1 << 11);
    /// Return instruction; only meaningful alongside `CTRL`/`UNCOND`. Pops
    /// the return-address stack at fetch (spec.md §3's `BtbSource::Return`).
    pub const RETURN: Self = Self(1 << 12);

    /// An empty flag set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns the union of `self` and `other`.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if every bit set in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for UopFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl std::ops::BitOrAssign for UopFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}

/// Membership in the pipeline's mutually-exclusive-ish queues.
///
/// spec.md §8 invariant 4 requires that no uop have two flags set that
/// correspond to mutually exclusive queues (IQ vs LQ vs SQ vs event queue);
/// `in_fetchq`/`in_uopq`/`in_rob` are independent of that exclusivity set
/// since a uop is concurrently in the ROB and in exactly one of
/// {IQ, LQ, SQ} or the event queue while in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Membership {
    /// Present in the per-thread fetch queue (raw fetched bytes, pre-decode).
    pub in_fetchq: bool,
    /// Present in the per-thread uop queue (decoded, pre-dispatch).
    pub in_uopq: bool,
    /// Present in the instruction queue (non-memory, awaiting issue).
    pub in_iq: bool,
    /// Present in the load queue.
    pub in_lq: bool,
    /// Present in the store queue.
    pub in_sq: bool,
    /// Present in the reorder buffer.
    pub in_rob: bool,
    /// Present in the event queue (executing, awaiting completion).
    pub in_eventq: bool,
}

impl Membership {
    /// Returns `true` if the uop is in none of the exclusive
    /// {IQ, LQ, SQ, event queue} set, or in exactly one of them.
    #[must_use]
    pub fn exclusive_set_is_consistent(&self) -> bool {
        let count = [self.in_iq, self.in_lq, self.in_sq, self.in_eventq]
            .iter()
            .filter(|b| **b)
            .count();
        count <= 1
    }
}

/// Status flags tracked through issue/writeback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UopStatus {
    /// All physical inputs have `pending = 0` (C2).
    pub ready: bool,
    /// Has been issued to a functional unit or the memory module.
    pub issued: bool,
    /// Writeback has broadcast its result; outputs are `pending = 0`.
    pub completed: bool,
    /// Set by writeback on a control uop whose resolved `neip` disagreed
    /// with `pred_neip` (spec.md §4.6). Lets commit detect a writeback-
    /// resolved mispredict under `RecoverKind::Commit` without recomputing
    /// `neip != pred_neip` itself.
    pub mispredicted: bool,
}

/// Timestamps recorded as a uop moves through issue/execute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UopTimestamps {
    /// Cycle at which all physical inputs became ready.
    pub when_ready: Option<u64>,
    /// Cycle of the most recent (possibly failed) issue attempt.
    pub issue_try_cycle: Option<u64>,
    /// Cycle at which issue actually succeeded.
    pub issue_cycle: Option<u64>,
}

/// Renaming bookkeeping: up to 3 inputs, up to 4 outputs, pre- and
/// post-rename, plus the previous mapping of each output for rollback.
#[derive(Clone, Debug, Default)]
pub struct RenameInfo {
    /// Logical input registers (up to 3).
    pub logical_inputs: Vec<LogicalReg>,
    /// Logical output registers (up to 4).
    pub logical_outputs: Vec<LogicalReg>,
    /// Physical register holding each logical input, after renaming.
    pub phys_inputs: Vec<PhysReg>,
    /// Newly allocated physical register for each logical output.
    pub phys_outputs: Vec<PhysReg>,
    /// The physical register each logical output mapped to *before* this
    /// uop's rename, recorded so recovery (C14) can restore the RAT.
    pub prev_phys_outputs: Vec<PhysReg>,
}

/// Deferred predictor-update bookkeeping, captured at fetch and consumed at
/// commit (spec.md §4.2, §4.7).
#[derive(Clone, Copy, Debug, Default)]
pub struct PredictorMeta {
    /// BTB way hit at prediction time, if any.
    pub btb_way: Option<u16>,
    /// Bimodal-table index used for this prediction.
    pub bimodal_index: Option<u32>,
    /// Global-history snapshot at prediction time (two-level/combined).
    pub history_snapshot: Option<u64>,
    /// Combined-predictor choice-table index used for this prediction.
    pub choice_index: Option<u32>,
    /// Opaque scheme-specific bookkeeping `PredictorWrapper::update` needs to
    /// replay this uop's prediction outcome at commit.
    pub dir_meta: crate::predictor::DirectionMeta,
}

/// A memory uop's address and its outstanding access handle.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryInfo {
    /// Resolved physical address (set once the effective address is computed).
    pub physaddr: Option<PhysAddr>,
    /// Access size in bytes, used by the load/store queues' overlap checks.
    pub size: u8,
    /// Handle into the `MemoryModule` for the outstanding access.
    pub handle: Option<crate::memory::AccessHandle>,
}

/// The pipeline's unit of work (spec.md §3).
#[derive(Clone, Debug)]
pub struct Uop {
    /// Opcode as assigned by the frontend; opaque to the pipeline beyond
    /// classification via `flags`.
    pub opcode: u32,
    /// Classification bitset.
    pub flags: UopFlags,
    /// Owning guest context.
    pub ctx: ContextId,
    /// Program-order sequence number (monotonic per thread).
    pub seq: Seq,
    /// Dispatch-order sequence number (monotonic per core), assigned at dispatch.
    pub di_seq: Option<DiSeq>,
    /// Guest PC of the macro-instruction this uop belongs to.
    pub eip: u64,
    /// Predicted next-eip, recorded at fetch.
    pub pred_neip: u64,
    /// Statically-known fallthrough/target next-eip (frontend-provided).
    pub target_neip: u64,
    /// Actual next-eip, known once the uop executes.
    pub neip: u64,
    /// Byte length of the owning macro-instruction; used by the trace
    /// builder and the fetch-time branch oracle. Zero until fetch fills it.
    pub mop_size: u64,
    /// Produced while an ancestor branch was unresolved and mispredicted.
    pub specmode: bool,
    /// Queue membership flags.
    pub membership: Membership,
    /// Lifecycle status flags.
    pub status: UopStatus,
    /// Issue/execute timestamps.
    pub timestamps: UopTimestamps,
    /// Rename bookkeeping.
    pub rename: RenameInfo,
    /// Memory-uop address/handle bookkeeping (only meaningful if `flags` has `MEM`).
    pub memory: MemoryInfo,
    /// Deferred branch-predictor update bookkeeping.
    pub predictor_meta: PredictorMeta,
}

impl Uop {
    /// Returns `true` if this uop is a control-flow uop (branch, call, jump, return).
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.flags.contains(UopFlags::CTRL)
    }

    /// Returns `true` if this uop accesses memory.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.flags.contains(UopFlags::MEM)
    }

    /// Returns `true` if all recorded physical inputs are marked ready by
    /// the caller's register-file query; callers typically call this via
    /// `IssueQueue::scan_ready` instead of directly.
    #[must_use]
    pub fn has_inputs(&self) -> bool {
        !self.rename.phys_inputs.is_empty()
    }

    /// Classifies this control-flow uop for BTB/RAS bookkeeping.
    #[must_use]
    pub fn btb_source(&self) -> crate::predictor::btb::BtbSource {
        use crate::predictor::btb::BtbSource;
        if self.flags.contains(UopFlags::CALL) {
            BtbSource::Call
        } else if self.flags.contains(UopFlags::RETURN) {
            BtbSource::Return
        } else {
            BtbSource::Other
        }
    }
}

/// Slab allocator for live uops, keyed by a stable `UopId`.
///
/// Ids are never reused while a uop is alive; once freed, the slot is
/// recycled via a free list, but a stale `UopId` held by a bug would index
/// into a *different* live uop rather than panic — pipeline invariant
/// checks (spec.md §8) are what catch that kind of bug, not the pool itself.
#[derive(Debug, Default)]
pub struct UopPool {
    slots: Vec<Option<Uop>>,
    free: Vec<u32>,
    next_seq: HashMap<ContextId, u64>,
    next_di_seq: u64,
    next_rob_tag: u32,
}

impl UopPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next program-order sequence number for `ctx`.
    pub fn next_seq(&mut self, ctx: ContextId) -> Seq {
        let entry = self.next_seq.entry(ctx).or_insert(0);
        let seq = Seq(*entry);
        *entry += 1;
        seq
    }

    /// Allocates the next per-core dispatch-order sequence number.
    pub fn next_di_seq(&mut self) -> DiSeq {
        let seq = DiSeq(self.next_di_seq);
        self.next_di_seq += 1;
        DiSeq(seq.0)
    }

    /// Allocates the next reorder-buffer tag, unique for the lifetime of
    /// this pool.
    pub fn next_rob_tag(&mut self) -> RobTag {
        let tag = RobTag(self.next_rob_tag);
        self.next_rob_tag += 1;
        tag
    }

    /// Inserts a new uop into the pool, returning its stable id.
    pub fn insert(&mut self, uop: Uop) -> UopId {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(uop);
            UopId(idx)
        } else {
            self.slots.push(Some(uop));
            UopId(self.slots.len() as u32 - 1)
        }
    }

    /// Returns a reference to the uop with the given id, if live.
    #[must_use]
    pub fn get(&self, id: UopId) -> Option<&Uop> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Returns a mutable reference to the uop with the given id, if live.
    pub fn get_mut(&mut self, id: UopId) -> Option<&mut Uop> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Removes and returns a uop, provided it carries no remaining
    /// membership flag. Returns the uop unmodified (and leaves it in the
    /// pool) if any membership flag is still set, since that would mean a
    /// queue somewhere still references this id.
    pub fn try_free(&mut self, id: UopId) -> Option<Uop> {
        let still_member = self.get(id).is_some_and(|u| {
            let m = u.membership;
            m.in_fetchq || m.in_uopq || m.in_iq || m.in_lq || m.in_sq || m.in_rob || m.in_eventq
        });
        if still_member {
            return None;
        }
        let slot = self.slots.get_mut(id.0 as usize)?;
        let uop = slot.take()?;
        self.free.push(id.0);
        Some(uop)
    }

    /// Number of live uops currently in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns `true` if the pool holds no live uops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
