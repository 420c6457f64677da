//! C5 — the functional-unit pool.
//!
//! Grounded on spec.md §3/§4.5: one record per unit class, each holding
//! `count` instances whose `free_cycle` marks the next cycle that instance
//! can accept a new issue. Styled after the teacher's flat `Vec`-of-small-
//! struct preference (`core/units/cache/mod.rs`'s `lines: Vec<CacheLine>`)
//! rather than a generic object pool.

use crate::uop::UopFlags;

/// A typed latency+bandwidth functional-unit class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FuClass {
    /// Integer add/subtract/compare.
    IntAdd,
    /// Integer multiply.
    IntMult,
    /// Integer divide.
    IntDiv,
    /// Effective-address computation for memory uops.
    EffAddr,
    /// Bitwise/logical operations.
    Logic,
    /// Simple FP move/compare.
    FpSimple,
    /// FP add/subtract.
    FpAdd,
    /// FP multiply.
    FpMult,
    /// FP divide.
    FpDiv,
    /// FP transcendental/complex operations.
    FpComplex,
}

impl FuClass {
    /// All ten unit classes, in config/report order.
    pub const ALL: [Self; 10] = [
        Self::IntAdd,
        Self::IntMult,
        Self::IntDiv,
        Self::EffAddr,
        Self::Logic,
        Self::FpSimple,
        Self::FpAdd,
        Self::FpMult,
        Self::FpDiv,
        Self::FpComplex,
    ];

    /// Classifies a uop into the functional-unit class that executes it.
    ///
    /// Memory uops always reserve `EffAddr` at issue (spec.md §4.5); this
    /// classification is for the non-memory issue path and is meaningless
    /// for a uop tagged `MEM`.
    #[must_use]
    pub fn of(flags: UopFlags) -> Self {
        if flags.contains(UopFlags::MEM) {
            Self::EffAddr
        } else if flags.contains(UopFlags::LOGIC) {
            Self::Logic
        } else if flags.contains(UopFlags::FP) || flags.contains(UopFlags::XMM) {
            Self::FpSimple
        } else {
            Self::IntAdd
        }
    }
}

/// `{count, op_latency, issue_latency}` for one functional-unit class
/// (spec.md §3).
#[derive(Clone, Copy, Debug)]
pub struct FuSpec {
    /// Number of parallel instances of this class.
    pub count: u32,
    /// Cycles from issue to result availability (drives the event-queue
    /// `when` at schedule time).
    pub op_latency: u32,
    /// Cycles an instance is occupied once it accepts an issue (drives
    /// `free_cycle` advancement).
    pub issue_latency: u32,
}

impl Default for FuSpec {
    fn default() -> Self {
        Self {
            count: 1,
            op_latency: 1,
            issue_latency: 1,
        }
    }
}

/// One functional-unit class's reservation state: `free_cycle` per instance,
/// plus the per-class accounting the report output wants (§6: Accesses,
/// Denied, WaitingTime).
#[derive(Debug)]
struct FuUnit {
    spec: FuSpec,
    free_cycle: Vec<u64>,
    accesses: u64,
    denied: u64,
    waiting_time: u64,
}

impl FuUnit {
    fn new(spec: FuSpec) -> Self {
        Self {
            free_cycle: vec![0; spec.count.max(1) as usize],
            spec,
            accesses: 0,
            denied: 0,
            waiting_time: 0,
        }
    }

    /// Picks the instance with the smallest `free_cycle` that is `<= now`;
    /// reserves it through `now + issue_latency` and returns its index.
    fn try_reserve(&mut self, now: u64) -> Option<usize> {
        let (idx, &free_at) = self
            .free_cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, f)| **f)?;
        if free_at > now {
            self.denied += 1;
            self.waiting_time += free_at - now;
            return None;
        }
        self.free_cycle[idx] = now + u64::from(self.spec.issue_latency);
        self.accesses += 1;
        Some(idx)
    }
}

/// Per-core functional-unit pool: one `FuUnit` record per class.
#[derive(Debug)]
pub struct FuPool {
    units: [FuUnit; 10],
}

impl FuPool {
    /// Builds a pool from a per-class spec table (one entry per `FuClass::ALL`).
    #[must_use]
    pub fn new(specs: [FuSpec; 10]) -> Self {
        let mut iter = specs.into_iter().map(FuUnit::new);
        Self {
            units: std::array::from_fn(|_| iter.next().unwrap_or_else(|| FuUnit::new(FuSpec::default()))),
        }
    }

    fn index_of(class: FuClass) -> usize {
        FuClass::ALL.iter().position(|c| *c == class).unwrap_or(0)
    }

    /// Attempts to reserve an instance of `class` at cycle `now`. On success,
    /// returns the `op_latency` the caller should use to schedule completion
    /// (spec.md §4.5: "insert into event queue with `when = current_cycle +
    /// op_latency`"). On failure the caller should record a `denied[class]`
    /// stall and retry next cycle.
    pub fn try_reserve(&mut self, class: FuClass, now: u64) -> Option<u32> {
        let unit = &mut self.units[Self::index_of(class)];
        unit.try_reserve(now)?;
        Some(unit.spec.op_latency)
    }

    /// Report-facing counters for `class`: `(accesses, denied, waiting_time)`.
    #[must_use]
    pub fn counters(&self, class: FuClass) -> (u64, u64, u64) {
        let unit = &self.units[Self::index_of(class)];
        (unit.accesses, unit.denied, unit.waiting_time)
    }
}
