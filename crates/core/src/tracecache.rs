//! Trace cache: C8. Set-associative storage of post-decode uop traces,
//! built opportunistically at commit and probed at fetch (spec.md §3,
//! §4.10), grounded on the teacher's set-associative cache sets in
//! `core/units/cache/mod.rs` but keyed by `eip` rather than a physical
//! address and storing traces rather than lines.

use crate::common::ConfigError;

/// Maximum embedded macro-instruction addresses a trace can record; bounded
/// by `trace_size` at construction.
const MAX_MOPS: usize = 16;

/// A completed uop trace: the committed uops of a thread accumulated since
/// the last trace boundary (spec.md §3).
#[derive(Clone, Debug)]
pub struct Trace {
    /// `eip` of the trace's first macro-instruction; the lookup key.
    pub tag: u64,
    pub uop_count: u32,
    pub mop_count: u32,
    /// Bit `i` set iff the trace's `i`-th control-flow uop is a branch slot.
    pub branch_mask: u32,
    /// Bit `i` holds the recorded direction of the `i`-th branch slot.
    pub branch_flags: u32,
    pub branch_count: u32,
    pub fall_through_eip: u64,
    pub target_eip: u64,
    pub mop_eip: Vec<u64>,
}

struct Entry {
    trace: Option<Trace>,
    lru: u64,
}

/// Set-associative trace cache.
pub struct TraceCache {
    sets: Vec<Vec<Entry>>,
    num_sets: usize,
    assoc: usize,
    trace_size: u32,
    branch_max: u32,
    clock: u64,
}

impl TraceCache {
    /// Builds a trace cache with `sets * assoc` entries. Rejects a
    /// `trace_size` larger than the internal per-trace `mop_eip` capacity.
    pub fn new(
        sets: usize,
        assoc: usize,
        trace_size: u32,
        branch_max: u32,
    ) -> Result<Self, ConfigError> {
        if trace_size as usize > MAX_MOPS {
            return Err(ConfigError::OutOfRange {
                section: "TraceCache".to_owned(),
                key: "TraceSize".to_owned(),
                value: trace_size.to_string(),
                bound: format!("<= {MAX_MOPS}"),
            });
        }
        let sets = sets.max(1).next_power_of_two();
        let assoc = assoc.max(1);
        Ok(Self {
            sets: (0..sets)
                .map(|_| {
                    (0..assoc)
                        .map(|_| Entry {
                            trace: None,
                            lru: 0,
                        })
                        .collect()
                })
                .collect(),
            num_sets: sets,
            assoc,
            trace_size,
            branch_max,
            clock: 0,
        })
    }

    fn set_index(&self, eip: u64) -> usize {
        ((eip >> 2) as usize) & (self.num_sets - 1)
    }

    /// Looks up a trace starting at `eip` whose recorded `branch_flags`
    /// match `predicted_flags` for its `branch_count` branch slots (spec.md
    /// §4.10: "a prediction that follows the recorded `branch_flags`").
    #[must_use]
    pub fn lookup(&mut self, eip: u64, predicted_flags: u32) -> Option<&Trace> {
        self.clock += 1;
        let idx = self.set_index(eip);
        let clock = self.clock;
        let set = &mut self.sets[idx];
        let hit = set.iter_mut().find(|e| {
            e.trace.as_ref().is_some_and(|t| {
                t.tag == eip
                    && (predicted_flags & mask(t.branch_count)) == (t.branch_flags & mask(t.branch_count))
            })
        });
        hit.map(|e| {
            e.lru = clock;
            e.trace.as_ref().unwrap()
        })
    }

    /// Looks up a trace starting at `eip` ignoring `branch_flags` entirely —
    /// the tag-only phase of fetch's two-phase probe (spec.md §4.10), used
    /// to recover a candidate's own `branch_mask`/`mop_eip` so fetch can ask
    /// the branch predictor for `predicted_flags` before the real, flags-
    /// qualified `lookup`. Does not touch LRU state: a tag-only peek is not
    /// a cache access in its own right.
    #[must_use]
    pub fn peek_tag(&self, eip: u64) -> Option<&Trace> {
        let idx = self.set_index(eip);
        self.sets[idx]
            .iter()
            .find_map(|e| e.trace.as_ref().filter(|t| t.tag == eip))
    }

    /// Installs `trace`, evicting the LRU way of its set on a capacity miss.
    /// Rejects traces that violate the component invariants (`branch_count
    /// <= branch_max`, `uop_count <= trace_size`).
    pub fn install(&mut self, trace: Trace) {
        debug_assert!(trace.branch_count <= self.branch_max);
        debug_assert!(trace.uop_count <= self.trace_size);
        self.clock += 1;
        let idx = self.set_index(trace.tag);
        let clock = self.clock;
        let set = &mut self.sets[idx];
        let way = set
            .iter()
            .position(|e| e.trace.as_ref().is_some_and(|t| t.tag == trace.tag))
            .unwrap_or_else(|| {
                set.iter()
                    .enumerate()
                    .min_by_key(|(_, e)| if e.trace.is_some() { e.lru } else { 0 })
                    .map_or(0, |(i, _)| i)
            });
        set[way] = Entry {
            trace: Some(trace),
            lru: clock,
        };
    }

    /// Maximum uops a trace under construction may accumulate.
    #[must_use]
    pub fn trace_size(&self) -> u32 {
        self.trace_size
    }

    /// Maximum branch slots a trace under construction may accumulate.
    #[must_use]
    pub fn branch_max(&self) -> u32 {
        self.branch_max
    }

    /// Total way count (`sets * assoc`).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.num_sets * self.assoc
    }
}

fn mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// Accumulator for the trace under construction for one thread, filled
/// uop-by-uop at commit and terminated per spec.md §4.10's boundary
/// conditions (branch-max reached, trace-size reached, indirect branch or
/// return, explicit flush).
#[derive(Default)]
pub struct TraceBuilder {
    tag: Option<u64>,
    mop_eip: Vec<u64>,
    branch_mask: u32,
    branch_flags: u32,
    branch_count: u32,
    fall_through_eip: u64,
    target_eip: u64,
}

impl TraceBuilder {
    /// Appends one committed uop's `eip`. If a branch, `taken`/`target` give
    /// its resolved direction and target.
    pub fn push(&mut self, eip: u64, mop_size: u64, is_branch: bool, taken: bool, target: u64) {
        if self.tag.is_none() {
            self.tag = Some(eip);
        }
        let slot = self.mop_eip.len() as u32;
        self.mop_eip.push(eip);
        if is_branch {
            self.branch_mask |= 1 << slot;
            if taken {
                self.branch_flags |= 1 << slot;
            }
            self.branch_count += 1;
            self.target_eip = target;
            self.fall_through_eip = eip + mop_size;
        } else {
            self.fall_through_eip = eip + mop_size;
        }
    }

    /// True once the accumulator has reached either boundary condition and
    /// should be finalized.
    #[must_use]
    pub fn is_full(&self, trace_size: u32, branch_max: u32) -> bool {
        self.mop_eip.len() as u32 >= trace_size || self.branch_count >= branch_max
    }

    /// Whether any uop has been accumulated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mop_eip.is_empty()
    }

    /// Finalizes the accumulator into an installable `Trace`, resetting the
    /// builder for the next trace.
    pub fn take(&mut self) -> Option<Trace> {
        let tag = self.tag.take()?;
        let mop_eip = std::mem::take(&mut self.mop_eip);
        let trace = Trace {
            tag,
            uop_count: mop_eip.len() as u32,
            mop_count: mop_eip.len() as u32,
            branch_mask: self.branch_mask,
            branch_flags: self.branch_flags,
            branch_count: self.branch_count,
            fall_through_eip: self.fall_through_eip,
            target_eip: self.target_eip,
            mop_eip,
        };
        self.branch_mask = 0;
        self.branch_flags = 0;
        self.branch_count = 0;
        Some(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_with_matching_branch_flags() {
        let mut tc = TraceCache::new(4, 2, 8, 2).unwrap();
        assert!(tc.lookup(0x1000, 0).is_none());
        tc.install(Trace {
            tag: 0x1000,
            uop_count: 3,
            mop_count: 3,
            branch_mask: 0b1,
            branch_flags: 0b1,
            branch_count: 1,
            fall_through_eip: 0x1010,
            target_eip: 0x2000,
            mop_eip: vec![0x1000, 0x1004, 0x1008],
        });
        assert!(tc.lookup(0x1000, 0b1).is_some());
    }

    #[test]
    fn hit_requires_matching_branch_flags() {
        let mut tc = TraceCache::new(4, 2, 8, 2).unwrap();
        tc.install(Trace {
            tag: 0x1000,
            uop_count: 2,
            mop_count: 2,
            branch_mask: 0b1,
            branch_flags: 0b1,
            branch_count: 1,
            fall_through_eip: 0x1008,
            target_eip: 0x2000,
            mop_eip: vec![0x1000, 0x1004],
        });
        assert!(tc.lookup(0x1000, 0b0).is_none());
    }

    #[test]
    fn lru_evicts_within_a_full_set() {
        let mut tc = TraceCache::new(1, 2, 8, 4).unwrap();
        let mk = |tag: u64| Trace {
            tag,
            uop_count: 1,
            mop_count: 1,
            branch_mask: 0,
            branch_flags: 0,
            branch_count: 0,
            fall_through_eip: tag + 4,
            target_eip: 0,
            mop_eip: vec![tag],
        };
        tc.install(mk(0x1000));
        tc.install(mk(0x2000));
        // Touch 0x1000 so 0x2000 is now the LRU way.
        assert!(tc.lookup(0x1000, 0).is_some());
        tc.install(mk(0x3000));
        assert!(tc.lookup(0x2000, 0).is_none());
        assert!(tc.lookup(0x1000, 0).is_some());
        assert!(tc.lookup(0x3000, 0).is_some());
    }

    #[test]
    fn builder_terminates_at_branch_max() {
        let mut b = TraceBuilder::default();
        b.push(0x1000, 4, true, true, 0x2000);
        assert!(b.is_full(8, 1));
        let trace = b.take().unwrap();
        assert_eq!(trace.branch_count, 1);
        assert_eq!(trace.target_eip, 0x2000);
        assert!(b.is_empty());
    }

    #[test]
    fn new_rejects_trace_size_over_capacity() {
        assert!(TraceCache::new(4, 2, 64, 4).is_err());
    }
}
