//! C6 — the event queue: deferred uop completion ordered by cycle-stamp.
//!
//! New construction (spec.md §3/§4.6): a min-priority queue of `(when,
//! di_seq)`, drained by writeback whenever its head is due. Built on
//! `std::collections::BinaryHeap` wrapped in `Reverse`, following the
//! teacher's preference for standard-library collections over hand-rolled
//! data structures (`core/pipeline/backend/inorder/issue.rs`'s `VecDeque`).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::common::{DiSeq, UopId};

/// A scheduled completion: `uop` becomes `completed` at cycle `when`, unless
/// it is a memory uop — see the writeback quirk documented on
/// `EventQueue::pop_due`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Event {
    when: u64,
    di_seq: DiSeq,
    uop: UopId,
    /// Memory uops overwrite `when` to the draining cycle at dequeue time
    /// (spec.md §9 Open Questions; confirmed against `original_source/
    /// stg-writeback.c`), so they always win same-cycle completion ordering
    /// against non-memory uops. This flag lets `pop_due` apply that quirk.
    is_memory: bool,
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.when, self.di_seq).cmp(&(other.when, other.di_seq))
    }
}

/// Min-priority queue of in-flight uops awaiting writeback, ordered by
/// `(when, di_seq)` (spec.md §3, §5: ties broken by the older uop first).
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
    len: usize,
}

impl EventQueue {
    /// Creates an empty event queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `uop`'s completion at cycle `when`.
    pub fn schedule(&mut self, uop: UopId, di_seq: DiSeq, when: u64, is_memory: bool) {
        self.heap.push(Reverse(Event {
            when,
            di_seq,
            uop,
            is_memory,
        }));
        self.len += 1;
    }

    /// Removes and returns every uop whose completion is due at or before
    /// `now`, oldest-`di_seq`-first on ties.
    ///
    /// Memory uops have `when` overwritten to `now` at the moment they are
    /// dequeued (the writeback quirk, spec.md §9): a memory uop popped here
    /// is *always* due, regardless of the `when` it was scheduled with, so
    /// it can never be skipped by this drain.
    pub fn pop_due(&mut self, now: u64) -> Vec<UopId> {
        let mut due = Vec::new();
        while let Some(Reverse(event)) = self.heap.peek() {
            let effective_when = if event.is_memory { now } else { event.when };
            if effective_when > now {
                break;
            }
            let Reverse(event) = self.heap.pop().expect("peeked event must pop");
            self.len -= 1;
            due.push(event.uop);
        }
        due
    }

    /// Number of uops currently scheduled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no uop is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every scheduled event belonging to `uops` (recovery purge,
    /// C14). `O(n)` in queue size; recovery is not a hot path.
    pub fn purge(&mut self, uops: &std::collections::HashSet<UopId>) {
        let kept: Vec<Reverse<Event>> = self
            .heap
            .drain()
            .filter(|Reverse(e)| !uops.contains(&e.uop))
            .collect();
        self.len = kept.len();
        self.heap = kept.into_iter().collect();
    }
}
