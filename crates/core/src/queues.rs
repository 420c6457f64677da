//! C4 — instruction queue, load queue, store queue.
//!
//! The issue queue is a new sibling of the store queue, which in turn keeps
//! the circular-buffer shape of the teacher's `core/pipeline/store_buffer.rs`
//! almost unchanged: `allocate`/`resolve`/`forward_load`/`flush_after` and
//! the address-overlap forwarding math are reused directly, generalized from
//! inlined RISC-V operands to `UopId` lookups into `UopPool`. All three
//! queues are `Vec<UopId>` ordered by `di_seq` (program/dispatch order);
//! occupancy is checked against list length at every cycle boundary per
//! spec.md §8 invariant 1.

use std::collections::HashSet;

use crate::common::{PhysAddr, UopId};

/// Non-memory uops awaiting wakeup/select (spec.md §3, §4.5).
#[derive(Debug, Default)]
pub struct IssueQueue {
    entries: Vec<UopId>,
    capacity: usize,
}

impl IssueQueue {
    /// Builds an issue queue admitting up to `capacity` outstanding uops.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// `true` if a dispatching uop can be admitted.
    #[must_use]
    pub fn has_free_entry(&self) -> bool {
        self.entries.len() < self.capacity
    }

    /// Admits `uop` at the tail (dispatch order).
    pub fn push(&mut self, uop: UopId) {
        self.entries.push(uop);
    }

    /// Removes `uop` once it has issued, preserving the relative order of
    /// the remainder.
    pub fn remove(&mut self, uop: UopId) {
        self.entries.retain(|&u| u != uop);
    }

    /// Removes and returns every entry whose id is in `purge_set` (recovery).
    pub fn purge(&mut self, purge_set: &HashSet<UopId>) -> Vec<UopId> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.entries.iter().partition(|u| purge_set.contains(u));
        self.entries = kept;
        removed
    }

    /// Uops currently resident, oldest (dispatch order) first.
    #[must_use]
    pub fn entries(&self) -> &[UopId] {
        &self.entries
    }

    /// Number of uops currently resident.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no uop is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One outstanding load, tracked by the load queue (spec.md §3, §4.5).
#[derive(Clone, Copy, Debug)]
struct LoadEntry {
    uop: UopId,
    addr: Option<PhysAddr>,
    size: u8,
}

/// Loads awaiting address resolution and then issue, ordered by dispatch
/// sequence (program order) for store-to-load ordering checks.
#[derive(Debug, Default)]
pub struct LoadQueue {
    entries: Vec<LoadEntry>,
    capacity: usize,
}

impl LoadQueue {
    /// Builds a load queue admitting up to `capacity` outstanding loads.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// `true` if a dispatching load can be admitted.
    #[must_use]
    pub fn has_free_entry(&self) -> bool {
        self.entries.len() < self.capacity
    }

    /// Admits a load at program-order tail; its address is unresolved until
    /// `resolve_address` is called by the issue stage.
    pub fn push(&mut self, uop: UopId) {
        self.entries.push(LoadEntry {
            uop,
            addr: None,
            size: 0,
        });
    }

    /// Records the resolved effective address for `uop` (computed by an
    /// `EffAddr` functional-unit reservation at issue).
    pub fn resolve_address(&mut self, uop: UopId, addr: PhysAddr, size: u8) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.uop == uop) {
            e.addr = Some(addr);
            e.size = size;
        }
    }

    /// Returns `true` if no older store (lower position in program order,
    /// since both queues are kept in dispatch order) has an unresolved
    /// address overlapping this load — spec.md §4.5's store-to-load
    /// ordering rule. A load with no position in `older_store_addrs` (i.e.
    /// every older store has resolved) may always issue.
    #[must_use]
    pub fn may_issue(uop: UopId, addr: PhysAddr, size: u8, older_stores: &[StoreEntryView]) -> bool {
        for store in older_stores {
            match store.addr {
                None => return false,
                Some(saddr) => {
                    if ranges_overlap(addr, size, saddr, store.size) {
                        return false;
                    }
                }
            }
        }
        let _ = uop;
        true
    }

    /// Removes `uop` once it has issued.
    pub fn remove(&mut self, uop: UopId) {
        self.entries.retain(|e| e.uop != uop);
    }

    /// Removes and returns every entry whose id is in `purge_set` (recovery).
    pub fn purge(&mut self, purge_set: &HashSet<UopId>) -> Vec<UopId> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.entries.iter().partition(|e| purge_set.contains(&e.uop));
        self.entries = kept;
        removed.into_iter().map(|e| e.uop).collect()
    }

    /// Uops currently resident, oldest (dispatch order) first.
    #[must_use]
    pub fn uops(&self) -> impl Iterator<Item = UopId> + '_ {
        self.entries.iter().map(|e| e.uop)
    }

    /// Number of loads currently resident.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no load is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only view of a store queue entry exposed to the load queue's
/// ordering check, avoiding a direct dependency from `LoadQueue` on
/// `StoreQueue`'s internals.
#[derive(Clone, Copy, Debug)]
pub struct StoreEntryView {
    /// Resolved address, or `None` if the store's address has not yet been
    /// computed.
    pub addr: Option<PhysAddr>,
    /// Access size in bytes.
    pub size: u8,
}

fn ranges_overlap(a_addr: PhysAddr, a_size: u8, b_addr: PhysAddr, b_size: u8) -> bool {
    let a_lo = a_addr.val();
    let a_hi = a_lo + u64::from(a_size.max(1));
    let b_lo = b_addr.val();
    let b_hi = b_lo + u64::from(b_size.max(1));
    a_lo < b_hi && b_lo < a_hi
}

/// One outstanding store, tracked by the store queue. Stores complete their
/// address/data resolution at issue but only update the coherence directory
/// at commit (spec.md §4.5).
#[derive(Clone, Copy, Debug)]
struct StoreEntry {
    uop: UopId,
    addr: Option<PhysAddr>,
    size: u8,
}

/// Stores awaiting address resolution, then issue, then commit-time
/// directory update. Kept in dispatch order for store-to-load forwarding.
#[derive(Debug, Default)]
pub struct StoreQueue {
    entries: Vec<StoreEntry>,
    capacity: usize,
}

impl StoreQueue {
    /// Builds a store queue admitting up to `capacity` outstanding stores.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// `true` if a dispatching store can be admitted.
    #[must_use]
    pub fn has_free_entry(&self) -> bool {
        self.entries.len() < self.capacity
    }

    /// Admits a store at program-order tail.
    pub fn push(&mut self, uop: UopId) {
        self.entries.push(StoreEntry {
            uop,
            addr: None,
            size: 0,
        });
    }

    /// Records the resolved effective address for `uop`.
    pub fn resolve_address(&mut self, uop: UopId, addr: PhysAddr, size: u8) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.uop == uop) {
            e.addr = Some(addr);
            e.size = size;
        }
    }

    /// Returns views of every store older (earlier in dispatch order) than
    /// `uop`, for the load queue's ordering check.
    #[must_use]
    pub fn older_than(&self, uop: UopId) -> Vec<StoreEntryView> {
        let mut out = Vec::new();
        for e in &self.entries {
            if e.uop == uop {
                break;
            }
            out.push(StoreEntryView {
                addr: e.addr,
                size: e.size,
            });
        }
        out
    }

    /// Forwards store data to a load whose address range matches the most
    /// recent overlapping older store — the store-to-load forwarding path
    /// the teacher's `StoreBuffer::forward_load` implements; surfaced here
    /// as a membership query, since this crate does not model the value
    /// domain's bit patterns (the `Frontend` owns actual data values).
    #[must_use]
    pub fn forwarding_store_for(&self, uop: UopId, addr: PhysAddr, size: u8) -> Option<UopId> {
        let mut found = None;
        for e in &self.entries {
            if e.uop == uop {
                break;
            }
            if let Some(saddr) = e.addr {
                if ranges_overlap(addr, size, saddr, e.size) {
                    found = Some(e.uop);
                }
            }
        }
        found
    }

    /// Removes `uop` once it has committed (directory update applied).
    pub fn remove(&mut self, uop: UopId) {
        self.entries.retain(|e| e.uop != uop);
    }

    /// Removes and returns every entry whose id is in `purge_set` (recovery).
    pub fn purge(&mut self, purge_set: &HashSet<UopId>) -> Vec<UopId> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.entries.iter().partition(|e| purge_set.contains(&e.uop));
        self.entries = kept;
        removed.into_iter().map(|e| e.uop).collect()
    }

    /// Uops currently resident, oldest (dispatch order) first.
    #[must_use]
    pub fn uops(&self) -> impl Iterator<Item = UopId> + '_ {
        self.entries.iter().map(|e| e.uop)
    }

    /// Number of stores currently resident.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no store is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
