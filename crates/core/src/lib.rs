//! Out-of-order superscalar pipeline simulator.
//!
//! Consumes pre-decoded uops from an external `Frontend` collaborator and
//! simulates everything downstream of functional decode: rename, dispatch,
//! out-of-order issue, a directory-backed coherent memory hierarchy, and
//! in-order commit with branch-misprediction recovery. Context-agnostic: any
//! number of guest contexts can be multiplexed onto a fixed set of
//! `(core, thread)` hardware slots, statically or with dynamic preemption.
//!
//! 1. **Pipeline:** per-core state (`Core`, `ThreadState`) and the six stages
//!    (fetch, decode, dispatch, issue, writeback, commit) plus the recovery
//!    protocol that drives it.
//! 2. **Memory:** the `MemoryModule` boundary, a fixed-latency stand-in, and
//!    a directory-based coherent implementation.
//! 3. **Context scheduling:** binding guest contexts to hardware threads,
//!    statically or with quantum-based preemption.
//! 4. **Simulation:** `Simulator` (owns every core, the context table, the
//!    scheduler, and the memory module), configuration, and statistics.

/// Common types and constants (ids, addresses, access kinds, errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Guest-context registry (`ContextTable`).
pub mod context;
/// Event queue (C6): deferred functional-unit completion scheduling.
pub mod eventq;
/// Optional per-cycle event trace, gated by the `trace-events` feature.
pub mod events;
/// `Frontend` boundary: the functional-ISA-emulation collaborator.
pub mod frontend;
/// Functional-unit pool (C5): per-class reservation and occupancy counters.
pub mod fu;
/// `MemoryModule` boundary and the coherence directory it exposes.
pub mod memory;
/// Branch direction/target predictor (C7): BTB, RAS, and six direction schemes.
pub mod predictor;
/// The out-of-order pipeline: per-core state (C1-C13) and the six stages
/// driving it (C9-C13), plus the C14 recovery protocol.
pub mod pipeline;
/// Issue/load/store queues (C4).
pub mod queues;
/// Reorder buffer (C3): in-order retirement bookkeeping.
pub mod rob;
/// Simulation: `Simulator` and binary/trace loading.
pub mod sim;
/// Context scheduler (C15): static/dynamic binding to hardware-thread slots.
pub mod scheduler;
/// Simulation statistics collection and reporting.
pub mod stats;
/// Trace cache (C8): post-decode uop-trace storage.
pub mod tracecache;
/// Physical register file and register alias table (C2).
pub mod regfile;
/// The uop record and its slab allocator (C1).
pub mod uop;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Guest-context registry.
pub use crate::context::ContextTable;
/// Functional-ISA-emulation boundary every guest context implements.
pub use crate::frontend::Frontend;
/// Coherent/latency memory-hierarchy boundary.
pub use crate::memory::MemoryModule;
/// Top-level simulator; owns every core, the context table, the scheduler,
/// and the memory module.
pub use crate::sim::simulator::{RunLimits, Simulator, TerminationReason};
