//! Memory access classification.

/// Kind of access a memory uop issues to the `MemoryModule` collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Instruction-stream fetch (used by the trace-cache fill path).
    Fetch,
    /// Data load.
    Load,
    /// Data store.
    Store,
    /// Software prefetch; retires without participating in coherence state
    /// changes (`UopFlags::PREFETCH`, see `uop.rs`).
    Prefetch,
}
