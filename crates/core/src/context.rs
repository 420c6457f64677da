//! The context table: the `Simulator`'s registry of guest contexts, each a
//! boxed [`Frontend`] plus whatever the scheduler needs to know about it.
//!
//! No teacher module generalizes to this directly (the teacher runs exactly
//! one always-resident guest); grounded on spec.md §3's `Context` record and
//! styled after the slab-with-stable-key approach `uop.rs` already uses,
//! since a `ContextId` must stay valid across a context's entire lifetime
//! the same way a `UopId` does.

use crate::common::ContextId;
use crate::frontend::{ContextStatus, Frontend};

/// Every guest context the simulator knows about, indexed by `ContextId`.
/// A context is never removed once registered (only reported `Finished`),
/// so ids stay stable for the run's lifetime.
#[derive(Default)]
pub struct ContextTable {
    contexts: Vec<Option<Box<dyn Frontend>>>,
    entry_eip: Vec<u64>,
}

impl ContextTable {
    /// Builds an empty context table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new context, returning the stable id it will be known by.
    pub fn insert(&mut self, entry_eip: u64, frontend: Box<dyn Frontend>) -> ContextId {
        let id = ContextId(self.contexts.len() as u32);
        self.contexts.push(Some(frontend));
        self.entry_eip.push(entry_eip);
        id
    }

    /// The guest entry point `ctx` should start fetching from once bound to
    /// a hardware thread.
    #[must_use]
    pub fn entry_eip(&self, ctx: ContextId) -> u64 {
        self.entry_eip[ctx.0 as usize]
    }

    /// Read-only access to `ctx`'s frontend.
    #[must_use]
    pub fn get(&self, ctx: ContextId) -> Option<&dyn Frontend> {
        self.contexts.get(ctx.0 as usize).and_then(|c| c.as_deref())
    }

    /// Mutable access to `ctx`'s frontend.
    pub fn get_mut(&mut self, ctx: ContextId) -> Option<&mut (dyn Frontend + 'static)> {
        self.contexts
            .get_mut(ctx.0 as usize)
            .and_then(|c| c.as_deref_mut())
    }

    /// `ctx`'s current run state.
    #[must_use]
    pub fn status(&self, ctx: ContextId) -> Option<ContextStatus> {
        self.get(ctx).map(Frontend::status)
    }

    /// Every registered context id, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = ContextId> + '_ {
        (0..self.contexts.len()).map(|i| ContextId(i as u32))
    }

    /// `true` once every registered context has reported `Finished`.
    #[must_use]
    pub fn all_finished(&self) -> bool {
        self.contexts
            .iter()
            .flatten()
            .all(|f| f.status() == ContextStatus::Finished)
    }
}
