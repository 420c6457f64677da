//! The out-of-order pipeline: per-core state (`core`, `thread`), the six
//! stages that advance it (`stages`, C9-C13), and the C14 recovery protocol
//! (`stages::recovery`).
//!
//! [`run_core_cycle`] is the stage driver spec.md §4.1 describes: every
//! stage runs in reverse program order within one cycle (commit, writeback,
//! issue, dispatch, decode, fetch) so a single uop can never cross two
//! stage boundaries in the same cycle.

pub mod core;
pub mod stages;
pub mod thread;

use crate::config::{Config, RecoverKind};
use crate::context::ContextTable;
use crate::memory::MemoryModule;
use crate::scheduler::ContextScheduler;
use crate::stats::Stats;

use self::core::Core;

/// Runs one core through a single cycle, stage by stage in reverse order,
/// triggering recovery at whichever stage `cfg.general.recover_kind` names
/// as the squash point (spec.md §4.9).
#[allow(clippy::too_many_arguments)]
pub fn run_core_cycle(
    core: &mut Core,
    contexts: &mut ContextTable,
    scheduler: &ContextScheduler,
    memory: &mut dyn MemoryModule,
    cfg: &Config,
    stats: &mut Stats,
    cycle: u64,
) {
    let commit_mispredicts = stages::commit::run(core, cfg, stats, cycle);
    if cfg.general.recover_kind == RecoverKind::Commit {
        for (thread, resume_eip) in commit_mispredicts {
            stages::recovery::run(core, contexts, cfg, stats, thread, resume_eip, cycle);
        }
    }

    let writeback_mispredicts = stages::writeback::run(core, memory, cycle);
    if cfg.general.recover_kind == RecoverKind::Writeback {
        for uid in writeback_mispredicts {
            let Some(thread) = core.owner_thread.get(&uid).copied() else {
                continue;
            };
            let Some(resume_eip) = core.pool.get(uid).map(|u| u.neip) else {
                continue;
            };
            stages::recovery::run(core, contexts, cfg, stats, thread, resume_eip, cycle);
        }
    }

    stages::issue::run(core, memory, cfg, stats, cycle);
    stages::dispatch::run(core, scheduler, cfg, stats, cycle);
    stages::decode::run(core, cfg, cycle);
    stages::fetch::run(core, contexts, memory, cfg, cycle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CoreId;
    use crate::memory::simple::SimpleMemoryModule;
    use crate::scheduler::{Mode, Slot};

    #[test]
    fn an_idle_core_with_no_bound_contexts_cycles_without_panicking() {
        let cfg = Config::default();
        let mut core = Core::new(CoreId(0), &cfg).unwrap();
        let mut contexts = ContextTable::new();
        let scheduler = ContextScheduler::new(
            vec![Slot {
                core: CoreId(0),
                thread: crate::common::ThreadId(0),
            }],
            Mode::Static,
            false,
        );
        let mut memory = SimpleMemoryModule::new(1);
        let mut stats = Stats::new();

        for cycle in 0..4 {
            run_core_cycle(&mut core, &mut contexts, &scheduler, &mut memory, &cfg, &mut stats, cycle);
        }
    }
}
