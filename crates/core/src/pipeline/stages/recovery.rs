//! C14 — recovery: squashes a thread's speculative state after a branch
//! misprediction and restarts its frontend from the correct path (spec.md
//! §4.9).
//!
//! No teacher module generalizes directly (the teacher has no speculative
//! execution to unwind); grounded on spec.md §4.9's squash protocol, reusing
//! `RegFile::undo_rename` and every queue's `purge` the way C9-C13 already
//! use their `push`/`remove` counterparts. Walking the ROB tail toward head
//! while `Uop::specmode` holds relies on the same flag fetch/dispatch stamp
//! uops with under `ThreadState::in_specmode`: everything younger than the
//! mispredicted branch is speculative, the branch itself (and everything
//! older) is not, so the walk stops exactly at the boundary without needing
//! to know the triggering uop's id. Purge order is `fetchq -> uopq -> iq/lq/
//! sq -> eventq`, then the ROB tail walk, matching the original
//! implementation's recovery routine; each undone ROB entry first marks its
//! new physical outputs non-pending before unmapping them, though with this
//! crate's `RegFile` that step is inert (a freed register's `pending` bit is
//! unconditionally reset by its next `rename`) and kept only for fidelity
//! with that ordering. The original implementation also gates the final
//! `ctx.recover()` call on the context having actually diverged at the OS
//! level; this crate takes the licensed simplification of always calling it,
//! since `Frontend::recover` carries no per-squash divergence signal other
//! than `resume_eip` for an implementation to gate on, and `ScriptedFrontend`
//! never reports `ContextStatus::Specmode` itself.

use std::collections::HashSet;

use crate::common::{ThreadId, UopId};
use crate::config::Config;
use crate::context::ContextTable;
use crate::events::EventAction;
use crate::pipeline::core::Core;
use crate::regfile::class_of;
use crate::stats::Stats;

/// Squashes `thread`'s speculative state and restarts its frontend at
/// `resume_eip`. `resume_eip` is the triggering branch's actual next `eip`,
/// already known to the caller (writeback's or commit's misprediction
/// report) before this runs.
#[allow(clippy::too_many_arguments)]
pub fn run(
    core: &mut Core,
    contexts: &mut ContextTable,
    cfg: &Config,
    stats: &mut Stats,
    thread: ThreadId,
    resume_eip: u64,
    cycle: u64,
) {
    let idx = thread.0 as usize;

    let mut purge_set: HashSet<UopId> = HashSet::new();
    for slot in core.threads[idx].fetchq.drain(..) {
        purge_set.extend(slot.uops);
    }
    purge_set.extend(core.threads[idx].uopq.drain(..));

    let in_flight: HashSet<UopId> = core
        .owner_thread
        .iter()
        .filter(|(uid, &owner)| owner == thread && core.pool.get(**uid).is_some_and(|u| u.specmode))
        .map(|(&uid, _)| uid)
        .collect();
    purge_iq_lq_sq_eventq(core, &in_flight);
    purge_set.extend(in_flight);

    purge_set.extend(undo_rob_tail(core, thread));

    core.awaiting_memory.retain(|a| !purge_set.contains(&a.uop));

    for uid in &purge_set {
        core.owner_thread.remove(uid);
        if core.pool.get(*uid).is_some_and(crate::uop::Uop::is_control) {
            stats.thread_mut(core.id, thread).branch.squashed += 1;
        }
        if let Some(uop) = core.pool.get_mut(*uid) {
            uop.membership = crate::uop::Membership::default();
        }
        core.emit(cycle, *uid, EventAction::Squash);
        core.pool.try_free(*uid);
    }

    core.threads[idx].unresolved_branches = 0;
    core.threads[idx].fetchq_bytes = 0;

    if let Some(ctx) = core.threads[idx].ctx {
        if let Some(frontend) = contexts.get_mut(ctx) {
            frontend.recover(resume_eip);
            core.threads[idx].fetch_eip = frontend.eip();
        }
    }
    core.threads[idx].fetch_stall_until = cycle + cfg.general.recover_penalty;
    core.threads[idx].icache_pending = None;
}

/// Removes every entry owned by `in_flight` from the IQ/LQ/SQ/event queue,
/// across however many bank instances this core's `Queues` config gives it.
/// `in_flight` already names every uop to squash regardless of which one of
/// these four structures happens to hold it, so the caller clears membership
/// flags wholesale afterward rather than this function tracking precisely
/// which structure each id came out of.
fn purge_iq_lq_sq_eventq(core: &mut Core, in_flight: &HashSet<UopId>) {
    for inst in core.iq.instances_mut() {
        inst.purge(in_flight);
    }
    for inst in core.lq.instances_mut() {
        inst.purge(in_flight);
    }
    for inst in core.sq.instances_mut() {
        inst.purge(in_flight);
    }
    core.eventq.purge(in_flight);
}

/// Pops `thread`'s ROB tail toward the head, undoing rename for every
/// speculative entry, stopping at (and leaving in place) the first entry
/// that isn't. Returns every popped uop's id.
fn undo_rob_tail(core: &mut Core, thread: ThreadId) -> Vec<UopId> {
    let mut popped = Vec::new();
    loop {
        let Some(entry) = core.rob.peek_tail(thread) else {
            break;
        };
        let Some(uop) = core.pool.get(entry.uop) else {
            core.rob.pop_tail(thread);
            popped.push(entry.uop);
            continue;
        };
        if !uop.specmode {
            break;
        }

        let outputs: Vec<_> = uop
            .rename
            .logical_outputs
            .iter()
            .zip(uop.rename.phys_outputs.iter())
            .zip(uop.rename.prev_phys_outputs.iter())
            .map(|((&l, &new_p), &prev_p)| (l, new_p, prev_p))
            .collect();

        let owner = core.owner_thread.get(&entry.uop).copied().unwrap_or(thread);
        let rf = core.rf.get_mut(owner.0 as usize);
        for (logical, new_p, prev_p) in outputs {
            let file = rf.file_mut(class_of(logical));
            file.mark_ready(new_p);
            file.undo_rename(logical, new_p, prev_p);
        }

        core.rob.pop_tail(thread);
        if let Some(uop) = core.pool.get_mut(entry.uop) {
            uop.membership.in_rob = false;
        }
        popped.push(entry.uop);
    }
    popped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CoreId, ContextId, DiSeq, RobTag, Seq};
    use crate::frontend::scripted::ScriptedFrontend;
    use crate::uop::{logical, LogicalReg, MemoryInfo, Membership, PredictorMeta, RenameInfo, Uop, UopFlags, UopStatus, UopTimestamps};

    fn make_core() -> Core {
        Core::new(CoreId(0), &Config::default()).unwrap()
    }

    fn speculative_uop(core: &mut Core, thread: ThreadId, logical: LogicalReg) -> UopId {
        let (new_p, old_p) = core
            .rf
            .get_mut(thread.0 as usize)
            .int
            .rename(logical)
            .unwrap();
        let uop = Uop {
            opcode: 1,
            flags: UopFlags::INT,
            ctx: ContextId(thread.0),
            seq: Seq(0),
            di_seq: Some(DiSeq(0)),
            eip: 0x2000,
            pred_neip: 0x2004,
            target_neip: 0x2004,
            neip: 0x2004,
            mop_size: 4,
            specmode: true,
            membership: Membership {
                in_rob: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo {
                logical_outputs: vec![logical],
                phys_outputs: vec![new_p],
                prev_phys_outputs: vec![old_p],
                ..RenameInfo::default()
            },
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.rob.push(RobTag(0), uid, thread);
        core.owner_thread.insert(uid, thread);
        uid
    }

    #[test]
    fn squash_undoes_speculative_rename_and_restores_the_rat() {
        let mut core = make_core();
        let thread = ThreadId(0);
        let logical_reg = logical::gpr(3);
        let before = core.rf.get(0).int.lookup(logical_reg);
        let uid = speculative_uop(&mut core, thread, logical_reg);
        assert_ne!(core.rf.get(0).int.lookup(logical_reg), before);

        let mut contexts = ContextTable::new();
        let ctx = contexts.insert(0x1000, Box::new(ScriptedFrontend::new(vec![])));
        core.threads[0].bind(ctx, 0x1000);
        core.threads[0].unresolved_branches = 1;

        let cfg = Config::default();
        let mut stats = Stats::new();
        run(&mut core, &mut contexts, &cfg, &mut stats, thread, 0x3000, 10);

        assert_eq!(core.rf.get(0).int.lookup(logical_reg), before);
        assert!(core.pool.get(uid).is_none());
        assert!(core.rob.is_empty(thread));
        assert_eq!(core.threads[0].unresolved_branches, 0);
        assert_eq!(core.threads[0].fetch_stall_until, 10 + cfg.general.recover_penalty);
    }

    #[test]
    fn squash_clears_fetchq_and_uopq_wholesale() {
        let mut core = make_core();
        let thread = ThreadId(0);
        let uid = core.pool.insert(Uop {
            opcode: 1,
            flags: UopFlags::INT,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: None,
            eip: 0x4000,
            pred_neip: 0x4004,
            target_neip: 0x4004,
            neip: 0x4004,
            mop_size: 4,
            specmode: true,
            membership: Membership {
                in_uopq: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo::default(),
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        });
        core.threads[0].uopq.push_back(uid);

        let mut contexts = ContextTable::new();
        let ctx = contexts.insert(0x1000, Box::new(ScriptedFrontend::new(vec![])));
        core.threads[0].bind(ctx, 0x1000);

        let cfg = Config::default();
        let mut stats = Stats::new();
        run(&mut core, &mut contexts, &cfg, &mut stats, thread, 0x3000, 1);

        assert!(core.threads[0].uopq.is_empty());
        assert!(core.pool.get(uid).is_none());
    }

    #[test]
    fn squashing_a_speculative_control_uop_counts_it_in_branch_stats() {
        let mut core = make_core();
        let thread = ThreadId(0);
        let uid = core.pool.insert(Uop {
            opcode: 1,
            flags: UopFlags::CTRL | UopFlags::COND,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: None,
            eip: 0x4000,
            pred_neip: 0x4004,
            target_neip: 0x4004,
            neip: 0x4004,
            mop_size: 4,
            specmode: true,
            membership: Membership {
                in_uopq: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo::default(),
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        });
        core.threads[0].uopq.push_back(uid);

        let mut contexts = ContextTable::new();
        let ctx = contexts.insert(0x1000, Box::new(ScriptedFrontend::new(vec![])));
        core.threads[0].bind(ctx, 0x1000);

        let cfg = Config::default();
        let mut stats = Stats::new();
        run(&mut core, &mut contexts, &cfg, &mut stats, thread, 0x3000, 1);

        assert_eq!(stats.thread_mut(core.id, thread).branch.squashed, 1);
    }
}
