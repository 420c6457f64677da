//! C10 — dispatch: renames a uop's registers and admits it into the ROB
//! plus one of {issue queue, load queue, store queue} (spec.md §3, §4.4).
//!
//! Each uop runs a fixed admission-check chain before anything is mutated:
//! context eviction, source uop queue, ROB, the memory-or-non-memory
//! structure, then the register file. The first check that fails records its
//! named stall bucket (spec.md §6) and the uop stays at the head of its
//! `uopq` to retry next cycle. `Core::dispatch_rr` round-robins the shared
//! per-cycle `dispatch_width` budget fairly across threads, the same
//! bandwidth-sharing shape `fetch.rs` uses for `fetch_kind`.

use crate::common::{ThreadId, UopId};
use crate::config::{Config, StageKind};
use crate::events::EventAction;
use crate::pipeline::core::Core;
use crate::regfile::{class_of, PhysRegFile};
use crate::scheduler::ContextScheduler;
use crate::stats::Stats;
use crate::uop::{UopFlags, UopPool};

/// Runs dispatch for this cycle, spending `dispatch_width` uops of shared
/// bandwidth across whichever threads `dispatch_kind` selects.
pub fn run(
    core: &mut Core,
    scheduler: &ContextScheduler,
    cfg: &Config,
    stats: &mut Stats,
    cycle: u64,
) {
    let n = core.threads.len();
    if n == 0 {
        return;
    }
    let selected = select_threads(core, cfg);
    let mut budget = cfg.pipeline.dispatch_width;

    loop {
        if budget == 0 {
            break;
        }
        let mut progressed = false;
        for &idx in &selected {
            if budget == 0 {
                break;
            }
            if try_dispatch_one(core, scheduler, cfg, stats, idx, cycle) {
                budget -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    core.dispatch_rr = (core.dispatch_rr + 1) % n;
}

fn select_threads(core: &Core, cfg: &Config) -> Vec<usize> {
    let n = core.threads.len();
    match cfg.pipeline.dispatch_kind {
        StageKind::Shared => (0..n).collect(),
        StageKind::TimeSlice | StageKind::SwitchOnEvent => vec![core.dispatch_rr % n],
    }
}

#[allow(clippy::too_many_arguments)]
fn try_dispatch_one(
    core: &mut Core,
    scheduler: &ContextScheduler,
    cfg: &Config,
    stats: &mut Stats,
    idx: usize,
    cycle: u64,
) -> bool {
    let thread_id = ThreadId(idx as u32);
    let Some(ctx) = core.threads[idx].ctx else {
        return false;
    };
    let thread_stats = stats.thread_mut(core.id, thread_id);

    if scheduler.eviction_pending(ctx) {
        thread_stats.stalls.ctx += 1;
        return false;
    }
    let Some(&uid) = core.threads[idx].uopq.front() else {
        thread_stats.stalls.uopq += 1;
        return false;
    };
    let uop = core.pool.get(uid).expect("uopq entry must be live");
    let specmode = uop.specmode;
    let is_mem = uop.flags.contains(UopFlags::MEM);
    let is_store = is_mem && uop.flags.contains(UopFlags::STORE);
    let opcode = uop.opcode;

    if !core.rob.has_free_entry(thread_id) {
        stats.thread_mut(core.id, thread_id).stalls.rob += 1;
        return false;
    }

    if is_mem {
        if is_store {
            if !core.sq.get(idx).has_free_entry() {
                stats.thread_mut(core.id, thread_id).stalls.lsq += 1;
                return false;
            }
        } else if !core.lq.get(idx).has_free_entry() {
            stats.thread_mut(core.id, thread_id).stalls.lsq += 1;
            return false;
        }
    } else if !core.iq.get(idx).has_free_entry() {
        stats.thread_mut(core.id, thread_id).stalls.iq += 1;
        return false;
    }

    if !rename_fits(core.rf.get(idx), &core.pool, uid) {
        stats.thread_mut(core.id, thread_id).stalls.rename += 1;
        return false;
    }

    core.threads[idx].uopq.pop_front();
    perform_rename(core.rf.get_mut(idx), &mut core.pool, uid);

    let di_seq = core.pool.next_di_seq();
    let tag = core.pool.next_rob_tag();
    {
        let uop = core.pool.get_mut(uid).expect("uopq entry must be live");
        uop.di_seq = Some(di_seq);
        uop.membership.in_uopq = false;
        uop.membership.in_rob = true;
        if is_mem {
            if is_store {
                uop.membership.in_sq = true;
            } else {
                uop.membership.in_lq = true;
            }
        } else {
            uop.membership.in_iq = true;
        }
    }
    core.rob.push(tag, uid, thread_id);
    if is_mem {
        if is_store {
            core.sq.get_mut(idx).push(uid);
        } else {
            core.lq.get_mut(idx).push(uid);
        }
    } else {
        core.iq.get_mut(idx).push(uid);
    }
    core.owner_thread.insert(uid, thread_id);
    core.emit(cycle, uid, EventAction::Dispatch);

    if cfg.pipeline.occupancy_stats {
        let core_stats = stats.core_mut(core.id);
        core_stats.rob.writes += 1;
        if is_mem {
            core_stats.lsq.writes += 1;
        } else {
            core_stats.iq.writes += 1;
        }
    }

    let thread_stats = stats.thread_mut(core.id, thread_id);
    thread_stats.dispatch_hist.record(opcode);
    if specmode {
        thread_stats.stalls.spec += 1;
    } else {
        thread_stats.stalls.used += 1;
    }
    true
}

fn rename_fits(rf: &PhysRegFile, pool: &UopPool, uid: UopId) -> bool {
    let uop = pool.get(uid).expect("uopq entry must be live");
    let mut int_needed = 0u32;
    let mut fp_needed = 0u32;
    for &logical in &uop.rename.logical_outputs {
        match class_of(logical) {
            crate::uop::RegClass::Int => int_needed += 1,
            crate::uop::RegClass::Fp => fp_needed += 1,
        }
    }
    rf.int.free_count() as u32 >= int_needed && rf.fp.free_count() as u32 >= fp_needed
}

fn perform_rename(rf: &mut PhysRegFile, pool: &mut UopPool, uid: UopId) {
    let uop = pool.get_mut(uid).expect("uopq entry must be live");
    let logical_inputs = uop.rename.logical_inputs.clone();
    let logical_outputs = uop.rename.logical_outputs.clone();

    let mut phys_inputs = Vec::with_capacity(logical_inputs.len());
    for &logical in &logical_inputs {
        phys_inputs.push(rf.file(class_of(logical)).lookup(logical));
    }

    let mut phys_outputs = Vec::with_capacity(logical_outputs.len());
    let mut prev_phys_outputs = Vec::with_capacity(logical_outputs.len());
    for &logical in &logical_outputs {
        let (new_phys, old_phys) = rf
            .file_mut(class_of(logical))
            .rename(logical)
            .expect("rename_fits already guaranteed a free register");
        phys_outputs.push(new_phys);
        prev_phys_outputs.push(old_phys);
    }

    let ready = logical_inputs
        .iter()
        .zip(phys_inputs.iter())
        .all(|(&logical, &phys)| !rf.file(class_of(logical)).is_pending(phys));

    uop.rename.phys_inputs = phys_inputs;
    uop.rename.phys_outputs = phys_outputs;
    uop.rename.prev_phys_outputs = prev_phys_outputs;
    uop.status.ready = ready;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CoreId, ContextId, Seq};
    use crate::scheduler::{ContextScheduler, Mode, Slot};
    use crate::uop::{
        logical, MemoryInfo, Membership, PredictorMeta, RenameInfo, Uop, UopStatus, UopTimestamps,
    };

    fn make_core() -> Core {
        Core::new(CoreId(0), &Config::default()).unwrap()
    }

    fn push_uopq(core: &mut Core, thread: usize, flags: UopFlags, outputs: Vec<crate::uop::LogicalReg>) -> UopId {
        let uop = Uop {
            opcode: 1,
            flags,
            ctx: ContextId(thread as u32),
            seq: Seq(0),
            di_seq: None,
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x1004,
            neip: 0x1004,
            mop_size: 4,
            specmode: false,
            membership: Membership {
                in_uopq: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo {
                logical_outputs: outputs,
                ..RenameInfo::default()
            },
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.threads[thread].ctx = Some(ContextId(thread as u32));
        core.threads[thread].uopq.push_back(uid);
        uid
    }

    fn no_evictions() -> ContextScheduler {
        ContextScheduler::new(
            vec![Slot {
                core: CoreId(0),
                thread: ThreadId(0),
            }],
            Mode::Static,
            false,
        )
    }

    #[test]
    fn non_memory_uop_dispatches_into_the_issue_queue() {
        let mut core = make_core();
        let uid = push_uopq(&mut core, 0, UopFlags::INT, vec![logical::gpr(4)]);
        let scheduler = no_evictions();
        let cfg = Config::default();
        let mut stats = Stats::new();

        run(&mut core, &scheduler, &cfg, &mut stats, 0);

        assert!(core.pool.get(uid).unwrap().membership.in_iq);
        assert_eq!(core.iq.get(0).len(), 1);
        assert_eq!(core.owner_thread.get(&uid), Some(&ThreadId(0)));
        assert_eq!(stats.thread_mut(CoreId(0), ThreadId(0)).stalls.used, 1);
    }

    #[test]
    fn store_uop_dispatches_into_the_store_queue() {
        let mut core = make_core();
        let uid = push_uopq(&mut core, 0, UopFlags::MEM | UopFlags::STORE, vec![]);
        let scheduler = no_evictions();
        let cfg = Config::default();
        let mut stats = Stats::new();

        run(&mut core, &scheduler, &cfg, &mut stats, 0);

        assert!(core.pool.get(uid).unwrap().membership.in_sq);
        assert_eq!(core.sq.get(0).len(), 1);
    }

    #[test]
    fn rob_exhaustion_stalls_without_mutating_the_uop() {
        let mut cfg = Config::default();
        cfg.queues.rob_size = 1;
        let mut core = Core::new(CoreId(0), &cfg).unwrap();
        let _first = push_uopq(&mut core, 0, UopFlags::INT, vec![logical::gpr(4)]);
        let second = push_uopq(&mut core, 0, UopFlags::INT, vec![logical::gpr(5)]);
        let scheduler = no_evictions();
        let mut stats = Stats::new();

        run(&mut core, &scheduler, &cfg, &mut stats, 0);

        assert!(core.pool.get(second).unwrap().membership.in_uopq);
        assert!(!core.pool.get(second).unwrap().membership.in_rob);
        assert_eq!(stats.thread_mut(CoreId(0), ThreadId(0)).stalls.rob, 1);
    }

    #[test]
    fn eviction_pending_blocks_dispatch_for_the_thread() {
        let mut core = make_core();
        let _uid = push_uopq(&mut core, 0, UopFlags::INT, vec![logical::gpr(4)]);
        let mut scheduler = ContextScheduler::new(
            vec![Slot {
                core: CoreId(0),
                thread: ThreadId(0),
            }],
            Mode::Dynamic { context_quantum: 0 },
            true,
        );
        scheduler.bind(ContextId(0), 0).unwrap();
        scheduler.maybe_signal_eviction(0);
        let cfg = Config::default();
        let mut stats = Stats::new();

        run(&mut core, &scheduler, &cfg, &mut stats, 0);

        assert_eq!(stats.thread_mut(CoreId(0), ThreadId(0)).stalls.ctx, 1);
        assert_eq!(core.threads[0].uopq.len(), 1);
    }

    #[test]
    fn specmode_uop_is_counted_separately_from_ordinary_dispatch() {
        let mut core = make_core();
        let uid = push_uopq(&mut core, 0, UopFlags::INT, vec![logical::gpr(4)]);
        core.pool.get_mut(uid).unwrap().specmode = true;
        let scheduler = no_evictions();
        let cfg = Config::default();
        let mut stats = Stats::new();

        run(&mut core, &scheduler, &cfg, &mut stats, 0);

        let t = stats.thread_mut(CoreId(0), ThreadId(0));
        assert_eq!(t.stalls.spec, 1);
        assert_eq!(t.stalls.used, 0);
    }
}
