//! C13 — commit: in-order retirement of completed ROB heads (spec.md §3,
//! §4.7/§4.8).
//!
//! Keeps the teacher's writeback/commit split: only commit touches the
//! architectural-adjacent state a recovery or a report cares about — the
//! predictor, the trace cache, and the physical register free list. A
//! thread's head must be `status.completed` before it retires; a thread
//! whose head isn't ready yet simply stops being retried this cycle rather
//! than blocking its neighbors (mirrors dispatch/issue's per-thread
//! independence under a shared width budget).

use crate::common::{ThreadId, UopId};
use crate::config::{Config, StageKind};
use crate::events::EventAction;
use crate::pipeline::core::Core;
use crate::predictor::ActualOutcome;
use crate::regfile::class_of;
use crate::stats::Stats;
use crate::tracecache::TraceBuilder;
use crate::uop::UopFlags;

/// Runs commit for this cycle, retiring up to `commit_width` uops shared
/// across the threads `commit_kind` selects this cycle. Returns the resume
/// point for every mispredicted control uop retired this cycle — the driver
/// consults this under `RecoverKind::Commit` (spec.md §4.9), since the
/// triggering uop is already freed by the time `run` returns.
pub fn run(core: &mut Core, cfg: &Config, stats: &mut Stats, cycle: u64) -> Vec<(ThreadId, u64)> {
    let n = core.threads.len();
    if n == 0 {
        return Vec::new();
    }
    let selected = select_threads(core, cfg);
    let mut budget = cfg.pipeline.commit_width;
    let mut mispredicted = Vec::new();
    loop {
        if budget == 0 {
            break;
        }
        let mut progressed = false;
        for &idx in &selected {
            if budget == 0 {
                break;
            }
            if let Some(resume) = try_commit_one(core, cfg, stats, idx, cycle) {
                budget -= 1;
                progressed = true;
                if let Some(resume_eip) = resume {
                    mispredicted.push((ThreadId(idx as u32), resume_eip));
                }
            }
        }
        if !progressed {
            break;
        }
    }
    core.commit_rr = (core.commit_rr + 1) % n;
    mispredicted
}

fn select_threads(core: &Core, cfg: &Config) -> Vec<usize> {
    let n = core.threads.len();
    match cfg.pipeline.commit_kind {
        StageKind::Shared => (0..n).collect(),
        StageKind::TimeSlice | StageKind::SwitchOnEvent => vec![core.commit_rr % n],
    }
}

fn try_commit_one(
    core: &mut Core,
    cfg: &Config,
    stats: &mut Stats,
    idx: usize,
    cycle: u64,
) -> Option<Option<u64>> {
    let thread_id = ThreadId(idx as u32);
    let entry = core.rob.peek_head(thread_id)?;
    let uid = entry.uop;
    let uop = core.pool.get(uid).expect("ROB entry must be live");
    if !uop.status.completed {
        return None;
    }

    let opcode = uop.opcode;
    let flags = uop.flags;
    let eip = uop.eip;
    let mop_size = uop.mop_size;
    let neip = uop.neip;
    let pred_neip = uop.pred_neip;
    let is_control = uop.is_control();
    let specmode = uop.specmode;
    let mispredicted = uop.status.mispredicted;
    let btb_source = uop.btb_source();
    let dir_meta = uop.predictor_meta.dir_meta;
    let prev_mappings: Vec<_> = uop
        .rename
        .logical_outputs
        .iter()
        .zip(uop.rename.prev_phys_outputs.iter())
        .map(|(&l, &p)| (l, p))
        .collect();

    core.rob.pop_head(thread_id);

    {
        let rf = core.rf.get_mut(idx);
        for (logical, prev_phys) in prev_mappings {
            rf.file_mut(class_of(logical)).retire_prev_mapping(prev_phys);
        }
    }

    if is_control && !specmode {
        let taken = neip != eip + mop_size;
        let outcome = ActualOutcome {
            taken,
            target: if taken { Some(neip) } else { None },
        };
        core.predictor.update(eip, outcome, dir_meta, btb_source);

        let thread_stats = stats.thread_mut(core.id, thread_id);
        thread_stats.branch.branches += 1;
        if mispredicted {
            thread_stats.branch.mispred += 1;
        }
        let _ = pred_neip;
    }

    feed_trace_builder(core, cfg, idx, eip, mop_size, is_control, neip, flags);

    let thread_stats = stats.thread_mut(core.id, thread_id);
    thread_stats.committed += 1;
    thread_stats.commit_hist.record(opcode);
    record_mix(&mut thread_stats.mix, flags);

    core.owner_thread.remove(&uid);
    if let Some(uop) = core.pool.get_mut(uid) {
        uop.membership.in_rob = false;
    }
    core.emit(cycle, uid, EventAction::Commit);
    core.pool.try_free(uid);
    Some(if mispredicted { Some(neip) } else { None })
}

fn record_mix(mix: &mut crate::stats::UopMix, flags: UopFlags) {
    if flags.contains(UopFlags::MEM) {
        mix.mem += 1;
    } else if flags.contains(UopFlags::CTRL) {
        mix.ctrl += 1;
    } else if flags.contains(UopFlags::FP) || flags.contains(UopFlags::XMM) {
        mix.fp += 1;
    } else if flags.contains(UopFlags::LOGIC) {
        mix.logic += 1;
    } else {
        mix.int += 1;
    }
}

/// Feeds one committed uop into its thread's trace builder, finalizing and
/// installing a trace once a boundary condition is reached. There is no
/// explicit "indirect branch" flag, so an unconditional control uop that
/// isn't a call (an indirect jump or a return) ends a trace outright —
/// `UNCOND` branches with a statically-known target (direct jumps) behave
/// the same way here, since distinguishing them needs no extra bookkeeping
/// once the target is already known to the trace's `target_eip` field.
fn feed_trace_builder(core: &mut Core, cfg: &Config, idx: usize, eip: u64, mop_size: u64, is_control: bool, neip: u64, flags: UopFlags) {
    let Some(tracecache) = core.tracecache.as_mut() else {
        return;
    };
    let taken = is_control && neip != eip + mop_size;
    let builder: &mut TraceBuilder = &mut core.threads[idx].trace_builder;
    builder.push(eip, mop_size, is_control, taken, neip);

    let terminates_indirectly =
        is_control && flags.contains(UopFlags::UNCOND) && !flags.contains(UopFlags::CALL);
    let size_boundary = builder.is_full(cfg.trace_cache.trace_size, cfg.trace_cache.branch_max);

    if terminates_indirectly || size_boundary {
        if let Some(trace) = builder.take() {
            tracecache.install(trace);
        }
    }
}
