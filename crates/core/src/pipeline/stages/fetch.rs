//! C9 (fetch half) — spec.md §4.2.
//!
//! Drives each selected thread's bound `Frontend` one macro-instruction at a
//! time, predicting the direction/target of any control-flow uop it
//! produces and enqueuing the result onto the fetch queue. A trace-cache hit
//! replays the frontend across a whole recorded trace without touching the
//! i-cache, following the two-phase tag-then-flags probe spec.md §4.10
//! describes.

use crate::common::{AccessKind, ContextId, PhysAddr};
use crate::config::{Config, StageKind};
use crate::context::ContextTable;
use crate::events::{EventAction, EventSink};
use crate::frontend::ContextStatus;
use crate::memory::MemoryModule;
use crate::predictor::{ActualOutcome, PredictorWrapper};
use crate::pipeline::core::Core;
use crate::pipeline::thread::{FetchSlot, ThreadState};
use crate::tracecache::TraceCache;
use crate::uop::{Uop, UopFlags, UopPool};

/// Runs fetch for every thread `fetch_kind` selects this cycle.
pub fn run(
    core: &mut Core,
    ctx_table: &mut ContextTable,
    memory: &mut dyn MemoryModule,
    cfg: &Config,
    cycle: u64,
) {
    let selected = select_threads(core, cfg, cycle);
    for t in selected {
        run_thread(
            &mut core.pool,
            &mut core.threads[t],
            &mut core.predictor,
            core.tracecache.as_mut(),
            ctx_table,
            memory,
            core.event_sink.as_mut(),
            cfg,
            cycle,
        );
    }
}

fn select_threads(core: &mut Core, cfg: &Config, cycle: u64) -> Vec<usize> {
    let n = core.threads.len();
    if n == 0 {
        return Vec::new();
    }
    match cfg.pipeline.fetch_kind {
        StageKind::Shared => (0..n).collect(),
        StageKind::TimeSlice => {
            let idx = core.fetch_rr % n;
            core.fetch_rr = (core.fetch_rr + 1) % n;
            vec![idx]
        }
        StageKind::SwitchOnEvent => {
            let idx = core.fetch_rr % n;
            let elapsed = cycle.saturating_sub(core.fetch_sticky_since);
            let current_stalled = cycle < core.threads[idx].fetch_stall_until;
            if elapsed >= cfg.general.thread_quantum || current_stalled {
                let next = (idx + 1) % n;
                core.fetch_rr = next;
                core.fetch_sticky_since = cycle;
                if next != idx {
                    let penalty = cfg.general.thread_switch_penalty;
                    core.threads[next].fetch_stall_until =
                        core.threads[next].fetch_stall_until.max(cycle + penalty);
                }
                vec![next]
            } else {
                vec![idx]
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_thread(
    pool: &mut UopPool,
    thread: &mut ThreadState,
    predictor: &mut PredictorWrapper,
    tracecache: Option<&mut TraceCache>,
    ctx_table: &mut ContextTable,
    memory: &mut dyn MemoryModule,
    sink: &mut dyn EventSink,
    cfg: &Config,
    cycle: u64,
) {
    if cycle < thread.fetch_stall_until || thread.finished {
        return;
    }
    let Some(ctx) = thread.ctx else { return };
    let Some(frontend) = ctx_table.get_mut(ctx) else {
        return;
    };
    match frontend.status() {
        ContextStatus::Finished => {
            if thread.frontend_drained() {
                thread.finished = true;
            }
            return;
        }
        ContextStatus::Suspended => return,
        ContextStatus::Running | ContextStatus::Specmode => {}
    }

    let byte_budget = u64::from(cfg.queues.fetch_queue_size);

    if let Some(tc) = tracecache {
        if let Some(plan) = probe_trace_cache(tc, predictor, thread.fetch_eip) {
            replay_trace(pool, thread, predictor, frontend, ctx, &plan, byte_budget, sink, cycle);
            return;
        }
    }

    fetch_from_frontend(
        pool, thread, predictor, frontend, ctx, memory, cfg, cycle, byte_budget, sink,
    );
}

/// A trace-cache hit's replay plan: the macro-instruction addresses to
/// re-execute and the fall-through/target address to resume at afterward.
struct TracePlan {
    mop_eip: Vec<u64>,
    branch_mask: u32,
    predicted_flags: u32,
    branch_count: u32,
    fall_through_eip: u64,
    target_eip: u64,
}

fn probe_trace_cache(
    tc: &mut TraceCache,
    predictor: &PredictorWrapper,
    eip: u64,
) -> Option<TracePlan> {
    let candidate = tc.peek_tag(eip)?;
    let mop_eip = candidate.mop_eip.clone();
    let branch_mask = candidate.branch_mask;
    let branch_count = candidate.branch_count;
    let fall_through_eip = candidate.fall_through_eip;
    let target_eip = candidate.target_eip;

    let mut predicted_flags = 0u32;
    for (slot, &mop) in mop_eip.iter().enumerate() {
        if branch_mask & (1 << slot) != 0 {
            let (pred, _) = predictor.predict(mop, None);
            if pred.taken {
                predicted_flags |= 1 << slot;
            }
        }
    }
    tc.lookup(eip, predicted_flags)?;
    Some(TracePlan {
        mop_eip,
        branch_mask,
        predicted_flags,
        branch_count,
        fall_through_eip,
        target_eip,
    })
}

#[allow(clippy::too_many_arguments)]
fn replay_trace(
    pool: &mut UopPool,
    thread: &mut ThreadState,
    predictor: &mut PredictorWrapper,
    frontend: &mut dyn crate::frontend::Frontend,
    ctx: ContextId,
    plan: &TracePlan,
    byte_budget: u64,
    sink: &mut dyn EventSink,
    cycle: u64,
) {
    for (slot, &mop) in plan.mop_eip.iter().enumerate() {
        if thread.fetchq_bytes >= byte_budget {
            break;
        }
        let Some(exec) = frontend.execute_inst(mop) else {
            break;
        };
        let is_branch = plan.branch_mask & (1 << slot) != 0;
        enqueue_macro_op(pool, thread, predictor, ctx, exec, is_branch, sink, cycle);
    }
    let last_taken = plan.branch_count > 0
        && plan.predicted_flags & (1 << (plan.branch_count - 1).min(31)) != 0;
    thread.fetch_eip = if last_taken {
        plan.target_eip
    } else {
        plan.fall_through_eip
    };
}

#[allow(clippy::too_many_arguments)]
fn fetch_from_frontend(
    pool: &mut UopPool,
    thread: &mut ThreadState,
    predictor: &mut PredictorWrapper,
    frontend: &mut dyn crate::frontend::Frontend,
    ctx: ContextId,
    memory: &mut dyn MemoryModule,
    cfg: &Config,
    cycle: u64,
    byte_budget: u64,
    sink: &mut dyn EventSink,
) {
    if let Some((handle, _eip)) = thread.icache_pending {
        if !memory.is_complete(handle, cycle) {
            return;
        }
        thread.icache_pending = None;
    }

    while thread.fetchq_bytes < byte_budget {
        if thread.icache_pending.is_some() {
            break;
        }
        let fetch_eip = thread.fetch_eip;
        let handle = memory.access(PhysAddr::new(fetch_eip), AccessKind::Fetch, cycle);
        if !memory.is_complete(handle, cycle) {
            thread.icache_pending = Some((handle, fetch_eip));
            break;
        }
        let Some(exec) = frontend.execute_inst(fetch_eip) else {
            break;
        };
        let is_branch = exec.uops.iter().any(Uop::is_control);
        enqueue_macro_op(pool, thread, predictor, ctx, exec, is_branch, sink, cycle);
    }
}

#[allow(clippy::too_many_arguments)]
fn enqueue_macro_op(
    pool: &mut UopPool,
    thread: &mut ThreadState,
    predictor: &mut PredictorWrapper,
    ctx: ContextId,
    exec: crate::frontend::ExecResult,
    is_branch: bool,
    sink: &mut dyn EventSink,
    cycle: u64,
) {
    let mop_size = exec.mop_size;
    let mop_eip = exec.uops.first().map_or(thread.fetch_eip, |u| u.eip);
    let specmode = thread.in_specmode();
    let mut ids = Vec::with_capacity(exec.uops.len());
    let mut next_eip = mop_eip + mop_size;

    for mut uop in exec.uops {
        uop.ctx = ctx;
        uop.seq = pool.next_seq(ctx);
        uop.specmode = specmode;
        uop.mop_size = mop_size;
        uop.membership.in_fetchq = true;

        if is_branch && uop.is_control() {
            next_eip = predict_branch(predictor, &mut uop, mop_size);
            thread.unresolved_branches += 1;
        } else {
            uop.pred_neip = uop.eip + mop_size;
        }
        let uid = pool.insert(uop);
        sink.record(crate::events::Event {
            cycle,
            uop_id: uid,
            action: EventAction::Fetch,
        });
        ids.push(uid);
    }

    thread.fetchq_bytes += mop_size;
    thread.fetchq.push_back(FetchSlot {
        uops: ids,
        mop_size,
    });
    thread.fetch_eip = next_eip;
}

fn predict_branch(predictor: &mut PredictorWrapper, uop: &mut Uop, mop_size: u64) -> u64 {
    let oracle_taken = uop.neip != uop.eip + mop_size;
    let oracle = ActualOutcome {
        taken: oracle_taken,
        target: Some(uop.target_neip),
    };
    let (mut prediction, dir_meta) = predictor.predict(uop.eip, Some(oracle));

    if uop.flags.contains(UopFlags::RETURN) {
        if let Some(ret_addr) = predictor.ras_pop() {
            prediction.target = Some(ret_addr);
        }
    }
    if uop.flags.contains(UopFlags::CALL) {
        predictor.ras_push(uop.eip + mop_size);
    }

    uop.predictor_meta = prediction.meta;
    uop.predictor_meta.dir_meta = dir_meta;
    uop.pred_neip = if prediction.taken {
        prediction.target.unwrap_or(uop.eip + mop_size)
    } else {
        uop.eip + mop_size
    };
    uop.pred_neip
}
