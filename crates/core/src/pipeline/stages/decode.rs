//! C9 (decode half) — spec.md §4.3.
//!
//! The frontend hands fetch fully-decomposed uops, so this stage spends its
//! entire budget on `decode_width`'s bandwidth gate: moving a macro-
//! instruction's uops from the fetch queue to the uop queue as a unit, never
//! splitting one `FetchSlot` across a decode-width boundary. No `StageKind`
//! governs decode (spec.md §6 names one only for fetch/dispatch/issue/
//! commit); instead `Core::decode_rr` round-robins the shared per-cycle
//! budget across threads so no one thread starves the others indefinitely.

use crate::config::Config;
use crate::events::{EventAction, EventSink};
use crate::pipeline::core::Core;
use crate::pipeline::thread::ThreadState;
use crate::uop::UopPool;

/// Runs decode for every thread, sharing `decode_width` uops of bandwidth
/// across them in round-robin order starting from `core.decode_rr`.
pub fn run(core: &mut Core, cfg: &Config, cycle: u64) {
    let n = core.threads.len();
    if n == 0 {
        return;
    }
    let mut budget = cfg.pipeline.decode_width;
    let start = core.decode_rr % n;
    for i in 0..n {
        if budget == 0 {
            break;
        }
        let idx = (start + i) % n;
        budget -= decode_thread(
            &mut core.pool,
            &mut core.threads[idx],
            cfg,
            budget,
            core.event_sink.as_mut(),
            cycle,
        );
    }
    core.decode_rr = (start + 1) % n;
}

fn decode_thread(
    pool: &mut UopPool,
    thread: &mut ThreadState,
    cfg: &Config,
    budget: u32,
    sink: &mut dyn EventSink,
    cycle: u64,
) -> u32 {
    let uopq_cap = cfg.queues.uop_queue_size as usize;
    let mut used = 0;

    while let Some(slot) = thread.fetchq.front() {
        let slot_uops = slot.uops.len() as u32;
        if used + slot_uops > budget {
            break;
        }
        if thread.uopq.len() + slot.uops.len() > uopq_cap {
            break;
        }
        let slot = thread.fetchq.pop_front().expect("front just peeked");
        thread.fetchq_bytes = thread.fetchq_bytes.saturating_sub(slot.mop_size);
        for uid in slot.uops {
            if let Some(u) = pool.get_mut(uid) {
                u.membership.in_fetchq = false;
                u.membership.in_uopq = true;
            }
            thread.uopq.push_back(uid);
            sink.record(crate::events::Event {
                cycle,
                uop_id: uid,
                action: EventAction::Decode,
            });
        }
        used += slot_uops;
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ContextId, Seq};
    use crate::events::NoopEventSink;
    use crate::pipeline::thread::FetchSlot;
    use crate::uop::{
        MemoryInfo, Membership, PredictorMeta, RenameInfo, Uop, UopFlags, UopStatus, UopTimestamps,
    };

    fn push_slot(pool: &mut UopPool, thread: &mut ThreadState, eip: u64, n: usize) {
        let mut ids = Vec::new();
        for _ in 0..n {
            let uop = Uop {
                opcode: 0,
                flags: UopFlags::INT,
                ctx: ContextId(0),
                seq: Seq(0),
                di_seq: None,
                eip,
                pred_neip: eip + 4,
                target_neip: eip + 4,
                neip: eip + 4,
                mop_size: 4,
                specmode: false,
                membership: Membership {
                    in_fetchq: true,
                    ..Membership::default()
                },
                status: UopStatus::default(),
                timestamps: UopTimestamps::default(),
                rename: RenameInfo::default(),
                memory: MemoryInfo::default(),
                predictor_meta: PredictorMeta::default(),
            };
            ids.push(pool.insert(uop));
        }
        thread.fetchq_bytes += 4;
        thread.fetchq.push_back(FetchSlot { uops: ids, mop_size: 4 });
    }

    #[test]
    fn moves_whole_slots_within_width_budget() {
        let mut pool = UopPool::new();
        let mut thread = ThreadState::new();
        push_slot(&mut pool, &mut thread, 0x1000, 2);
        push_slot(&mut pool, &mut thread, 0x1004, 2);

        let cfg = Config::default();
        let mut sink = NoopEventSink;
        let used = decode_thread(&mut pool, &mut thread, &cfg, 3, &mut sink, 0);
        assert_eq!(used, 2);
        assert_eq!(thread.uopq.len(), 2);
        assert_eq!(thread.fetchq.len(), 1);
        for uid in &thread.uopq {
            assert!(pool.get(*uid).unwrap().membership.in_uopq);
            assert!(!pool.get(*uid).unwrap().membership.in_fetchq);
        }
    }

    #[test]
    fn stalls_when_uop_queue_is_full() {
        let mut pool = UopPool::new();
        let mut thread = ThreadState::new();
        push_slot(&mut pool, &mut thread, 0x1000, 2);

        let mut cfg = Config::default();
        cfg.queues.uop_queue_size = 1;
        let mut sink = NoopEventSink;
        let used = decode_thread(&mut pool, &mut thread, &cfg, 8, &mut sink, 0);
        assert_eq!(used, 0);
        assert_eq!(thread.fetchq.len(), 1);
    }

    #[test]
    fn round_robin_advances_even_when_a_thread_has_nothing_to_decode() {
        let mut pool = UopPool::new();
        let mut core = Core::new(crate::common::CoreId(0), &Config::default()).unwrap();
        core.threads = vec![ThreadState::new(), ThreadState::new()];
        push_slot(&mut pool, &mut core.threads[1], 0x2000, 1);
        core.pool = pool;

        let cfg = Config::default();
        run(&mut core, &cfg, 0);
        assert_eq!(core.decode_rr, 1);
        assert_eq!(core.threads[1].uopq.len(), 1);
    }
}
