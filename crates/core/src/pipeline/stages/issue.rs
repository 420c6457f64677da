//! C11 — issue: wakes ready uops out of the issue queue and the load/store
//! queues and hands them to a functional unit (spec.md §3, §4.5).
//!
//! Non-memory uops wake off the physical register file's live `pending`
//! state (recomputed every cycle, not cached from dispatch) and reserve an
//! `FuPool` instance of their `FuClass`. Memory uops always reserve
//! `EffAddr` regardless of class. Stores resolve their address and complete
//! synchronously at issue — spec.md §4.5's "address/data resolution at
//! issue, directory update at commit" needs no writeback-side broadcast
//! since a store has no destination register. Loads check
//! `LoadQueue::may_issue`'s store-ordering rule first (a free check, so a
//! blocked load never wastes an `EffAddr` reservation), then either forward
//! from an overlapping older store or hand a genuine access to the
//! `MemoryModule`, parking it on `Core::awaiting_memory` until
//! `MemoryModule::is_complete` reports it done (writeback's job, C12).
//!
//! `Core::issue_rr` mirrors `fetch_rr`/`dispatch_rr`/`commit_rr`'s fairness
//! role for `StageKind::TimeSlice`. When a structure is `Bank::Shared`, it
//! is scanned exactly once per cycle regardless of how many threads
//! `issue_kind` selects — the shared instance already interleaves every
//! thread's entries, so scanning it once per selected thread would inflate
//! the effective issue bandwidth against `issue_width`.

use crate::common::{AccessKind, Bank, ThreadId, UopId};
use crate::config::{Config, StageKind};
use crate::events::EventAction;
use crate::fu::FuClass;
use crate::memory::MemoryModule;
use crate::pipeline::core::{AwaitingMemory, Core};
use crate::queues::LoadQueue;
use crate::regfile::{class_of, PhysRegFile};
use crate::stats::Stats;
use crate::uop::Uop;

/// Runs issue for this cycle: non-memory uops first, then stores, then
/// loads, sharing one `issue_width` budget across all three.
pub fn run(core: &mut Core, memory: &mut dyn MemoryModule, cfg: &Config, stats: &mut Stats, cycle: u64) {
    let n = core.threads.len();
    if n == 0 {
        return;
    }
    let selected = select_threads(core, cfg);
    let mut budget = cfg.pipeline.issue_width;

    budget = issue_non_memory(core, stats, cycle, &selected, budget);
    budget = issue_stores(core, stats, cycle, &selected, budget);
    issue_loads(core, memory, stats, cycle, &selected, budget);

    core.issue_rr = (core.issue_rr + 1) % n;
}

fn select_threads(core: &Core, cfg: &Config) -> Vec<usize> {
    let n = core.threads.len();
    match cfg.pipeline.issue_kind {
        StageKind::Shared => (0..n).collect(),
        StageKind::TimeSlice | StageKind::SwitchOnEvent => vec![core.issue_rr % n],
    }
}

fn is_ready(rf: &PhysRegFile, uop: &Uop) -> bool {
    uop.rename
        .logical_inputs
        .iter()
        .zip(uop.rename.phys_inputs.iter())
        .all(|(&logical, &phys)| !rf.file(class_of(logical)).is_pending(phys))
}

fn issue_non_memory(core: &mut Core, stats: &mut Stats, cycle: u64, selected: &[usize], budget: u32) -> u32 {
    if matches!(core.iq, Bank::Shared(_)) {
        scan_iq_instance(core, 0, stats, cycle, budget)
    } else {
        let mut budget = budget;
        for &idx in selected {
            if budget == 0 {
                break;
            }
            budget = scan_iq_instance(core, idx, stats, cycle, budget);
        }
        budget
    }
}

fn scan_iq_instance(core: &mut Core, idx: usize, stats: &mut Stats, cycle: u64, budget: u32) -> u32 {
    let mut budget = budget;
    let candidates: Vec<UopId> = core.iq.get(idx).entries().to_vec();
    for uid in candidates {
        if budget == 0 {
            break;
        }
        let owner = *core
            .owner_thread
            .get(&uid)
            .expect("every IQ-resident uop has a recorded owner thread");
        let rf = core.rf.get(owner.0 as usize);
        let uop = core.pool.get(uid).expect("IQ entry must be live");
        if !is_ready(rf, uop) {
            continue;
        }
        let class = FuClass::of(uop.flags);
        let Some(op_latency) = core.fu.try_reserve(class, cycle) else {
            continue;
        };
        let di_seq = uop.di_seq.expect("a dispatched uop always has a di_seq");
        let opcode = uop.opcode;

        core.iq.get_mut(idx).remove(uid);
        core.eventq.schedule(uid, di_seq, cycle + u64::from(op_latency), false);
        let uop_mut = core.pool.get_mut(uid).expect("IQ entry must be live");
        uop_mut.membership.in_iq = false;
        uop_mut.membership.in_eventq = true;
        uop_mut.status.issued = true;
        uop_mut.timestamps.issue_cycle = Some(cycle);
        uop_mut.timestamps.issue_try_cycle = Some(cycle);

        core.emit(cycle, uid, EventAction::Issue);
        core.emit(cycle, uid, EventAction::Execute);
        stats.thread_mut(core.id, owner).issue_hist.record(opcode);
        budget -= 1;
    }
    budget
}

fn issue_stores(core: &mut Core, stats: &mut Stats, cycle: u64, selected: &[usize], budget: u32) -> u32 {
    if matches!(core.sq, Bank::Shared(_)) {
        scan_sq_instance(core, 0, stats, cycle, budget)
    } else {
        let mut budget = budget;
        for &idx in selected {
            if budget == 0 {
                break;
            }
            budget = scan_sq_instance(core, idx, stats, cycle, budget);
        }
        budget
    }
}

fn scan_sq_instance(core: &mut Core, idx: usize, stats: &mut Stats, cycle: u64, budget: u32) -> u32 {
    let mut budget = budget;
    let candidates: Vec<UopId> = core.sq.get(idx).uops().collect();
    for uid in candidates {
        if budget == 0 {
            break;
        }
        let uop = core.pool.get(uid).expect("SQ entry must be live");
        if uop.status.issued {
            continue;
        }
        let addr = uop
            .memory
            .physaddr
            .expect("a dispatched store carries a resolved address");
        let size = uop.memory.size;
        let opcode = uop.opcode;
        let owner = *core
            .owner_thread
            .get(&uid)
            .expect("every SQ-resident uop has a recorded owner thread");

        if core.fu.try_reserve(FuClass::EffAddr, cycle).is_none() {
            continue;
        }
        core.sq.get_mut(idx).resolve_address(uid, addr, size);
        let uop_mut = core.pool.get_mut(uid).expect("SQ entry must be live");
        uop_mut.status.issued = true;
        uop_mut.status.completed = true;
        uop_mut.timestamps.issue_cycle = Some(cycle);

        core.emit(cycle, uid, EventAction::Issue);
        core.emit(cycle, uid, EventAction::Memory);
        stats.thread_mut(core.id, owner).issue_hist.record(opcode);
        budget -= 1;
    }
    budget
}

fn issue_loads(
    core: &mut Core,
    memory: &mut dyn MemoryModule,
    stats: &mut Stats,
    cycle: u64,
    selected: &[usize],
    budget: u32,
) -> u32 {
    if matches!(core.lq, Bank::Shared(_)) {
        scan_lq_instance(core, 0, memory, stats, cycle, budget)
    } else {
        let mut budget = budget;
        for &idx in selected {
            if budget == 0 {
                break;
            }
            budget = scan_lq_instance(core, idx, memory, stats, cycle, budget);
        }
        budget
    }
}

fn scan_lq_instance(
    core: &mut Core,
    idx: usize,
    memory: &mut dyn MemoryModule,
    stats: &mut Stats,
    cycle: u64,
    budget: u32,
) -> u32 {
    let mut budget = budget;
    let candidates: Vec<UopId> = core.lq.get(idx).uops().collect();
    for uid in candidates {
        if budget == 0 {
            break;
        }
        let uop = core.pool.get(uid).expect("LQ entry must be live");
        let addr = uop
            .memory
            .physaddr
            .expect("a dispatched load carries a resolved address");
        let size = uop.memory.size;
        let di_seq = uop.di_seq.expect("a dispatched uop always has a di_seq");
        let opcode = uop.opcode;

        let older = core.sq.get(idx).older_than(uid);
        if !LoadQueue::may_issue(uid, addr, size, &older) {
            continue;
        }
        let Some(op_latency) = core.fu.try_reserve(FuClass::EffAddr, cycle) else {
            continue;
        };
        let owner = *core
            .owner_thread
            .get(&uid)
            .expect("every LQ-resident uop has a recorded owner thread");

        if let Some(_forwarding_store) = core.sq.get(idx).forwarding_store_for(uid, addr, size) {
            core.lq.get_mut(idx).remove(uid);
            core.eventq.schedule(uid, di_seq, cycle + u64::from(op_latency), true);
            let uop_mut = core.pool.get_mut(uid).expect("LQ entry must be live");
            uop_mut.membership.in_lq = false;
            uop_mut.membership.in_eventq = true;
            uop_mut.status.issued = true;
            uop_mut.timestamps.issue_cycle = Some(cycle);
            core.emit(cycle, uid, EventAction::Issue);
            core.emit(cycle, uid, EventAction::Memory);
        } else {
            let handle = memory.access(addr, AccessKind::Load, cycle);
            core.lq.get_mut(idx).remove(uid);
            let uop_mut = core.pool.get_mut(uid).expect("LQ entry must be live");
            uop_mut.membership.in_lq = false;
            uop_mut.status.issued = true;
            uop_mut.timestamps.issue_cycle = Some(cycle);
            core.awaiting_memory.push(AwaitingMemory {
                uop: uid,
                handle,
                thread: owner,
            });
            core.emit(cycle, uid, EventAction::Issue);
            core.emit(cycle, uid, EventAction::Memory);
        }

        stats.thread_mut(core.id, owner).issue_hist.record(opcode);
        budget -= 1;
    }
    budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CoreId, ContextId, DiSeq, PhysAddr, RobTag, Seq};
    use crate::memory::simple::SimpleMemoryModule;
    use crate::uop::{
        logical, MemoryInfo, Membership, PredictorMeta, RenameInfo, UopFlags, UopStatus, UopTimestamps,
    };

    fn make_core() -> Core {
        Core::new(CoreId(0), &Config::default()).unwrap()
    }

    fn dispatch_into_iq(core: &mut Core, thread: usize, flags: UopFlags) -> UopId {
        let uop = Uop {
            opcode: 7,
            flags,
            ctx: ContextId(thread as u32),
            seq: Seq(0),
            di_seq: Some(DiSeq(core.pool.next_di_seq().0)),
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x1004,
            neip: 0x1004,
            mop_size: 4,
            specmode: false,
            membership: Membership {
                in_iq: true,
                in_rob: true,
                ..Membership::default()
            },
            status: UopStatus {
                ready: true,
                ..UopStatus::default()
            },
            timestamps: UopTimestamps::default(),
            rename: RenameInfo::default(),
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.rob.push(RobTag(0), uid, ThreadId(thread as u32));
        core.iq.get_mut(thread).push(uid);
        core.owner_thread.insert(uid, ThreadId(thread as u32));
        uid
    }

    #[test]
    fn ready_non_memory_uop_issues_and_schedules_completion() {
        let mut core = make_core();
        let uid = dispatch_into_iq(&mut core, 0, UopFlags::INT);
        let mut memory = SimpleMemoryModule::new(1);
        let cfg = Config::default();
        let mut stats = Stats::new();

        run(&mut core, &mut memory, &cfg, &mut stats, 10);

        let uop = core.pool.get(uid).unwrap();
        assert!(uop.status.issued);
        assert!(uop.membership.in_eventq);
        assert!(!uop.membership.in_iq);
        assert_eq!(core.iq.get(0).len(), 0);
    }

    #[test]
    fn pending_input_blocks_issue() {
        let mut core = make_core();
        let phys = core.rf.get(0).int.lookup(logical::gpr(1));
        let (new_phys, _old) = core.rf.get_mut(0).int.rename(logical::gpr(1)).unwrap();
        let _ = phys;
        let uop = Uop {
            opcode: 1,
            flags: UopFlags::INT,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: Some(DiSeq(0)),
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x1004,
            neip: 0x1004,
            mop_size: 4,
            specmode: false,
            membership: Membership {
                in_iq: true,
                in_rob: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo {
                logical_inputs: vec![logical::gpr(1)],
                phys_inputs: vec![new_phys],
                ..RenameInfo::default()
            },
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.rob.push(RobTag(0), uid, ThreadId(0));
        core.iq.get_mut(0).push(uid);
        core.owner_thread.insert(uid, ThreadId(0));

        let mut memory = SimpleMemoryModule::new(1);
        let cfg = Config::default();
        let mut stats = Stats::new();
        run(&mut core, &mut memory, &cfg, &mut stats, 5);

        assert!(!core.pool.get(uid).unwrap().status.issued);
        assert_eq!(core.iq.get(0).len(), 1);
    }

    #[test]
    fn store_completes_synchronously_and_stays_in_the_store_queue() {
        let mut core = make_core();
        let uop = Uop {
            opcode: 2,
            flags: UopFlags::MEM | UopFlags::STORE,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: Some(DiSeq(0)),
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x1004,
            neip: 0x1004,
            mop_size: 4,
            specmode: false,
            membership: Membership {
                in_sq: true,
                in_rob: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo::default(),
            memory: MemoryInfo {
                physaddr: Some(PhysAddr::new(0x4000)),
                size: 8,
                handle: None,
            },
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.rob.push(RobTag(0), uid, ThreadId(0));
        core.sq.get_mut(0).push(uid);
        core.owner_thread.insert(uid, ThreadId(0));

        let mut memory = SimpleMemoryModule::new(1);
        let cfg = Config::default();
        let mut stats = Stats::new();
        run(&mut core, &mut memory, &cfg, &mut stats, 1);

        let uop = core.pool.get(uid).unwrap();
        assert!(uop.status.issued);
        assert!(uop.status.completed);
        assert!(uop.membership.in_sq);
        assert_eq!(core.sq.get(0).len(), 1);
    }

    #[test]
    fn load_with_no_forwarding_store_issues_exactly_one_load_access_to_the_memory_module() {
        use crate::memory::MockMemoryModule;

        let mut core = make_core();
        let uop = Uop {
            opcode: 3,
            flags: UopFlags::MEM,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: Some(DiSeq(0)),
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x1004,
            neip: 0x1004,
            mop_size: 4,
            specmode: false,
            membership: Membership {
                in_lq: true,
                in_rob: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo {
                logical_outputs: vec![logical::gpr(4)],
                ..RenameInfo::default()
            },
            memory: MemoryInfo {
                physaddr: Some(PhysAddr::new(0x9000)),
                size: 4,
                handle: None,
            },
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.rob.push(RobTag(0), uid, ThreadId(0));
        core.lq.get_mut(0).push(uid);
        core.owner_thread.insert(uid, ThreadId(0));

        let mut memory = MockMemoryModule::new();
        memory
            .expect_access()
            .times(1)
            .withf(|addr, kind, now| *addr == PhysAddr::new(0x9000) && *kind == AccessKind::Load && *now == 7)
            .returning(|_, _, _| crate::memory::AccessHandle(42));

        let cfg = Config::default();
        let mut stats = Stats::new();
        run(&mut core, &mut memory, &cfg, &mut stats, 7);

        let uop = core.pool.get(uid).unwrap();
        assert!(uop.status.issued);
        assert!(!core.lq.get(0).uops().any(|u| u == uid));
        assert_eq!(core.awaiting_memory.len(), 1);
        assert_eq!(core.awaiting_memory[0].handle, crate::memory::AccessHandle(42));
    }
}
