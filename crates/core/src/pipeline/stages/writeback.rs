//! C12 — writeback: drains completed memory accesses into the event queue,
//! then drains the event queue itself, broadcasting results to the
//! register file (spec.md §3, §4.6).
//!
//! Keeps the teacher's writeback/commit split — writeback only flips ROB-
//! adjacent uop state (`status.completed`, output registers' `pending`),
//! never touches committed architectural state or the predictor, both of
//! which are commit's job (C13). `Core::awaiting_memory` is promoted into
//! the event queue exactly once a genuine `MemoryModule::is_complete` fires;
//! the `is_memory = true` schedule then rides `EventQueue::pop_due`'s
//! always-due quirk so the promoted entry drains on this same call.

use crate::events::EventAction;
use crate::memory::MemoryModule;
use crate::pipeline::core::Core;
use crate::regfile::class_of;

/// Drains ready memory accesses and the event queue for this cycle.
/// Returns every control uop whose resolution disagreed with its
/// prediction, newly detected this cycle — the driver consults this to
/// trigger recovery immediately under `RecoverKind::Writeback` (spec.md §4.9).
pub fn run(core: &mut Core, memory: &dyn MemoryModule, cycle: u64) -> Vec<crate::common::UopId> {
    promote_completed_memory_accesses(core, memory, cycle);
    let due = core.eventq.pop_due(cycle);

    let mut mispredicted = Vec::new();
    for uid in due {
        let owner = core.owner_thread.get(&uid).copied();
        let Some(uop) = core.pool.get_mut(uid) else {
            continue;
        };
        uop.membership.in_eventq = false;
        uop.status.completed = true;
        let is_memory = uop.flags.contains(crate::uop::UopFlags::MEM);

        let is_mispredict = uop.is_control() && !uop.specmode && uop.neip != uop.pred_neip;
        if is_mispredict {
            uop.status.mispredicted = true;
        }

        let outputs: Vec<_> = uop
            .rename
            .logical_outputs
            .iter()
            .zip(uop.rename.phys_outputs.iter())
            .map(|(&l, &p)| (l, p))
            .collect();

        if let Some(owner) = owner {
            let rf = core.rf.get_mut(owner.0 as usize);
            for (logical, phys) in outputs {
                rf.file_mut(class_of(logical)).mark_ready(phys);
            }
        }

        if is_mispredict {
            mispredicted.push(uid);
        }
        core.emit(cycle, uid, EventAction::Writeback);
        if is_memory {
            core.emit(cycle, uid, EventAction::Memory);
        }
    }
    mispredicted
}

fn promote_completed_memory_accesses(core: &mut Core, memory: &dyn MemoryModule, cycle: u64) {
    let mut still_pending = Vec::with_capacity(core.awaiting_memory.len());
    for entry in core.awaiting_memory.drain(..) {
        if memory.is_complete(entry.handle, cycle) {
            let di_seq = core
                .pool
                .get(entry.uop)
                .and_then(|u| u.di_seq)
                .unwrap_or(crate::common::DiSeq(0));
            core.eventq.schedule(entry.uop, di_seq, cycle, true);
            if let Some(uop) = core.pool.get_mut(entry.uop) {
                uop.membership.in_eventq = true;
            }
        } else {
            still_pending.push(entry);
        }
    }
    core.awaiting_memory = still_pending;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Bank, CoreId, ContextId, DiSeq, Seq, ThreadId};
    use crate::config::Config;
    use crate::memory::simple::SimpleMemoryModule;
    use crate::pipeline::core::AwaitingMemory;
    use crate::regfile::PhysRegFile;
    use crate::uop::{
        logical, MemoryInfo, Membership, PredictorMeta, RenameInfo, Uop, UopFlags, UopStatus, UopTimestamps,
    };

    fn make_core() -> Core {
        Core::new(CoreId(0), &Config::default()).unwrap()
    }

    #[test]
    fn non_memory_event_due_this_cycle_wakes_its_output_register() {
        let mut core = make_core();
        let (new_phys, _old) = core.rf.get_mut(0).int.rename(logical::gpr(2)).unwrap();
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
                in_eventq: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo {
                logical_outputs: vec![logical::gpr(2)],
                phys_outputs: vec![new_phys],
                ..RenameInfo::default()
            },
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.owner_thread.insert(uid, ThreadId(0));
        core.eventq.schedule(uid, DiSeq(0), 10, false);

        let memory = SimpleMemoryModule::new(1);
        let mispredicted = run(&mut core, &memory, 10);

        assert!(mispredicted.is_empty());
        assert!(core.pool.get(uid).unwrap().status.completed);
        assert!(!core.rf.get(0).int.is_pending(new_phys));
    }

    #[test]
    fn completed_memory_access_is_promoted_and_drained_same_cycle() {
        let mut core = make_core();
        let uop = Uop {
            opcode: 2,
            flags: UopFlags::MEM,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: Some(DiSeq(1)),
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x1004,
            neip: 0x1004,
            mop_size: 4,
            specmode: false,
            membership: Membership::default(),
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo::default(),
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.owner_thread.insert(uid, ThreadId(0));

        let mut memory = SimpleMemoryModule::new(5);
        let handle = memory.access(crate::common::PhysAddr::new(0x100), crate::common::AccessKind::Load, 0);
        core.awaiting_memory.push(AwaitingMemory {
            uop: uid,
            handle,
            thread: ThreadId(0),
        });

        let mispredicted = run(&mut core, &memory, 5);

        assert!(mispredicted.is_empty());
        assert!(core.awaiting_memory.is_empty());
        assert!(core.pool.get(uid).unwrap().status.completed);
    }

    #[test]
    fn unresolved_memory_access_stays_pending() {
        let mut core = make_core();
        let uop = Uop {
            opcode: 2,
            flags: UopFlags::MEM,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: Some(DiSeq(1)),
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x1004,
            neip: 0x1004,
            mop_size: 4,
            specmode: false,
            membership: Membership::default(),
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo::default(),
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.owner_thread.insert(uid, ThreadId(0));

        let mut memory = SimpleMemoryModule::new(10);
        let handle = memory.access(crate::common::PhysAddr::new(0x100), crate::common::AccessKind::Load, 0);
        core.awaiting_memory.push(AwaitingMemory {
            uop: uid,
            handle,
            thread: ThreadId(0),
        });

        run(&mut core, &memory, 2);

        assert_eq!(core.awaiting_memory.len(), 1);
        assert!(!core.pool.get(uid).unwrap().status.completed);
    }

    #[test]
    fn mispredicted_control_uop_is_reported() {
        let mut core = make_core();
        let uop = Uop {
            opcode: 3,
            flags: UopFlags::CTRL,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: Some(DiSeq(0)),
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x2000,
            neip: 0x2000,
            mop_size: 4,
            specmode: false,
            membership: Membership {
                in_eventq: true,
                ..Membership::default()
            },
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo::default(),
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.owner_thread.insert(uid, ThreadId(0));
        core.eventq.schedule(uid, DiSeq(0), 3, false);

        let memory = SimpleMemoryModule::new(1);
        let mispredicted = run(&mut core, &memory, 3);

        assert_eq!(mispredicted, vec![uid]);
        assert!(core.pool.get(uid).unwrap().status.mispredicted);
    }

    #[test]
    fn is_complete_is_consulted_once_per_awaiting_access_and_gates_promotion() {
        use crate::memory::{AccessHandle, MockMemoryModule};

        let mut core = make_core();
        let uop = Uop {
            opcode: 2,
            flags: UopFlags::MEM,
            ctx: ContextId(0),
            seq: Seq(0),
            di_seq: Some(DiSeq(1)),
            eip: 0x1000,
            pred_neip: 0x1004,
            target_neip: 0x1004,
            neip: 0x1004,
            mop_size: 4,
            specmode: false,
            membership: Membership::default(),
            status: UopStatus::default(),
            timestamps: UopTimestamps::default(),
            rename: RenameInfo::default(),
            memory: MemoryInfo::default(),
            predictor_meta: PredictorMeta::default(),
        };
        let uid = core.pool.insert(uop);
        core.owner_thread.insert(uid, ThreadId(0));
        core.awaiting_memory.push(AwaitingMemory {
            uop: uid,
            handle: AccessHandle(7),
            thread: ThreadId(0),
        });

        let mut memory = MockMemoryModule::new();
        memory
            .expect_is_complete()
            .times(1)
            .withf(|handle, now| *handle == AccessHandle(7) && *now == 12)
            .return_const(false);

        run(&mut core, &memory, 12);

        assert_eq!(core.awaiting_memory.len(), 1);
        assert!(!core.pool.get(uid).unwrap().status.completed);
    }
}
