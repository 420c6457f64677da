//! Boundary scenarios exercised end to end through the public `Simulator`
//! surface (S1-S4). S5 (trace-cache hit path) and S6 (directory lock
//! fairness) live as unit tests next to `tracecache`/`fetch` and `directory`
//! respectively, since both need state this crate never exposes through
//! `Simulator` (the installed `TraceCache`, a core's `Directory`).

use uarchsim_core::common::{ContextId, CoreId, PhysAddr, Seq, ThreadId};
use uarchsim_core::config::{BranchPredictorKind, Config};
use uarchsim_core::frontend::scripted::{ScriptedFrontend, ScriptedStep};
use uarchsim_core::memory::simple::SimpleMemoryModule;
use uarchsim_core::uop::{
    logical, MemoryInfo, Membership, PredictorMeta, RenameInfo, Uop, UopFlags, UopStatus,
    UopTimestamps,
};
use uarchsim_core::{RunLimits, Simulator, TerminationReason};

fn int_uop(eip: u64, reg: u8) -> Uop {
    Uop {
        opcode: 1,
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
        membership: Membership::default(),
        status: UopStatus::default(),
        timestamps: UopTimestamps::default(),
        rename: RenameInfo {
            logical_inputs: vec![logical::gpr(reg)],
            logical_outputs: vec![logical::gpr(reg)],
            ..RenameInfo::default()
        },
        memory: MemoryInfo::default(),
        predictor_meta: PredictorMeta::default(),
    }
}

/// A conditional branch uop whose resolved outcome is `taken`. With `taken
/// == false`, `neip` is the fall-through address, so a `NotTaken` predictor
/// matches it without ever consulting a (possibly cold) BTB; with `taken ==
/// true` it diverges to `eip + 0x100` instead.
fn branch_uop(eip: u64, taken: bool) -> Uop {
    let fall_through = eip + 4;
    let target = eip + 0x100;
    Uop {
        opcode: 2,
        flags: UopFlags::CTRL | UopFlags::COND,
        ctx: ContextId(0),
        seq: Seq(0),
        di_seq: None,
        eip,
        pred_neip: fall_through,
        target_neip: target,
        neip: if taken { target } else { fall_through },
        mop_size: 4,
        specmode: false,
        membership: Membership::default(),
        status: UopStatus::default(),
        timestamps: UopTimestamps::default(),
        rename: RenameInfo::default(),
        memory: MemoryInfo::default(),
        predictor_meta: PredictorMeta::default(),
    }
}

fn step(uop: Uop) -> ScriptedStep {
    ScriptedStep {
        uops: vec![uop],
        mop_size: 4,
    }
}

fn one_wide_config() -> Config {
    let mut cfg = Config::default();
    cfg.pipeline.decode_width = 1;
    cfg.pipeline.dispatch_width = 1;
    cfg.pipeline.issue_width = 1;
    cfg.pipeline.commit_width = 1;
    cfg.branch_predictor.kind = BranchPredictorKind::Perfect;
    cfg
}

/// S1: a single non-memory uop, alone in an otherwise empty pipeline,
/// fetches/decodes/dispatches/issues/writes-back/commits with nothing left
/// behind.
#[test]
fn s1_single_uop_retires_cleanly() {
    let cfg = one_wide_config();
    let memory = Box::new(SimpleMemoryModule::new(1));
    let mut sim = Simulator::new(cfg, memory).unwrap();
    sim.spawn_context(0x1000, Box::new(ScriptedFrontend::new(vec![step(int_uop(0x1000, 0))])));

    let reason = sim.run_until(RunLimits {
        max_cycles: Some(1000),
        ..RunLimits::default()
    });

    assert_eq!(reason, TerminationReason::ContextsFinished);
    assert_eq!(sim.stats().total_committed(), 1);
    let branch = sim.stats().threads[&(CoreId(0), ThreadId(0))].branch;
    assert_eq!(branch.branches, 0);
    let ipc = sim.stats().total_committed() as f64 / sim.clock() as f64;
    assert!(ipc > 0.0 && ipc <= 1.0);
}

/// S2: a correctly predicted (not-taken) branch amid straight-line code
/// commits with zero mispredicts and zero squashes.
#[test]
fn s2_correctly_predicted_branch_has_no_mispredicts_or_squashes() {
    let mut cfg = one_wide_config();
    cfg.branch_predictor.kind = BranchPredictorKind::NotTaken;
    let memory = Box::new(SimpleMemoryModule::new(1));
    let mut sim = Simulator::new(cfg, memory).unwrap();
    let steps = vec![
        step(int_uop(0x1000, 1)),
        step(branch_uop(0x1004, false)),
        step(int_uop(0x1008, 2)),
        step(int_uop(0x100C, 3)),
    ];
    sim.spawn_context(0x1000, Box::new(ScriptedFrontend::new(steps)));

    let reason = sim.run_until(RunLimits {
        max_cycles: Some(1000),
        ..RunLimits::default()
    });

    assert_eq!(reason, TerminationReason::ContextsFinished);
    assert_eq!(sim.stats().total_committed(), 4);
    let branch = sim.stats().threads[&(CoreId(0), ThreadId(0))].branch;
    assert_eq!(branch.branches, 1);
    assert_eq!(branch.mispred, 0);
    assert_eq!(branch.squashed, 0);
}

/// S3: a mispredicted branch triggers writeback-time recovery, squashing
/// whatever was speculatively fetched behind it, and the branch itself
/// commits tagged mispredicted.
#[test]
fn s3_mispredicted_branch_squashes_speculative_successors() {
    let mut cfg = one_wide_config();
    cfg.branch_predictor.kind = BranchPredictorKind::NotTaken;
    let memory = Box::new(SimpleMemoryModule::new(1));
    let mut sim = Simulator::new(cfg, memory).unwrap();
    let steps = vec![
        step(int_uop(0x1000, 1)),
        step(branch_uop(0x1004, true)),
        step(int_uop(0x1008, 2)),
        step(int_uop(0x100C, 3)),
    ];
    sim.spawn_context(0x1000, Box::new(ScriptedFrontend::new(steps)));

    let reason = sim.run_until(RunLimits {
        max_cycles: Some(1000),
        ..RunLimits::default()
    });

    assert_eq!(reason, TerminationReason::ContextsFinished);
    let branch = sim.stats().threads[&(CoreId(0), ThreadId(0))].branch;
    assert_eq!(branch.branches, 1);
    assert_eq!(branch.mispred, 1);
    // The two uops fetched speculatively past the mispredicted branch never
    // commit; only the uop before it and the branch itself do.
    assert_eq!(sim.stats().total_committed(), 2);
}

/// S4: a long-latency load at the ROB head blocks commit, so dispatch keeps
/// admitting behind it until the (tiny) ROB fills and later dispatches stall
/// on it, tallied under `stalls.rob`.
#[test]
fn s4_rob_exhaustion_stalls_dispatch() {
    let mut cfg = Config::default();
    cfg.queues.rob_size = 4;
    let memory = Box::new(SimpleMemoryModule::new(1000));
    let mut sim = Simulator::new(cfg, memory).unwrap();

    let mut uops = vec![Uop {
        opcode: 3,
        flags: UopFlags::MEM,
        ctx: ContextId(0),
        seq: Seq(0),
        di_seq: None,
        eip: 0x1000,
        pred_neip: 0x1004,
        target_neip: 0x1004,
        neip: 0x1004,
        mop_size: 4,
        specmode: false,
        membership: Membership::default(),
        status: UopStatus::default(),
        timestamps: UopTimestamps::default(),
        rename: RenameInfo {
            logical_outputs: vec![logical::gpr(0)],
            ..RenameInfo::default()
        },
        memory: MemoryInfo {
            physaddr: Some(PhysAddr::new(0x8000)),
            size: 8,
            handle: None,
        },
        predictor_meta: PredictorMeta::default(),
    }];
    for i in 0..7u64 {
        uops.push(int_uop(0x1004 + i * 4, (i % 15) as u8 + 1));
    }
    let steps: Vec<_> = uops.into_iter().map(step).collect();
    sim.spawn_context(0x1000, Box::new(ScriptedFrontend::new(steps)));

    for _ in 0..20 {
        sim.tick();
    }

    let stalls = sim.stats().threads[&(CoreId(0), ThreadId(0))].stalls;
    assert!(stalls.rob > 0);
    assert_eq!(sim.stats().total_committed(), 0);
}
