//! Simulation statistics collection and reporting.
//!
//! Tracks the report-output shape spec.md §6 calls for: global counts,
//! per-core and per-thread dispatch/issue/commit uop histograms, IPC and
//! duty cycle, branch outcome counts, per-functional-unit occupancy, per-
//! structure occupancy, and dispatch-stall buckets. Grounded on the
//! teacher's `stats.rs`: the `want(section)` closure gating each printed
//! block, the `Instant`-based host-time summary, and guarded division via
//! `if x == 0 { 1 } else { x }` throughout.

use std::collections::HashMap;
use std::time::Instant;

use crate::common::{CoreId, ThreadId};
use crate::fu::FuClass;

/// Dispatch-stall admission-check buckets a failed dispatch slot is
/// classified under (spec.md §4.4, §6).
#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchStalls {
    /// Dispatch slot successfully used this cycle on a non-speculative uop.
    pub used: u64,
    /// Dispatch slot successfully used this cycle on a uop dispatched under
    /// `specmode` (an ancestor branch is still unresolved). A split of
    /// successful dispatches, not a failure bucket: `used` and `spec` are
    /// mutually exclusive per slot and neither is incremented on a stall.
    pub spec: u64,
    /// Blocked: source thread's uop queue was empty.
    pub uopq: u64,
    /// Blocked: ROB had no free entry.
    pub rob: u64,
    /// Blocked: issue queue had no free entry.
    pub iq: u64,
    /// Blocked: load/store queue had no free entry.
    pub lsq: u64,
    /// Blocked: physical register file had no free register for an output.
    pub rename: u64,
    /// Blocked: thread's eviction signal is pending (context scheduler).
    pub ctx: u64,
}

/// Uop-classification totals retired this cycle/run (spec.md §6
/// "integer/logic/FP/memory/control totals").
#[derive(Clone, Copy, Debug, Default)]
pub struct UopMix {
    pub int: u64,
    pub logic: u64,
    pub fp: u64,
    pub mem: u64,
    pub ctrl: u64,
}

/// Branch outcome counts at commit (spec.md §6 `{Branches, Squashed,
/// Mispred, PredAcc}`).
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchStats {
    pub branches: u64,
    pub squashed: u64,
    pub mispred: u64,
}

impl BranchStats {
    /// Prediction accuracy over resolved (non-squashed) branches, guarded
    /// against division by zero.
    #[must_use]
    pub fn pred_acc(&self) -> f64 {
        let resolved = self.branches.saturating_sub(self.squashed);
        if resolved == 0 {
            0.0
        } else {
            100.0 * (1.0 - self.mispred as f64 / resolved as f64)
        }
    }
}

/// Occupancy accounting for one sized structure (ROB/IQ/LSQ/RF): spec.md §6
/// `{Size, Occupancy, Full, Reads, Writes}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StructureStats {
    pub size: u32,
    occupancy_sample_sum: u64,
    samples: u64,
    pub full_cycles: u64,
    pub reads: u64,
    pub writes: u64,
}

impl StructureStats {
    /// Records one cycle's occupancy sample (for average-occupancy
    /// reporting) and whether the structure was full.
    pub fn sample(&mut self, occupancy: u32) {
        self.occupancy_sample_sum += u64::from(occupancy);
        self.samples += 1;
        if occupancy >= self.size {
            self.full_cycles += 1;
        }
    }

    /// Mean occupancy across all recorded samples, guarded against an
    /// unsampled structure.
    #[must_use]
    pub fn mean_occupancy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.occupancy_sample_sum as f64 / self.samples as f64
        }
    }
}

/// A histogram of committed/issued/dispatched uops by opcode.
#[derive(Clone, Debug, Default)]
pub struct OpcodeHistogram(HashMap<u32, u64>);

impl OpcodeHistogram {
    /// Records one occurrence of `opcode`.
    pub fn record(&mut self, opcode: u32) {
        *self.0.entry(opcode).or_insert(0) += 1;
    }

    /// Total recorded occurrences across all opcodes.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// The `n` most frequent opcodes, descending by count.
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<(u32, u64)> {
        let mut entries: Vec<_> = self.0.iter().map(|(&op, &count)| (op, count)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }
}

/// Per-hardware-thread statistics.
#[derive(Clone, Debug, Default)]
pub struct ThreadStats {
    pub dispatch_hist: OpcodeHistogram,
    pub issue_hist: OpcodeHistogram,
    pub commit_hist: OpcodeHistogram,
    pub mix: UopMix,
    pub committed: u64,
    pub branch: BranchStats,
    pub stalls: DispatchStalls,
}

/// Per-core structure and functional-unit statistics (resources owned at
/// core granularity even when per-thread occupancy is tracked separately).
#[derive(Clone, Debug, Default)]
pub struct CoreStats {
    pub rob: StructureStats,
    pub iq: StructureStats,
    pub lsq: StructureStats,
    pub rf_int: StructureStats,
    pub rf_fp: StructureStats,
    fu_accesses: [u64; 10],
    fu_denied: [u64; 10],
    fu_waiting_time: [u64; 10],
}

impl CoreStats {
    /// Records this cycle's `FuPool::counters` snapshot for `class` (the
    /// pool tracks cumulative counters; this stores the latest snapshot for
    /// reporting).
    pub fn record_fu(&mut self, class: FuClass, accesses: u64, denied: u64, waiting_time: u64) {
        let idx = FuClass::ALL.iter().position(|c| *c == class).unwrap_or(0);
        self.fu_accesses[idx] = accesses;
        self.fu_denied[idx] = denied;
        self.fu_waiting_time[idx] = waiting_time;
    }
}

/// Global simulation statistics: per-core and per-thread breakdowns plus
/// the host-time summary.
#[derive(Clone)]
pub struct Stats {
    start_time: Instant,
    pub cycles: u64,
    pub threads: HashMap<(CoreId, ThreadId), ThreadStats>,
    pub cores: HashMap<CoreId, CoreStats>,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            threads: HashMap::new(),
            cores: HashMap::new(),
        }
    }
}

impl Stats {
    /// Creates a fresh stats collector, timing from the call site.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to `thread`'s stats, creating a default entry on
    /// first use.
    pub fn thread_mut(&mut self, core: CoreId, thread: ThreadId) -> &mut ThreadStats {
        self.threads.entry((core, thread)).or_default()
    }

    /// Mutable access to `core`'s stats, creating a default entry on first
    /// use.
    pub fn core_mut(&mut self, core: CoreId) -> &mut CoreStats {
        self.cores.entry(core).or_default()
    }

    /// Global committed-uop count, summed across all threads.
    #[must_use]
    pub fn total_committed(&self) -> u64 {
        self.threads.values().map(|t| t.committed).sum()
    }

    fn total_branches(&self) -> BranchStats {
        self.threads.values().fold(BranchStats::default(), |acc, t| {
            BranchStats {
                branches: acc.branches + t.branch.branches,
                squashed: acc.squashed + t.branch.squashed,
                mispred: acc.mispred + t.branch.mispred,
            }
        })
    }
}

/// Section names for selective stats output.
pub const STATS_SECTIONS: &[&str] = &["summary", "threads", "branch", "functional_units", "structures"];

impl Stats {
    /// Prints only the requested statistics sections to stdout. Pass an
    /// empty slice to print all sections (same as `print()`).
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let duration = self.start_time.elapsed();
        let seconds = duration.as_secs_f64();
        let cyc = if self.cycles == 0 { 1 } else { self.cycles };
        let instr = self.total_committed();
        let instr_guarded = if instr == 0 { 1 } else { instr };

        if want("summary") {
            let ipc = instr as f64 / cyc as f64;
            let duty_cycle = instr_guarded as f64 / cyc as f64;
            println!("==========================================================");
            println!("PIPELINE SIMULATION STATISTICS");
            println!("==========================================================");
            println!("host_seconds             {seconds:.4} s");
            println!("sim_cycles               {}", self.cycles);
            println!("sim_insts                {instr}");
            println!("sim_ipc                  {ipc:.4}");
            println!("sim_duty_cycle           {duty_cycle:.4}");
            println!("----------------------------------------------------------");
        }

        if want("threads") {
            println!("PER-THREAD BREAKDOWN");
            let mut keys: Vec<_> = self.threads.keys().copied().collect();
            keys.sort_by_key(|(c, t)| (c.0, t.0));
            for key in keys {
                let t = &self.threads[&key];
                println!("  thread core={} thread={}", key.0 .0, key.1 .0);
                println!("    committed            {}", t.committed);
                println!(
                    "    mix.int/logic/fp/mem/ctrl  {}/{}/{}/{}/{}",
                    t.mix.int, t.mix.logic, t.mix.fp, t.mix.mem, t.mix.ctrl
                );
                println!(
                    "    stalls.used/spec/uopq/rob/iq/lsq/rename/ctx  \
                     {}/{}/{}/{}/{}/{}/{}/{}",
                    t.stalls.used,
                    t.stalls.spec,
                    t.stalls.uopq,
                    t.stalls.rob,
                    t.stalls.iq,
                    t.stalls.lsq,
                    t.stalls.rename,
                    t.stalls.ctx
                );
            }
            println!("----------------------------------------------------------");
        }

        if want("branch") {
            let b = self.total_branches();
            println!("BRANCH PREDICTION");
            println!("  branches               {}", b.branches);
            println!("  squashed               {}", b.squashed);
            println!("  mispred                {}", b.mispred);
            println!("  pred_acc               {:.2}%", b.pred_acc());
            println!("----------------------------------------------------------");
        }

        if want("functional_units") {
            println!("FUNCTIONAL UNITS");
            let mut keys: Vec<_> = self.cores.keys().copied().collect();
            keys.sort_by_key(|c| c.0);
            for core in keys {
                let c = &self.cores[&core];
                println!("  core={}", core.0);
                for (i, class) in FuClass::ALL.iter().enumerate() {
                    println!(
                        "    {:<10} accesses={:<8} denied={:<8} waiting_time={}",
                        format!("{class:?}"),
                        c.fu_accesses[i],
                        c.fu_denied[i],
                        c.fu_waiting_time[i]
                    );
                }
            }
            println!("----------------------------------------------------------");
        }

        if want("structures") {
            println!("STRUCTURE OCCUPANCY");
            let mut keys: Vec<_> = self.cores.keys().copied().collect();
            keys.sort_by_key(|c| c.0);
            let print_structure = |name: &str, s: &StructureStats| {
                println!(
                    "    {:<8} size={:<6} mean_occ={:<8.2} full_cycles={:<8} reads={:<8} writes={}",
                    name,
                    s.size,
                    s.mean_occupancy(),
                    s.full_cycles,
                    s.reads,
                    s.writes
                );
            };
            for core in keys {
                let c = &self.cores[&core];
                println!("  core={}", core.0);
                print_structure("rob", &c.rob);
                print_structure("iq", &c.iq);
                print_structure("lsq", &c.lsq);
                print_structure("rf_int", &c.rf_int);
                print_structure("rf_fp", &c.rf_fp);
            }
        }
        println!("==========================================================");
    }

    /// Prints all statistics sections to stdout. Equivalent to
    /// `print_sections(&[])`.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pred_acc_is_guarded_against_no_resolved_branches() {
        let b = BranchStats::default();
        assert_eq!(b.pred_acc(), 0.0);
    }

    #[test]
    fn pred_acc_excludes_squashed_branches_from_the_denominator() {
        let b = BranchStats {
            branches: 10,
            squashed: 4,
            mispred: 1,
        };
        // 6 resolved, 1 mispredicted => ~83.33%.
        assert!((b.pred_acc() - 83.333).abs() < 0.01);
    }

    #[test]
    fn structure_mean_occupancy_and_full_cycles_track_samples() {
        let mut s = StructureStats {
            size: 4,
            ..Default::default()
        };
        s.sample(2);
        s.sample(4);
        s.sample(0);
        assert!((s.mean_occupancy() - 2.0).abs() < f64::EPSILON);
        assert_eq!(s.full_cycles, 1);
    }

    #[test]
    fn opcode_histogram_top_n_is_sorted_descending() {
        let mut h = OpcodeHistogram::default();
        for _ in 0..5 {
            h.record(1);
        }
        for _ in 0..2 {
            h.record(2);
        }
        h.record(3);
        let top = h.top(2);
        assert_eq!(top[0], (1, 5));
        assert_eq!(top[1], (2, 2));
    }

    #[test]
    fn total_committed_sums_across_threads() {
        let mut stats = Stats::new();
        stats.thread_mut(CoreId(0), ThreadId(0)).committed = 10;
        stats.thread_mut(CoreId(0), ThreadId(1)).committed = 5;
        assert_eq!(stats.total_committed(), 15);
    }
}
