//! Configuration system for the pipeline simulator.
//!
//! This module defines all configuration structures and enums used to
//! parameterize the simulator, mirroring spec.md §6's mandatory sections:
//! 1. **Defaults:** baseline widths, queue sizes, and predictor constants.
//! 2. **Structures:** `General`, `Pipeline`, `Queues`, `TraceCache`,
//!    `FunctionalUnits`, `BranchPredictor`.
//! 3. **Validation:** cross-field constraints (`Config::validate`).
//!
//! Configuration is supplied as JSON (`Config::validate` runs after
//! deserialization) or via `Config::default()` for the CLI.

use serde::Deserialize;

use crate::common::ConfigError;
use crate::fu::{FuClass, FuSpec};

/// Default configuration constants for the simulator.
mod defaults {
    /// Hardware core count.
    pub const CORES: usize = 1;
    /// Hardware threads per core.
    pub const THREADS: usize = 1;
    /// Cycles since the oldest allocation before a dynamic-mode eviction is
    /// signaled.
    pub const CONTEXT_QUANTUM: u64 = 1_000_000;
    /// Cycles a thread runs uninterrupted under time-slice fetch/dispatch.
    pub const THREAD_QUANTUM: u64 = 1000;
    /// Pipeline flush penalty on a thread switch.
    pub const THREAD_SWITCH_PENALTY: u64 = 0;
    /// Cycles a recovering thread stalls before resuming fetch.
    pub const RECOVER_PENALTY: u64 = 2;
    /// Guest page size in bytes (used only by the `Frontend` collaborator,
    /// not the pipeline itself).
    pub const PAGE_SIZE: u64 = 4096;

    /// Uops decoded per cycle.
    pub const DECODE_WIDTH: u32 = 4;
    /// Uops dispatched per cycle.
    pub const DISPATCH_WIDTH: u32 = 4;
    /// Uops issued per cycle.
    pub const ISSUE_WIDTH: u32 = 4;
    /// Uops committed per cycle.
    pub const COMMIT_WIDTH: u32 = 4;

    /// Fetch-queue capacity in bytes.
    pub const FETCH_QUEUE_SIZE: u32 = 64;
    /// Per-thread uop-queue capacity.
    pub const UOP_QUEUE_SIZE: u32 = 32;
    /// Reorder-buffer entries.
    pub const ROB_SIZE: u32 = 64;
    /// Issue-queue entries.
    pub const IQ_SIZE: u32 = 32;
    /// Load/store-queue entries.
    pub const LSQ_SIZE: u32 = 16;
    /// Integer physical register file size.
    pub const RF_INT_SIZE: u32 = 80;
    /// FP physical register file size.
    pub const RF_FP_SIZE: u32 = 40;

    /// Trace-cache set count.
    pub const TC_SETS: u32 = 64;
    /// Trace-cache associativity.
    pub const TC_ASSOC: u32 = 4;
    /// Maximum uops per trace.
    pub const TC_TRACE_SIZE: u32 = 16;
    /// Maximum branches per trace.
    pub const TC_BRANCH_MAX: u32 = 3;
    /// Traces fetchable per cycle.
    pub const TC_QUEUE_SIZE: u32 = 4;

    /// BTB set count.
    pub const BTB_SETS: u32 = 512;
    /// BTB associativity.
    pub const BTB_ASSOC: u32 = 4;
    /// Bimodal-table entry count.
    pub const BIMOD_SIZE: u32 = 1024;
    /// Tournament choice-table entry count.
    pub const CHOICE_SIZE: u32 = 1024;
    /// Return-address-stack depth.
    pub const RAS_SIZE: u32 = 32;
    /// Two-level first-level history-register count.
    pub const TWO_LEVEL_L1_SIZE: u32 = 1;
    /// Two-level pattern-history-table entry count.
    pub const TWO_LEVEL_L2_SIZE: u32 = 1024;
    /// Two-level global-history register width in bits.
    pub const TWO_LEVEL_HISTORY_SIZE: u32 = 10;

    /// Functional-unit instance count, per class.
    pub const FU_COUNT: u32 = 1;
    /// Functional-unit result latency in cycles, per class.
    pub const FU_OP_LAT: u32 = 1;
    /// Functional-unit issue (occupancy) latency in cycles, per class.
    pub const FU_ISSUE_LAT: u32 = 1;
}

/// Static vs. time-multiplexed sharing of a per-core pipeline stage's
/// bandwidth across hardware threads (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StageKind {
    /// Every thread may use the full stage width every cycle (`Threads=1`,
    /// or genuinely shared resources).
    #[default]
    Shared,
    /// Threads round-robin the stage's bandwidth, one thread per cycle.
    TimeSlice,
    /// Switch thread only on a stall/flush/quantum event (fetch only).
    SwitchOnEvent,
}

/// Recovery trigger point: whether a mispredicted branch squashes at
/// writeback (as soon as it's detected) or is deferred to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RecoverKind {
    #[default]
    Writeback,
    Commit,
}

/// Private-vs-shared partitioning of a per-core structure across its
/// hardware threads (spec.md §5, `common::Bank`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueKind {
    #[default]
    Private,
    Shared,
}

/// Direction-prediction scheme (spec.md §4.9, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BranchPredictorKind {
    Perfect,
    Taken,
    NotTaken,
    #[default]
    Bimodal,
    TwoLevel,
    Combined,
}

/// Root configuration, deserialized from JSON and validated once with
/// [`Config::validate`] before the simulator is built.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Core/thread topology, context scheduling, recovery timing.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Per-stage bandwidth and sharing policy.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Fetch/uop/ROB/IQ/LSQ/register-file sizing and sharing.
    #[serde(default)]
    pub queues: QueuesConfig,
    /// Trace-cache presence and sizing.
    #[serde(default)]
    pub trace_cache: TraceCacheConfig,
    /// Per-functional-unit-class count/latency.
    #[serde(default)]
    pub functional_units: FunctionalUnitsConfig,
    /// Branch-predictor scheme and structure sizing.
    #[serde(default)]
    pub branch_predictor: BranchPredictorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            pipeline: PipelineConfig::default(),
            queues: QueuesConfig::default(),
            trace_cache: TraceCacheConfig::default(),
            functional_units: FunctionalUnitsConfig::default(),
            branch_predictor: BranchPredictorConfig::default(),
        }
    }
}

impl Config {
    /// Validates cross-field constraints spec.md §7 calls out by name
    /// (e.g. `RfIntSize < min`), returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.cores == 0 {
            return Err(ConfigError::OutOfRange {
                section: "General".to_owned(),
                key: "Cores".to_owned(),
                value: self.general.cores.to_string(),
                bound: ">= 1".to_owned(),
            });
        }
        if self.general.threads == 0 {
            return Err(ConfigError::OutOfRange {
                section: "General".to_owned(),
                key: "Threads".to_owned(),
                value: self.general.threads.to_string(),
                bound: ">= 1".to_owned(),
            });
        }
        const MIN_RF_INT: u32 = 32;
        if self.queues.rf_int_size < MIN_RF_INT {
            return Err(ConfigError::DependentConstraint {
                detail: format!(
                    "Queues.RfIntSize = {} is below the {} physical registers needed to cover \
                     the architected integer register set plus in-flight renames",
                    self.queues.rf_int_size, MIN_RF_INT
                ),
            });
        }
        if self.queues.rob_size == 0 || self.queues.iq_size == 0 || self.queues.lsq_size == 0 {
            return Err(ConfigError::DependentConstraint {
                detail: "Queues.RobSize, IqSize, and LsqSize must all be >= 1".to_owned(),
            });
        }
        if self.trace_cache.present && self.trace_cache.trace_size == 0 {
            return Err(ConfigError::DependentConstraint {
                detail: "TraceCache.TraceSize must be >= 1 when TraceCache.Present is true"
                    .to_owned(),
            });
        }
        Ok(())
    }
}

/// Core/thread topology, context scheduling, and recovery timing
/// (spec.md §6 `General`).
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "GeneralConfig::default_cores")]
    pub cores: u32,
    #[serde(default = "GeneralConfig::default_threads")]
    pub threads: u32,
    /// Cycles of functional-only fast-forward before cycle-accurate timing
    /// begins.
    #[serde(default)]
    pub fast_forward: u64,
    /// Whether the context scheduler may evict a running context to free a
    /// hardware-thread slot for another (dynamic mode).
    #[serde(default)]
    pub context_switch: bool,
    #[serde(default = "GeneralConfig::default_context_quantum")]
    pub context_quantum: u64,
    #[serde(default = "GeneralConfig::default_thread_quantum")]
    pub thread_quantum: u64,
    #[serde(default)]
    pub thread_switch_penalty: u64,
    #[serde(default)]
    pub recover_kind: RecoverKind,
    #[serde(default = "GeneralConfig::default_recover_penalty")]
    pub recover_penalty: u64,
    #[serde(default = "GeneralConfig::default_page_size")]
    pub page_size: u64,
}

impl GeneralConfig {
    fn default_cores() -> u32 {
        defaults::CORES as u32
    }
    fn default_threads() -> u32 {
        defaults::THREADS as u32
    }
    fn default_context_quantum() -> u64 {
        defaults::CONTEXT_QUANTUM
    }
    fn default_thread_quantum() -> u64 {
        defaults::THREAD_QUANTUM
    }
    fn default_recover_penalty() -> u64 {
        defaults::RECOVER_PENALTY
    }
    fn default_page_size() -> u64 {
        defaults::PAGE_SIZE
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cores: defaults::CORES as u32,
            threads: defaults::THREADS as u32,
            fast_forward: 0,
            context_switch: false,
            context_quantum: defaults::CONTEXT_QUANTUM,
            thread_quantum: defaults::THREAD_QUANTUM,
            thread_switch_penalty: defaults::THREAD_SWITCH_PENALTY,
            recover_kind: RecoverKind::default(),
            recover_penalty: defaults::RECOVER_PENALTY,
            page_size: defaults::PAGE_SIZE,
        }
    }
}

/// Per-stage bandwidth and cross-thread sharing policy (spec.md §6
/// `Pipeline`).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub fetch_kind: StageKind,
    #[serde(default = "PipelineConfig::default_decode_width")]
    pub decode_width: u32,
    #[serde(default)]
    pub dispatch_kind: StageKind,
    #[serde(default = "PipelineConfig::default_dispatch_width")]
    pub dispatch_width: u32,
    #[serde(default)]
    pub issue_kind: StageKind,
    #[serde(default = "PipelineConfig::default_issue_width")]
    pub issue_width: u32,
    #[serde(default)]
    pub commit_kind: StageKind,
    #[serde(default = "PipelineConfig::default_commit_width")]
    pub commit_width: u32,
    /// Emit per-structure occupancy statistics (costs a counter increment
    /// per access; off by default for throughput-sensitive runs).
    #[serde(default)]
    pub occupancy_stats: bool,
}

impl PipelineConfig {
    fn default_decode_width() -> u32 {
        defaults::DECODE_WIDTH
    }
    fn default_dispatch_width() -> u32 {
        defaults::DISPATCH_WIDTH
    }
    fn default_issue_width() -> u32 {
        defaults::ISSUE_WIDTH
    }
    fn default_commit_width() -> u32 {
        defaults::COMMIT_WIDTH
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_kind: StageKind::default(),
            decode_width: defaults::DECODE_WIDTH,
            dispatch_kind: StageKind::default(),
            dispatch_width: defaults::DISPATCH_WIDTH,
            issue_kind: StageKind::default(),
            issue_width: defaults::ISSUE_WIDTH,
            commit_kind: StageKind::default(),
            commit_width: defaults::COMMIT_WIDTH,
            occupancy_stats: false,
        }
    }
}

/// Fetch/uop/ROB/IQ/LSQ/register-file sizing and private-vs-shared
/// partitioning (spec.md §6 `Queues`). Sizes are per-thread when the
/// corresponding `*_kind` is `Private`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueuesConfig {
    #[serde(default = "QueuesConfig::default_fetch_queue_size")]
    pub fetch_queue_size: u32,
    #[serde(default = "QueuesConfig::default_uop_queue_size")]
    pub uop_queue_size: u32,
    #[serde(default)]
    pub rob_kind: QueueKind,
    #[serde(default = "QueuesConfig::default_rob_size")]
    pub rob_size: u32,
    #[serde(default)]
    pub iq_kind: QueueKind,
    #[serde(default = "QueuesConfig::default_iq_size")]
    pub iq_size: u32,
    /// Defaults to `Private` (see `DESIGN.md`'s Open Question resolution).
    #[serde(default)]
    pub lsq_kind: QueueKind,
    #[serde(default = "QueuesConfig::default_lsq_size")]
    pub lsq_size: u32,
    #[serde(default)]
    pub rf_kind: QueueKind,
    #[serde(default = "QueuesConfig::default_rf_int_size")]
    pub rf_int_size: u32,
    #[serde(default = "QueuesConfig::default_rf_fp_size")]
    pub rf_fp_size: u32,
}

impl QueuesConfig {
    fn default_fetch_queue_size() -> u32 {
        defaults::FETCH_QUEUE_SIZE
    }
    fn default_uop_queue_size() -> u32 {
        defaults::UOP_QUEUE_SIZE
    }
    fn default_rob_size() -> u32 {
        defaults::ROB_SIZE
    }
    fn default_iq_size() -> u32 {
        defaults::IQ_SIZE
    }
    fn default_lsq_size() -> u32 {
        defaults::LSQ_SIZE
    }
    fn default_rf_int_size() -> u32 {
        defaults::RF_INT_SIZE
    }
    fn default_rf_fp_size() -> u32 {
        defaults::RF_FP_SIZE
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            fetch_queue_size: defaults::FETCH_QUEUE_SIZE,
            uop_queue_size: defaults::UOP_QUEUE_SIZE,
            rob_kind: QueueKind::default(),
            rob_size: defaults::ROB_SIZE,
            iq_kind: QueueKind::default(),
            iq_size: defaults::IQ_SIZE,
            lsq_kind: QueueKind::default(),
            lsq_size: defaults::LSQ_SIZE,
            rf_kind: QueueKind::default(),
            rf_int_size: defaults::RF_INT_SIZE,
            rf_fp_size: defaults::RF_FP_SIZE,
        }
    }
}

/// Trace-cache presence and sizing (spec.md §6 `TraceCache`).
#[derive(Debug, Clone, Deserialize)]
pub struct TraceCacheConfig {
    #[serde(default)]
    pub present: bool,
    #[serde(default = "TraceCacheConfig::default_sets")]
    pub sets: u32,
    #[serde(default = "TraceCacheConfig::default_assoc")]
    pub assoc: u32,
    #[serde(default = "TraceCacheConfig::default_trace_size")]
    pub trace_size: u32,
    #[serde(default = "TraceCacheConfig::default_branch_max")]
    pub branch_max: u32,
    #[serde(default = "TraceCacheConfig::default_queue_size")]
    pub queue_size: u32,
}

impl TraceCacheConfig {
    fn default_sets() -> u32 {
        defaults::TC_SETS
    }
    fn default_assoc() -> u32 {
        defaults::TC_ASSOC
    }
    fn default_trace_size() -> u32 {
        defaults::TC_TRACE_SIZE
    }
    fn default_branch_max() -> u32 {
        defaults::TC_BRANCH_MAX
    }
    fn default_queue_size() -> u32 {
        defaults::TC_QUEUE_SIZE
    }
}

impl Default for TraceCacheConfig {
    fn default() -> Self {
        Self {
            present: false,
            sets: defaults::TC_SETS,
            assoc: defaults::TC_ASSOC,
            trace_size: defaults::TC_TRACE_SIZE,
            branch_max: defaults::TC_BRANCH_MAX,
            queue_size: defaults::TC_QUEUE_SIZE,
        }
    }
}

/// Per-class functional-unit count and latency (spec.md §6
/// `FunctionalUnits`), one entry per `FuClass`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FuClassConfig {
    #[serde(default = "FuClassConfig::default_count")]
    pub count: u32,
    #[serde(default = "FuClassConfig::default_op_lat")]
    pub op_lat: u32,
    #[serde(default = "FuClassConfig::default_issue_lat")]
    pub issue_lat: u32,
}

impl FuClassConfig {
    fn default_count() -> u32 {
        defaults::FU_COUNT
    }
    fn default_op_lat() -> u32 {
        defaults::FU_OP_LAT
    }
    fn default_issue_lat() -> u32 {
        defaults::FU_ISSUE_LAT
    }
}

impl Default for FuClassConfig {
    fn default() -> Self {
        Self {
            count: defaults::FU_COUNT,
            op_lat: defaults::FU_OP_LAT,
            issue_lat: defaults::FU_ISSUE_LAT,
        }
    }
}

/// One `FuClassConfig` per `FuClass` (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionalUnitsConfig {
    #[serde(default)]
    pub int_add: FuClassConfig,
    #[serde(default)]
    pub int_mult: FuClassConfig,
    #[serde(default)]
    pub int_div: FuClassConfig,
    #[serde(default)]
    pub eff_addr: FuClassConfig,
    #[serde(default)]
    pub logic: FuClassConfig,
    #[serde(default)]
    pub fp_simple: FuClassConfig,
    #[serde(default)]
    pub fp_add: FuClassConfig,
    #[serde(default)]
    pub fp_mult: FuClassConfig,
    #[serde(default)]
    pub fp_div: FuClassConfig,
    #[serde(default)]
    pub fp_complex: FuClassConfig,
}

impl Default for FunctionalUnitsConfig {
    fn default() -> Self {
        Self {
            int_add: FuClassConfig::default(),
            int_mult: FuClassConfig::default(),
            int_div: FuClassConfig::default(),
            eff_addr: FuClassConfig::default(),
            logic: FuClassConfig::default(),
            fp_simple: FuClassConfig::default(),
            fp_add: FuClassConfig::default(),
            fp_mult: FuClassConfig::default(),
            fp_div: FuClassConfig::default(),
            fp_complex: FuClassConfig::default(),
        }
    }
}

impl FunctionalUnitsConfig {
    /// Looks up the configured `(count, op_lat, issue_lat)` for `class`, in
    /// `FuClass::ALL` order, for `FuPool::new`.
    #[must_use]
    pub fn get(&self, class: FuClass) -> FuClassConfig {
        match class {
            FuClass::IntAdd => self.int_add,
            FuClass::IntMult => self.int_mult,
            FuClass::IntDiv => self.int_div,
            FuClass::EffAddr => self.eff_addr,
            FuClass::Logic => self.logic,
            FuClass::FpSimple => self.fp_simple,
            FuClass::FpAdd => self.fp_add,
            FuClass::FpMult => self.fp_mult,
            FuClass::FpDiv => self.fp_div,
            FuClass::FpComplex => self.fp_complex,
        }
    }

    /// Builds the `[FuSpec; 10]` table `FuPool::new` expects, in
    /// `FuClass::ALL` order.
    #[must_use]
    pub fn to_specs(&self) -> [FuSpec; 10] {
        std::array::from_fn(|i| {
            let cfg = self.get(FuClass::ALL[i]);
            FuSpec {
                count: cfg.count,
                op_latency: cfg.op_lat,
                issue_latency: cfg.issue_lat,
            }
        })
    }
}

/// BTB/bimodal/choice/RAS/two-level sizing for the configured predictor
/// scheme (spec.md §6 `BranchPredictor`).
#[derive(Debug, Clone, Deserialize)]
pub struct BranchPredictorConfig {
    #[serde(default)]
    pub kind: BranchPredictorKind,
    #[serde(default = "BranchPredictorConfig::default_btb_sets")]
    pub btb_sets: u32,
    #[serde(default = "BranchPredictorConfig::default_btb_assoc")]
    pub btb_assoc: u32,
    #[serde(default = "BranchPredictorConfig::default_bimod_size")]
    pub bimod_size: u32,
    #[serde(default = "BranchPredictorConfig::default_choice_size")]
    pub choice_size: u32,
    #[serde(default = "BranchPredictorConfig::default_ras_size")]
    pub ras_size: u32,
    #[serde(default = "BranchPredictorConfig::default_two_level_l1_size")]
    pub two_level_l1_size: u32,
    #[serde(default = "BranchPredictorConfig::default_two_level_l2_size")]
    pub two_level_l2_size: u32,
    #[serde(default = "BranchPredictorConfig::default_two_level_history_size")]
    pub two_level_history_size: u32,
}

impl BranchPredictorConfig {
    fn default_btb_sets() -> u32 {
        defaults::BTB_SETS
    }
    fn default_btb_assoc() -> u32 {
        defaults::BTB_ASSOC
    }
    fn default_bimod_size() -> u32 {
        defaults::BIMOD_SIZE
    }
    fn default_choice_size() -> u32 {
        defaults::CHOICE_SIZE
    }
    fn default_ras_size() -> u32 {
        defaults::RAS_SIZE
    }
    fn default_two_level_l1_size() -> u32 {
        defaults::TWO_LEVEL_L1_SIZE
    }
    fn default_two_level_l2_size() -> u32 {
        defaults::TWO_LEVEL_L2_SIZE
    }
    fn default_two_level_history_size() -> u32 {
        defaults::TWO_LEVEL_HISTORY_SIZE
    }
}

impl Default for BranchPredictorConfig {
    fn default() -> Self {
        Self {
            kind: BranchPredictorKind::default(),
            btb_sets: defaults::BTB_SETS,
            btb_assoc: defaults::BTB_ASSOC,
            bimod_size: defaults::BIMOD_SIZE,
            choice_size: defaults::CHOICE_SIZE,
            ras_size: defaults::RAS_SIZE,
            two_level_l1_size: defaults::TWO_LEVEL_L1_SIZE,
            two_level_l2_size: defaults::TWO_LEVEL_L2_SIZE,
            two_level_history_size: defaults::TWO_LEVEL_HISTORY_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_cores_is_rejected() {
        let mut cfg = Config::default();
        cfg.general.cores = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn undersized_int_register_file_is_rejected() {
        let mut cfg = Config::default();
        cfg.queues.rf_int_size = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn lsq_kind_defaults_to_private() {
        assert_eq!(QueuesConfig::default().lsq_kind, QueueKind::Private);
    }

    #[test]
    fn deserializes_from_partial_json() {
        let cfg: Config = serde_json::from_str(r#"{"general": {"cores": 2}}"#).unwrap();
        assert_eq!(cfg.general.cores, 2);
        assert_eq!(cfg.general.threads, defaults::THREADS as u32);
    }
}
