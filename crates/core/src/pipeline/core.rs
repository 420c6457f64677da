//! `Core`: one simulated superscalar core's full execution state (spec.md
//! §3, §5). Owns every structure a `(core, thread)` slot's uops pass
//! through; the guest `Frontend`s and the shared `MemoryModule` stay outside
//! it, threaded through the stage functions by reference from `Simulator`.

use std::collections::HashMap;

use crate::common::{Bank, ConfigError, CoreId, ThreadId, UopId};
use crate::config::{BranchPredictorKind, Config, QueueKind};
use crate::events::{Event, EventAction, EventSink, NoopEventSink};
use crate::eventq::EventQueue;
use crate::fu::FuPool;
use crate::memory::AccessHandle;
use crate::predictor::combined::CombinedConfig;
use crate::predictor::two_level::TwoLevelConfig;
use crate::predictor::{DirectionConfig, PredictorWrapper};
use crate::queues::{IssueQueue, LoadQueue, StoreQueue};
use crate::regfile::PhysRegFile;
use crate::rob::Rob;
use crate::tracecache::TraceCache;
use crate::uop::UopPool;

use super::thread::ThreadState;

/// A load awaiting memory-module completion, staged outside the load queue's
/// own bookkeeping (spec.md §4.5/§4.6: issue reserves `EffAddr`, hands the
/// access to the memory module, and writeback polls `is_complete`).
#[derive(Debug)]
pub struct AwaitingMemory {
    pub uop: UopId,
    pub handle: AccessHandle,
    pub thread: ThreadId,
}

/// One simulated out-of-order core.
#[derive(Debug)]
pub struct Core {
    pub id: CoreId,
    pub pool: UopPool,
    pub rob: Rob,
    pub iq: Bank<IssueQueue>,
    pub lq: Bank<LoadQueue>,
    pub sq: Bank<StoreQueue>,
    pub rf: Bank<PhysRegFile>,
    pub fu: FuPool,
    pub eventq: EventQueue,
    pub predictor: PredictorWrapper,
    pub tracecache: Option<TraceCache>,
    pub threads: Vec<ThreadState>,
    pub awaiting_memory: Vec<AwaitingMemory>,
    /// Round-robin cursor for `TimeSlice`-kind stages.
    pub fetch_rr: usize,
    pub decode_rr: usize,
    pub dispatch_rr: usize,
    pub issue_rr: usize,
    pub commit_rr: usize,
    /// Cycle the current `fetch_rr` thread became sticky, under
    /// `StageKind::SwitchOnEvent` fetch (spec.md §6's fetch-only sharing
    /// policy; a `TimeSlice`/`Shared` core never reads this field).
    pub fetch_sticky_since: u64,
    /// Which hardware thread dispatched each live uop, since `Uop` itself
    /// only carries `ctx` (spec.md §3). Populated at dispatch, consulted by
    /// writeback/commit/recovery to find the right `Bank<PhysRegFile>`
    /// instance, and removed when the uop retires or is squashed.
    pub owner_thread: HashMap<UopId, ThreadId>,
    /// Per-cycle event trace sink (spec.md §6 "Trace file"); [`NoopEventSink`]
    /// unless a caller swaps in [`crate::events::JsonlEventSink`].
    pub event_sink: Box<dyn EventSink>,
}

impl Core {
    /// Records one pipeline event for `uop` at `cycle`, forwarding to
    /// whatever sink is currently installed (a no-op by default).
    pub fn emit(&mut self, cycle: u64, uop: UopId, action: EventAction) {
        self.event_sink.record(Event {
            cycle,
            uop_id: uop,
            action,
        });
    }
}

fn direction_config(cfg: &Config) -> DirectionConfig {
    let bp = &cfg.branch_predictor;
    let two_level = TwoLevelConfig {
        history_bits: bp.two_level_history_size,
        table_size: bp.two_level_l2_size as usize,
    };
    match bp.kind {
        BranchPredictorKind::Perfect => DirectionConfig::Perfect,
        BranchPredictorKind::Taken => DirectionConfig::Taken,
        BranchPredictorKind::NotTaken => DirectionConfig::NotTaken,
        BranchPredictorKind::Bimodal => DirectionConfig::Bimodal {
            size: bp.bimod_size as usize,
        },
        BranchPredictorKind::TwoLevel => DirectionConfig::TwoLevel(two_level),
        BranchPredictorKind::Combined => DirectionConfig::Combined(CombinedConfig {
            bimodal_size: bp.bimod_size as usize,
            two_level,
            choice_size: bp.choice_size as usize,
        }),
    }
}

impl Core {
    /// Builds core `id`'s structures from `config`.
    ///
    /// # Errors
    ///
    /// Propagates `RegFile::new`'s sizing error, or the trace cache's
    /// `TraceSize` bound.
    pub fn new(id: CoreId, config: &Config) -> Result<Self, ConfigError> {
        let threads = config.general.threads as usize;
        let q = &config.queues;

        let rob = match q.rob_kind {
            QueueKind::Private => Rob::new_private(threads, q.rob_size as usize),
            QueueKind::Shared => Rob::new_shared(threads, q.rob_size as usize),
        };

        let iq = match q.iq_kind {
            QueueKind::Private => Bank::private(threads, |_| IssueQueue::new(q.iq_size as usize)),
            QueueKind::Shared => Bank::shared(IssueQueue::new(q.iq_size as usize)),
        };
        let lq = match q.lsq_kind {
            QueueKind::Private => Bank::private(threads, |_| LoadQueue::new(q.lsq_size as usize)),
            QueueKind::Shared => Bank::shared(LoadQueue::new(q.lsq_size as usize)),
        };
        let sq = match q.lsq_kind {
            QueueKind::Private => Bank::private(threads, |_| StoreQueue::new(q.lsq_size as usize)),
            QueueKind::Shared => Bank::shared(StoreQueue::new(q.lsq_size as usize)),
        };

        let rf = match q.rf_kind {
            QueueKind::Private => {
                let mut files = Vec::with_capacity(threads);
                for _ in 0..threads {
                    files.push(PhysRegFile::new(q.rf_int_size as usize, q.rf_fp_size as usize)?);
                }
                Bank::Private(files)
            }
            QueueKind::Shared => {
                Bank::shared(PhysRegFile::new(q.rf_int_size as usize, q.rf_fp_size as usize)?)
            }
        };

        let fu = FuPool::new(config.functional_units.to_specs());

        let bp = &config.branch_predictor;
        let predictor = PredictorWrapper::new(
            direction_config(config),
            bp.btb_sets as usize,
            bp.btb_assoc as usize,
            bp.ras_size as usize,
        );

        let tracecache = if config.trace_cache.present {
            Some(TraceCache::new(
                config.trace_cache.sets as usize,
                config.trace_cache.assoc as usize,
                config.trace_cache.trace_size,
                config.trace_cache.branch_max,
            )?)
        } else {
            None
        };

        Ok(Self {
            id,
            pool: UopPool::new(),
            rob,
            iq,
            lq,
            sq,
            rf,
            fu,
            eventq: EventQueue::new(),
            predictor,
            tracecache,
            threads: (0..threads).map(|_| ThreadState::new()).collect(),
            awaiting_memory: Vec::new(),
            fetch_rr: 0,
            decode_rr: 0,
            dispatch_rr: 0,
            issue_rr: 0,
            commit_rr: 0,
            fetch_sticky_since: 0,
            owner_thread: HashMap::new(),
            event_sink: Box::new(NoopEventSink),
        })
    }
}
