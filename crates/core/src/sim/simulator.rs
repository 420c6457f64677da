//! `Simulator`: the top-level handle owning every core, the guest-context
//! table, the context scheduler, and the shared memory module (spec.md §2).
//!
//! Grounded on the teacher's `sim/simulator.rs` pairing of a `Cpu` with a
//! pipeline, generalized from one always-resident core to `general.cores`
//! cores each with `general.threads` hardware threads, and from an implicit
//! single guest to an explicit [`ContextTable`] contexts bind into through
//! the [`ContextScheduler`] (spec.md §4.11).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{ConfigError, ContextId, CoreId, ThreadId};
use crate::config::Config;
use crate::context::ContextTable;
use crate::events::EventSink;
use crate::frontend::{ContextStatus, Frontend};
use crate::memory::MemoryModule;
use crate::pipeline::core::Core;
use crate::pipeline::run_core_cycle;
use crate::scheduler::{ContextScheduler, Mode, Slot};
use crate::stats::Stats;

/// Bounds governing how long [`Simulator::run_until`] advances before
/// stopping (spec.md §6 "Termination codes"). Supplied by the driver (the
/// CLI's `--max-cycles`/`--max-instructions` flags) rather than baked into
/// `Config`, since they describe one run's stopping condition, not the
/// machine being simulated.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_cycles: Option<u64>,
    pub max_instructions: Option<u64>,
    pub max_wall_time: Option<Duration>,
    /// Consecutive cycles with zero commits across every core before
    /// `run_until` gives up and reports `Stall`.
    pub stall_threshold: u64,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_cycles: None,
            max_instructions: None,
            max_wall_time: None,
            stall_threshold: 1_000_000,
        }
    }
}

/// Why [`Simulator::run_until`] stopped advancing the clock (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    ContextsFinished,
    MaxCpuInstructions,
    MaxCpuCycles,
    MaxWallTime,
    Signal,
    Stall,
}

/// Owns every simulated core, the guest-context registry, and the shared
/// memory-module collaborator, and drives them cycle by cycle.
pub struct Simulator {
    cores: Vec<Core>,
    contexts: ContextTable,
    scheduler: ContextScheduler,
    memory: Box<dyn MemoryModule>,
    config: Config,
    stats: Stats,
    clock: u64,
    stop_requested: Arc<AtomicBool>,
}

impl Simulator {
    /// Builds a simulator for `config`, backed by `memory`. Validates
    /// `config` first (spec.md §7: configuration errors are fatal at
    /// startup).
    pub fn new(config: Config, memory: Box<dyn MemoryModule>) -> Result<Self, ConfigError> {
        config.validate()?;
        let cores = (0..config.general.cores)
            .map(|i| Core::new(CoreId(i), &config))
            .collect::<Result<Vec<_>, _>>()?;
        let slots = (0..config.general.cores)
            .flat_map(|c| {
                (0..config.general.threads).map(move |t| Slot {
                    core: CoreId(c),
                    thread: ThreadId(t),
                })
            })
            .collect();
        let mode = if config.general.context_switch {
            Mode::Dynamic {
                context_quantum: config.general.context_quantum,
            }
        } else {
            Mode::Static
        };
        let scheduler = ContextScheduler::new(slots, mode, config.general.context_switch);
        Ok(Self {
            cores,
            contexts: ContextTable::new(),
            scheduler,
            memory,
            config,
            stats: Stats::new(),
            clock: 0,
            stop_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A clone of the stop flag the caller can set (e.g. from a signal
    /// handler) to have `run_until` return `TerminationReason::Signal` at
    /// the next cycle boundary.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    /// Registers a new guest context, runnable starting at `entry_eip` once
    /// the scheduler binds it to a hardware thread.
    pub fn spawn_context(&mut self, entry_eip: u64, frontend: Box<dyn Frontend>) -> ContextId {
        self.contexts.insert(entry_eip, frontend)
    }

    /// Installs `sink` as `core`'s event trace sink (spec.md §6 "Trace
    /// file"), replacing whatever was installed before (a [`NoopEventSink`]
    /// by default). Does nothing if `core` is out of range.
    ///
    /// [`NoopEventSink`]: crate::events::NoopEventSink
    pub fn set_event_sink(&mut self, core: CoreId, sink: Box<dyn EventSink>) {
        if let Some(c) = self.cores.get_mut(core.0 as usize) {
            c.event_sink = sink;
        }
    }

    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    fn bind_runnable_contexts(&mut self) {
        for ctx in self.contexts.ids() {
            if self.scheduler.is_bound(ctx) {
                continue;
            }
            if self.contexts.status(ctx) == Some(ContextStatus::Finished) {
                continue;
            }
            if let Ok(slot) = self.scheduler.bind(ctx, self.clock) {
                let entry = self.contexts.entry_eip(ctx);
                self.cores[slot.core.0 as usize].threads[slot.thread.0 as usize].bind(ctx, entry);
            }
        }
    }

    /// Frees the slot of any thread whose bound context has fully drained,
    /// either because the context finished or because its eviction was
    /// signaled and it has since drained (spec.md §4.11).
    fn reap_finished_and_evicted(&mut self) {
        for core in &mut self.cores {
            for (t_idx, thread) in core.threads.iter_mut().enumerate() {
                let Some(ctx) = thread.ctx else {
                    continue;
                };
                let thread_id = ThreadId(t_idx as u32);
                if !thread.frontend_drained() || !core.rob.is_empty(thread_id) {
                    continue;
                }
                if self.contexts.status(ctx) == Some(ContextStatus::Finished) {
                    thread.finished = true;
                    self.scheduler.unbind(ctx);
                    thread.ctx = None;
                } else if self.scheduler.eviction_pending(ctx) {
                    self.scheduler.drain_evicted(ctx);
                    thread.ctx = None;
                }
            }
        }
    }

    /// Advances every core by one cycle (spec.md §2, §4.1).
    pub fn tick(&mut self) {
        self.bind_runnable_contexts();
        self.scheduler.maybe_signal_eviction(self.clock);
        for core in &mut self.cores {
            run_core_cycle(
                core,
                &mut self.contexts,
                &self.scheduler,
                self.memory.as_mut(),
                &self.config,
                &mut self.stats,
                self.clock,
            );
        }
        self.reap_finished_and_evicted();
        self.clock += 1;
        self.stats.cycles = self.clock;
    }

    /// Runs until one of `limits` is hit, every registered context
    /// finishes, or no core commits anything for `limits.stall_threshold`
    /// consecutive cycles, returning why.
    pub fn run_until(&mut self, limits: RunLimits) -> TerminationReason {
        let wall_start = Instant::now();
        let mut stall_run = 0u64;
        loop {
            if self.contexts.all_finished() {
                return TerminationReason::ContextsFinished;
            }
            if self.stop_requested.load(Ordering::Relaxed) {
                return TerminationReason::Signal;
            }
            if let Some(max) = limits.max_cycles {
                if self.clock >= max {
                    return TerminationReason::MaxCpuCycles;
                }
            }
            if let Some(max) = limits.max_instructions {
                if self.stats.total_committed() >= max {
                    return TerminationReason::MaxCpuInstructions;
                }
            }
            if let Some(max) = limits.max_wall_time {
                if wall_start.elapsed() >= max {
                    return TerminationReason::MaxWallTime;
                }
            }

            let before = self.stats.total_committed();
            self.tick();
            if self.stats.total_committed() == before {
                stall_run += 1;
                if stall_run >= limits.stall_threshold {
                    return TerminationReason::Stall;
                }
            } else {
                stall_run = 0;
            }
        }
    }
}
