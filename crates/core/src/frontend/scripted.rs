//! `ScriptedFrontend`: a test double replaying a fixed sequence of
//! already-decomposed uops, standing in for functional ISA emulation in
//! unit and scenario tests (spec.md §8 scenarios S1-S4 each need a frontend
//! that produces a known uop sequence without a real decoder).

use std::collections::VecDeque;

use super::{ContextStatus, ExecResult, Frontend};
use crate::uop::Uop;

/// One scripted step: the uops a single macro-instruction decomposes into,
/// its size in bytes, and (for control-flow instructions) the actually
/// resolved outcome, consulted by a `Perfect` branch predictor.
#[derive(Clone, Debug)]
pub struct ScriptedStep {
    pub uops: Vec<Uop>,
    pub mop_size: u64,
}

/// Replays a fixed script of [`ScriptedStep`]s in order, reporting
/// `Finished` once exhausted.
pub struct ScriptedFrontend {
    steps: VecDeque<ScriptedStep>,
    status: ContextStatus,
    current_eip: u64,
}

impl ScriptedFrontend {
    /// Builds a frontend that will replay `steps` in order, then report
    /// `ContextStatus::Finished`.
    #[must_use]
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        let status = if steps.is_empty() {
            ContextStatus::Finished
        } else {
            ContextStatus::Running
        };
        Self {
            steps: steps.into(),
            status,
            current_eip: 0,
        }
    }
}

impl Frontend for ScriptedFrontend {
    fn execute_inst(&mut self, eip: u64) -> Option<ExecResult> {
        if self.status != ContextStatus::Running {
            return None;
        }
        let step = self.steps.pop_front()?;
        self.current_eip = eip;
        if self.steps.is_empty() {
            self.status = ContextStatus::Finished;
        }
        Some(ExecResult {
            uops: step.uops,
            mop_size: step.mop_size,
        })
    }

    fn status(&self) -> ContextStatus {
        self.status
    }

    fn eip(&self) -> u64 {
        self.current_eip
    }

    fn recover(&mut self, resume_eip: u64) {
        self.current_eip = resume_eip;
        if self.status == ContextStatus::Specmode {
            self.status = ContextStatus::Running;
        }
    }
}
