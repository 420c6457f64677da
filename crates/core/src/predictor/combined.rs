//! Combined (tournament) direction predictor: a bimodal and a two-level
//! predictor run in parallel, arbitrated by a bimodal-shaped choice table
//! (spec.md §3, §4.9), generalized from the teacher's
//! `core/units/bru/tournament.rs`.

use super::bimodal::Bimodal;
use super::two_level::{TwoLevel, TwoLevelConfig};

/// Sizing for the combined predictor: its two sub-predictors plus the choice
/// table that arbitrates between them.
#[derive(Clone, Copy, Debug)]
pub struct CombinedConfig {
    pub bimodal_size: usize,
    pub two_level: TwoLevelConfig,
    pub choice_size: usize,
}

/// Prediction inputs needed to later update the chosen-predictor's state and
/// the choice table, captured at `predict` time.
#[derive(Clone, Copy, Debug)]
pub struct CombinedMeta {
    pub bimodal_taken: bool,
    pub bimodal_index: u32,
    pub two_level_taken: bool,
    pub two_level_index: u32,
    pub history_snapshot: u64,
    pub choice_index: u32,
}

/// Tournament predictor selecting between a `Bimodal` and a `TwoLevel`
/// sub-predictor via a saturating-counter choice table.
pub struct Combined {
    bimodal: Bimodal,
    two_level: TwoLevel,
    choice: Bimodal,
}

impl Combined {
    /// Builds a combined predictor from `config`.
    #[must_use]
    pub fn new(config: CombinedConfig) -> Self {
        Self {
            bimodal: Bimodal::new(config.bimodal_size),
            two_level: TwoLevel::new(config.two_level),
            choice: Bimodal::new(config.choice_size),
        }
    }

    /// Predicts `eip`, selecting the two-level predictor's output when the
    /// choice counter is `>= 2` and the bimodal's otherwise. Returns the
    /// combined direction plus the bookkeeping `update_at` needs.
    #[must_use]
    pub fn predict(&self, eip: u64) -> (bool, CombinedMeta) {
        let (bimodal_taken, bimodal_index) = self.bimodal.predict(eip);
        let (two_level_taken, two_level_index, history_snapshot) = self.two_level.predict(eip);
        let (prefer_two_level, choice_index) = self.choice.predict(eip);
        let taken = if prefer_two_level {
            two_level_taken
        } else {
            bimodal_taken
        };
        (
            taken,
            CombinedMeta {
                bimodal_taken,
                bimodal_index,
                two_level_taken,
                two_level_index,
                history_snapshot,
                choice_index,
            },
        )
    }

    /// Updates both sub-predictors with the resolved direction, and the
    /// choice counter only when exactly one sub-predictor was correct (a tie
    /// — both right or both wrong — leaves the choice table untouched).
    pub fn update(&mut self, meta: CombinedMeta, taken: bool) {
        self.bimodal.update_at(meta.bimodal_index, taken);
        self.two_level.update_at(meta.two_level_index, taken);

        let bimodal_correct = meta.bimodal_taken == taken;
        let two_level_correct = meta.two_level_taken == taken;
        if bimodal_correct != two_level_correct {
            self.choice.update_at(meta.choice_index, two_level_correct);
        }
    }
}
