//! Two-level (GAg) direction predictor: a global-history shift register
//! indexing a shared pattern-history table, generalized from the teacher's
//! `core/units/bru/gshare.rs` (same XOR-of-history-and-`eip` index, same
//! 2-bit saturating counters as `u8`) but parametrized by `TwoLevelConfig`
//! instead of a compile-time `TABLE_BITS` const (spec.md §3, §4.9).

/// Sizing for the two-level predictor: history register length and PHT
/// size, both supplied by `config::BranchPredictorConfig`.
#[derive(Clone, Copy, Debug)]
pub struct TwoLevelConfig {
    /// Length in bits of the global-history shift register.
    pub history_bits: u32,
    /// Number of entries in the pattern-history table (power of two).
    pub table_size: usize,
}

/// Global-history two-level (GAg) predictor.
pub struct TwoLevel {
    history: u64,
    history_mask: u64,
    pht: Vec<u8>,
}

impl TwoLevel {
    /// Builds a two-level predictor from `config`.
    #[must_use]
    pub fn new(config: TwoLevelConfig) -> Self {
        let table_size = config.table_size.max(1).next_power_of_two();
        Self {
            history: 0,
            history_mask: (1u64 << config.history_bits.clamp(1, 63)) - 1,
            pht: vec![1; table_size],
        }
    }

    fn index(&self, eip: u64) -> usize {
        let pc_part = (eip >> 2) & (self.pht.len() as u64 - 1);
        let hist_part = self.history & self.history_mask & (self.pht.len() as u64 - 1);
        (pc_part ^ hist_part) as usize
    }

    /// Predicts taken iff the indexed counter is `>= 2`; returns `(taken,
    /// index, history_snapshot)` for `PredictorMeta`.
    #[must_use]
    pub fn predict(&self, eip: u64) -> (bool, u32, u64) {
        let idx = self.index(eip);
        (self.pht[idx] >= 2, idx as u32, self.history)
    }

    /// Applies the saturating counter update at `index` and shifts `taken`
    /// into the global-history register.
    pub fn update_at(&mut self, index: u32, taken: bool) {
        let c = &mut self.pht[index as usize];
        if taken {
            *c = c.saturating_add(1).min(3);
        } else {
            *c = c.saturating_sub(1);
        }
        self.history = ((self.history << 1) | u64::from(taken)) & self.history_mask;
    }
}
