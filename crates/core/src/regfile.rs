//! C2 — physical register file and register alias table (RAT).
//!
//! New construction: the teacher's own `common/reg.rs` stores architected
//! values directly since its in-order pipeline forwards results through a
//! fixed bypass network (`core/pipeline/hazards.rs`) rather than renaming.
//! This crate instead needs the full spec.md §3 renaming model — per-entry
//! `{busy, pending}` bookkeeping, a RAT per logical register, and a free
//! list — styled after the teacher's preference for small `Copy` entry
//! structs stored in a flat `Vec` (as in `core/pipeline/rob.rs`'s `RobEntry`).

use crate::common::{ConfigError, PhysReg};
use crate::uop::{logical, LogicalReg, RegClass};

/// State of a single physical register.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhysRegEntry {
    /// Number of logical registers (across all in-flight uops plus the
    /// current RAT) that currently map to this physical register.
    pub busy: u32,
    /// `true` while the uop that will produce this register's value has not
    /// yet completed.
    pub pending: bool,
}

/// One class's (int or FP) register file: storage, RAT, and free list.
#[derive(Debug)]
pub struct RegFile {
    class: RegClass,
    regs: Vec<PhysRegEntry>,
    /// `rat[logical.0] = physical register currently backing it`.
    rat: Vec<PhysReg>,
    free: Vec<PhysReg>,
    /// 3-bit FP top-of-stack pointer, rotated on FP push/pop. Unused for
    /// the integer file.
    fp_top: u8,
}

impl RegFile {
    /// Builds a register file of `count` physical registers, with the first
    /// `logical_count` permanently mapped 1:1 at startup (the initial
    /// architected state) and the remainder on the free list.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DependentConstraint` if `count < logical_count`,
    /// since every logical register needs at least one physical backing
    /// register at boot (spec.md §3's minimum-sizing rule).
    pub fn new(class: RegClass, count: usize, logical_count: usize) -> Result<Self, ConfigError> {
        if count < logical_count {
            return Err(ConfigError::DependentConstraint {
                detail: format!(
                    "{class:?} register file size {count} is smaller than the {logical_count} \
                     logical registers it must back"
                ),
            });
        }

        let mut regs = vec![PhysRegEntry::default(); count];
        let mut rat = Vec::with_capacity(logical_count);
        for (i, entry) in regs.iter_mut().take(logical_count).enumerate() {
            entry.busy = 1;
            rat.push(PhysReg(i as u32));
        }
        let free = (logical_count..count).map(|i| PhysReg(i as u32)).collect();

        Ok(Self {
            class,
            regs,
            rat,
            free,
            fp_top: 0,
        })
    }

    /// Register class this file backs.
    #[must_use]
    pub fn class(&self) -> RegClass {
        self.class
    }

    /// Total physical register count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.regs.len()
    }

    /// Number of physical registers currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Current RAT mapping for `logical`.
    #[must_use]
    pub fn lookup(&self, logical: LogicalReg) -> PhysReg {
        self.rat[logical.0 as usize]
    }

    /// `true` while `phys`'s producer has not yet completed.
    #[must_use]
    pub fn is_pending(&self, phys: PhysReg) -> bool {
        self.regs[phys.0 as usize].pending
    }

    /// Allocates a fresh physical register for `logical`, returning the
    /// register's *previous* mapping (for rollback bookkeeping in
    /// `RenameInfo::prev_phys_outputs`) alongside the newly allocated one.
    /// Returns `None` if the free list is exhausted (a dispatch stall, not
    /// an error — spec.md §7).
    pub fn rename(&mut self, logical: LogicalReg) -> Option<(PhysReg, PhysReg)> {
        let new_phys = self.free.pop()?;
        let old_phys = self.rat[logical.0 as usize];
        self.regs[old_phys.0 as usize].busy -= 1;
        self.regs[new_phys.0 as usize].busy += 1;
        self.regs[new_phys.0 as usize].pending = true;
        self.rat[logical.0 as usize] = new_phys;
        Some((new_phys, old_phys))
    }

    /// Marks `phys` as no longer pending (its producer completed).
    pub fn mark_ready(&mut self, phys: PhysReg) {
        self.regs[phys.0 as usize].pending = false;
    }

    /// Undoes a previous rename during recovery (C14): restores `logical`'s
    /// RAT entry to `restored_phys`, decrements `busy` on the register being
    /// unmapped, and frees it if it drops to zero.
    pub fn undo_rename(&mut self, logical: LogicalReg, unmap: PhysReg, restored_phys: PhysReg) {
        self.regs[unmap.0 as usize].busy = self.regs[unmap.0 as usize].busy.saturating_sub(1);
        if self.regs[unmap.0 as usize].busy == 0 {
            self.free.push(unmap);
        }
        self.regs[restored_phys.0 as usize].busy += 1;
        self.rat[logical.0 as usize] = restored_phys;
    }

    /// Releases a physical register's hold from a retiring uop's *previous*
    /// mapping (commit, C13): decrements `busy`, and frees the register if
    /// it drops to zero and it is no longer the current RAT entry for any
    /// logical register.
    pub fn retire_prev_mapping(&mut self, prev_phys: PhysReg) {
        self.regs[prev_phys.0 as usize].busy = self.regs[prev_phys.0 as usize].busy.saturating_sub(1);
        if self.regs[prev_phys.0 as usize].busy == 0 {
            self.free.push(prev_phys);
        }
    }

    /// Current FP top-of-stack pointer (0-7), only meaningful for the FP file.
    #[must_use]
    pub fn fp_top(&self) -> u8 {
        self.fp_top
    }

    /// Rotates the FP top-of-stack pointer by `delta` (mod 8), on FP push/pop.
    pub fn rotate_fp_top(&mut self, delta: i8) {
        self.fp_top = ((self.fp_top as i16 + delta as i16).rem_euclid(8)) as u8;
    }
}

/// The full per-thread (or per-core, if shared — see `common::Bank`)
/// renaming state: one `RegFile` per register class.
#[derive(Debug)]
pub struct PhysRegFile {
    /// Integer register file.
    pub int: RegFile,
    /// Floating-point register file.
    pub fp: RegFile,
}

impl PhysRegFile {
    /// Builds a new physical register file pair.
    ///
    /// # Errors
    ///
    /// Propagates `RegFile::new`'s sizing error for either class.
    pub fn new(int_size: usize, fp_size: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            int: RegFile::new(RegClass::Int, int_size, logical::GPR_COUNT as usize)?,
            fp: RegFile::new(RegClass::Fp, fp_size, logical::FP_COUNT as usize)?,
        })
    }

    /// Returns the register file backing `class`.
    #[must_use]
    pub fn file(&self, class: RegClass) -> &RegFile {
        match class {
            RegClass::Int => &self.int,
            RegClass::Fp => &self.fp,
        }
    }

    /// Returns the register file backing `class`, mutably.
    pub fn file_mut(&mut self, class: RegClass) -> &mut RegFile {
        match class {
            RegClass::Int => &mut self.int,
            RegClass::Fp => &mut self.fp,
        }
    }
}

/// Determines which register class a logical register belongs to.
#[must_use]
pub fn class_of(logical: LogicalReg) -> RegClass {
    if logical.0 >= logical::FP_BASE && logical.0 < logical::XMM_BASE + logical::XMM_COUNT {
        RegClass::Fp
    } else {
        RegClass::Int
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boot_state_maps_logical_registers_one_to_one() {
        let rf = RegFile::new(RegClass::Int, 32, 16).unwrap();
        assert_eq!(rf.free_count(), 16);
        assert_eq!(rf.lookup(logical::gpr(0)), PhysReg(0));
        assert_eq!(rf.lookup(logical::gpr(15)), PhysReg(15));
    }

    #[test]
    fn rename_allocates_fresh_register_and_returns_old_mapping() {
        let mut rf = RegFile::new(RegClass::Int, 20, 16).unwrap();
        let (new_p, old_p) = rf.rename(logical::gpr(0)).unwrap();
        assert_eq!(old_p, PhysReg(0));
        assert_ne!(new_p, old_p);
        assert!(rf.is_pending(new_p));
        assert_eq!(rf.lookup(logical::gpr(0)), new_p);
    }

    #[test]
    fn rename_exhausts_free_list_and_returns_none() {
        let mut rf = RegFile::new(RegClass::Int, 17, 16).unwrap();
        assert!(rf.rename(logical::gpr(0)).is_some());
        assert!(rf.rename(logical::gpr(1)).is_none());
    }

    #[test]
    fn undo_rename_restores_prior_mapping_and_frees_the_new_register() {
        let mut rf = RegFile::new(RegClass::Int, 20, 16).unwrap();
        let (new_p, old_p) = rf.rename(logical::gpr(0)).unwrap();
        let free_before = rf.free_count();

        rf.undo_rename(logical::gpr(0), new_p, old_p);

        assert_eq!(rf.lookup(logical::gpr(0)), old_p);
        assert_eq!(rf.free_count(), free_before + 1);
    }

    #[test]
    fn retire_prev_mapping_frees_register_once_unreferenced() {
        let mut rf = RegFile::new(RegClass::Int, 20, 16).unwrap();
        let (_new_p, old_p) = rf.rename(logical::gpr(0)).unwrap();
        let free_before = rf.free_count();
        rf.retire_prev_mapping(old_p);
        assert_eq!(rf.free_count(), free_before + 1);
    }

    #[test]
    fn undersized_file_is_rejected() {
        assert!(RegFile::new(RegClass::Int, 8, 16).is_err());
    }

    #[test]
    fn fp_top_rotates_modulo_eight() {
        let mut rf = RegFile::new(RegClass::Fp, 16, 8).unwrap();
        rf.rotate_fp_top(-1);
        assert_eq!(rf.fp_top(), 7);
        rf.rotate_fp_top(2);
        assert_eq!(rf.fp_top(), 1);
    }

    proptest! {
        /// Any sequence of renames against a single logical register,
        /// undone in the reverse order they were applied, must restore the
        /// RAT and free list to exactly their pre-sequence state — recovery
        /// (C14) leans on this holding regardless of how many speculative
        /// renames piled up before a squash.
        #[test]
        fn renames_undone_in_reverse_restore_original_state(depth in 1usize..6) {
            let mut rf = RegFile::new(RegClass::Int, 32, 16).unwrap();
            let logical = logical::gpr(3);
            let free_before = rf.free_count();
            let original = rf.lookup(logical);

            let mut undo_stack = Vec::with_capacity(depth);
            for _ in 0..depth {
                let (new_p, old_p) = rf.rename(logical).unwrap();
                undo_stack.push((new_p, old_p));
            }
            for (new_p, old_p) in undo_stack.into_iter().rev() {
                rf.undo_rename(logical, new_p, old_p);
            }

            prop_assert_eq!(rf.lookup(logical), original);
            prop_assert_eq!(rf.free_count(), free_before);
        }
    }
}
