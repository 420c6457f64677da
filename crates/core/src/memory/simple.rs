//! `SimpleMemoryModule`: a fixed-latency stand-in for the out-of-scope
//! sub-L1 memory hierarchy, used where a test or config only needs "memory
//! accesses complete after N cycles" rather than real cache timing.

use super::{AccessHandle, MemoryModule};
use crate::common::{AccessKind, PhysAddr};

/// Every access completes exactly `latency` cycles after it is issued,
/// regardless of address or kind.
pub struct SimpleMemoryModule {
    latency: u64,
    next_id: u64,
    done_at: std::collections::HashMap<u64, u64>,
}

impl SimpleMemoryModule {
    /// Builds a memory module with a fixed per-access `latency`.
    #[must_use]
    pub fn new(latency: u64) -> Self {
        Self {
            latency,
            next_id: 0,
            done_at: std::collections::HashMap::new(),
        }
    }
}

impl MemoryModule for SimpleMemoryModule {
    fn access(&mut self, _addr: PhysAddr, _kind: AccessKind, now: u64) -> AccessHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.done_at.insert(id, now + self.latency);
        AccessHandle(id)
    }

    fn is_complete(&self, handle: AccessHandle, now: u64) -> bool {
        self.done_at.get(&handle.0).is_some_and(|&done| now >= done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_completes_after_fixed_latency() {
        let mut m = SimpleMemoryModule::new(10);
        let h = m.access(PhysAddr::new(0x1000), AccessKind::Load, 5);
        assert!(!m.is_complete(h, 14));
        assert!(m.is_complete(h, 15));
        assert!(m.is_complete(h, 20));
    }

    #[test]
    fn distinct_accesses_get_distinct_handles() {
        let mut m = SimpleMemoryModule::new(1);
        let a = m.access(PhysAddr::new(0x1000), AccessKind::Load, 0);
        let b = m.access(PhysAddr::new(0x2000), AccessKind::Store, 0);
        assert_ne!(a, b);
    }
}
