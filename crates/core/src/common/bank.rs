//! Private-vs-shared resource partitioning, as a single enum-dispatch type.
//!
//! spec.md §5 describes ROB/IQ/LSQ/RF as either *private* (one instance per
//! hardware thread, independently sized) or *shared* (one core-wide
//! instance threads contend over). spec.md §9 licenses treating this the
//! same way the branch-predictor variants are treated
//! (`core/units/bru/mod.rs`'s `BranchPredictorWrapper`): a fixed set of
//! variants chosen once at init, dispatched with a `match` rather than a
//! trait object, since the choice never changes after construction.

/// Either one `T` per thread, or a single `T` shared by every thread on a
/// core.
#[derive(Debug, Clone)]
pub enum Bank<T> {
    /// One independent instance per hardware thread.
    Private(Vec<T>),
    /// One instance shared by all hardware threads on the core.
    Shared(T),
}

impl<T> Bank<T> {
    /// Builds a private bank with `threads` instances, each built by `f`.
    pub fn private(threads: usize, mut f: impl FnMut(usize) -> T) -> Self {
        Self::Private((0..threads).map(&mut f).collect())
    }

    /// Builds a shared bank holding a single instance.
    pub fn shared(value: T) -> Self {
        Self::Shared(value)
    }

    /// Returns the instance backing `thread`'s view of this resource.
    pub fn get(&self, thread: usize) -> &T {
        match self {
            Self::Private(v) => &v[thread],
            Self::Shared(v) => v,
        }
    }

    /// Returns the instance backing `thread`'s view of this resource,
    /// mutably.
    pub fn get_mut(&mut self, thread: usize) -> &mut T {
        match self {
            Self::Private(v) => &mut v[thread],
            Self::Shared(v) => v,
        }
    }

    /// Iterates over every distinct backing instance (one per thread for
    /// `Private`, a single one for `Shared`).
    pub fn instances(&self) -> impl Iterator<Item = &T> {
        match self {
            Self::Private(v) => Either::Left(v.iter()),
            Self::Shared(v) => Either::Right(std::iter::once(v)),
        }
    }

    /// Iterates over every distinct backing instance, mutably (recovery's
    /// squash needs to purge each one exactly once, same as `instances`).
    pub fn instances_mut(&mut self) -> impl Iterator<Item = &mut T> {
        match self {
            Self::Private(v) => Either::Left(v.iter_mut()),
            Self::Shared(v) => Either::Right(std::iter::once(v)),
        }
    }
}

/// Small local alternative to pulling in the `either` crate for a single
/// internal iterator-merging use.
enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R, T> Iterator for Either<L, R>
where
    L: Iterator<Item = T>,
    R: Iterator<Item = T>,
{
    type Item = T;
    fn next(&mut self) -> Option<T> {
        match self {
            Self::Left(l) => l.next(),
            Self::Right(r) => r.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_bank_indexes_per_thread() {
        let bank = Bank::private(3, |t| t * 10);
        assert_eq!(*bank.get(0), 0);
        assert_eq!(*bank.get(2), 20);
    }

    #[test]
    fn shared_bank_ignores_thread_index() {
        let bank: Bank<u32> = Bank::shared(7);
        assert_eq!(*bank.get(0), 7);
        assert_eq!(*bank.get(5), 7);
    }

    #[test]
    fn instances_counts_correctly() {
        let private = Bank::private(4, |t| t);
        assert_eq!(private.instances().count(), 4);
        let shared: Bank<u32> = Bank::shared(1);
        assert_eq!(shared.instances().count(), 1);
    }
}
