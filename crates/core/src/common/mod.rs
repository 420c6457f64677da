//! Common utilities and types shared across the pipeline simulator.
//!
//! 1. **Identifiers:** stable slab-key newtypes (`Seq`, `UopId`, `RobTag`, ...).
//! 2. **Addresses:** a physical-address newtype for memory uops.
//! 3. **Memory access classification:** `AccessKind` for the `MemoryModule` boundary.
//! 4. **Error handling:** `ConfigError`, `SimFault`, `ScheduleError`.
//! 5. **Resource partitioning:** `Bank<T>`, the private-vs-shared axis for ROB/IQ/LSQ/RF.

/// Physical address newtype.
pub mod addr;

/// Private-vs-shared resource partitioning (`Bank<T>`).
pub mod bank;

/// Memory access classification.
pub mod data;

/// Error types: `ConfigError`, `SimFault`, `ScheduleError`.
pub mod error;

/// Stable identifier newtypes (`Seq`, `DiSeq`, `UopId`, `RobTag`, ...).
pub mod ids;

pub use addr::PhysAddr;
pub use bank::Bank;
pub use data::AccessKind;
pub use error::{ConfigError, ScheduleError, SimFault};
pub use ids::{ContextId, CoreId, DiSeq, PhysReg, RobTag, Seq, ThreadId, UopId};
