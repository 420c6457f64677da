//! Error types for configuration, simulation faults, and scheduling.
//!
//! Mirrors the severity split spec.md §7 calls for: configuration problems
//! are fatal at startup, pipeline invariant violations are implementation
//! bugs that fail fast with a diagnostic dump, and resource exhaustion is
//! not an error at all (it's a stall, accounted for in `DispatchStalls`).

use thiserror::Error;

/// Fatal configuration problems, detected before the simulator is built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A config key was present but not recognized.
    #[error("unknown configuration key `{section}.{key}`")]
    UnknownKey {
        /// Section the key was found in.
        section: String,
        /// The unrecognized key name.
        key: String,
    },

    /// A config value was outside its accepted bound.
    #[error("{section}.{key} = {value} is out of range (must be {bound})")]
    OutOfRange {
        /// Section the key belongs to.
        section: String,
        /// Key whose value is out of range.
        key: String,
        /// The offending value, stringified for display.
        value: String,
        /// Human-readable description of the accepted bound.
        bound: String,
    },

    /// Two or more fields combined to violate a cross-field constraint.
    #[error("dependent configuration constraint violated: {detail}")]
    DependentConstraint {
        /// Explanation of which fields conflicted and why.
        detail: String,
    },
}

/// A diagnostic snapshot of a structure found in an invalid state.
///
/// Produced only by checks that spec.md §7 says "must never be reachable on
/// a valid config" — carrying a `Debug` dump is the entire point, there is
/// nothing else useful to do with one of these but report it.
#[derive(Debug, Clone)]
pub struct ProbeDump(pub String);

impl ProbeDump {
    /// Captures a diagnostic dump of any `Debug` value.
    pub fn capture<T: std::fmt::Debug>(value: &T) -> Self {
        Self(format!("{value:#?}"))
    }
}

/// A pipeline invariant violation. These are bugs, not recoverable
/// conditions: spec.md §7 calls for "fail fast with a diagnostic dump."
#[derive(Debug, Error)]
#[error("pipeline invariant violated: {message}\n{dump}")]
pub struct SimFault {
    /// One-line description of which invariant failed.
    pub message: String,
    /// Captured state of the offending structure.
    pub dump: ProbeDump,
}

impl SimFault {
    /// Builds a fault from a message and a value to snapshot.
    pub fn new<T: std::fmt::Debug>(message: impl Into<String>, offender: &T) -> Self {
        Self {
            message: message.into(),
            dump: ProbeDump::capture(offender),
        }
    }
}

/// Context-scheduling failures (C15).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// No free `(core, thread)` slot existed for a runnable context and
    /// `general.context_switch` is `false`, so the condition is fatal
    /// rather than "wait for one to free up."
    #[error("no free hardware thread for a runnable context")]
    NoFreeHardwareThread,
}
