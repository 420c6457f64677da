//! Optional per-cycle event trace, gated by the `trace-events` feature
//! (spec.md §6 "Trace file"): `(cycle, uop_id, action)` triples a sink can
//! write out for offline analysis. `Core` holds a `Box<dyn EventSink>`
//! defaulting to [`NoopEventSink`], so every call site pays one vtable
//! dispatch to a function that immediately returns when tracing is off,
//! and [`JsonlEventSink`] itself only exists in the binary when the feature
//! is enabled.

use serde::Serialize;

use crate::common::UopId;

/// The pipeline stage (or squash) a uop passed through, matching spec.md
/// §6's `action ∈ {fetch, decode, dispatch, issue, execute, memory,
/// writeback, commit, squash}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Fetch,
    Decode,
    Dispatch,
    Issue,
    Execute,
    Memory,
    Writeback,
    Commit,
    Squash,
}

/// One recorded event.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Event {
    pub cycle: u64,
    pub uop_id: UopId,
    pub action: EventAction,
}

/// Receives pipeline events as they happen. Implementations must be cheap:
/// this is called from every stage, every cycle, for every uop that passes
/// through it.
pub trait EventSink: std::fmt::Debug {
    fn record(&mut self, event: Event);
}

/// The default sink: discards everything. `Core::emit` costs one dynamic
/// dispatch into this when tracing is disabled.
#[derive(Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&mut self, _event: Event) {}
}

#[cfg(feature = "trace-events")]
mod jsonl {
    use std::fs::File;
    use std::io::{self, BufWriter, Write};
    use std::path::Path;

    use super::{Event, EventSink};

    /// Writes one JSON object per line, one per event (spec.md §6).
    #[derive(Debug)]
    pub struct JsonlEventSink {
        writer: BufWriter<File>,
    }

    impl JsonlEventSink {
        /// Opens (creating or truncating) `path` for event output.
        pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
            Ok(Self {
                writer: BufWriter::new(File::create(path)?),
            })
        }
    }

    impl EventSink for JsonlEventSink {
        fn record(&mut self, event: Event) {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = writeln!(self.writer, "{line}");
            }
        }
    }
}

#[cfg(feature = "trace-events")]
pub use jsonl::JsonlEventSink;
