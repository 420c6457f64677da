//! The six pipeline stages (spec.md §4.2-§4.7), driven in reverse stage
//! order each cycle by [`super::run_core_cycle`] so a uop never traverses
//! two stages within the same cycle (spec.md §4.1).

pub mod commit;
pub mod decode;
pub mod dispatch;
pub mod fetch;
pub mod issue;
pub mod recovery;
pub mod writeback;
