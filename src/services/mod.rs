//! Service layer for jobscout business logic.
//!
//! Services sit between the repositories and the CLI. They own the
//! orchestration rules (fan-out, rate limiting, summarizing) so other
//! front ends can reuse them.

pub mod dispatch;
pub mod summary;

pub use dispatch::{
    DispatchError, DispatchOutcome, DispatchService, SkipReason, SkippedSource, StoreError,
};
pub use summary::{JobSummary, SummaryService, DEFAULT_RECENT_LIMIT};
