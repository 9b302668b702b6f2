//! The ingestion pipeline.
//!
//! - [`cancel`] - shared shutdown signal
//! - [`cycle`] - one select → mark → fetch → normalize → store pass
//! - [`scheduler`] - the fixed-interval loop around it

mod cancel;
mod cycle;
mod scheduler;

pub use cancel::CancellationToken;
pub use cycle::{normalize_item, run_cycle, CycleError, CycleReport, NormalizedItem};
pub use scheduler::Scheduler;
