//! Result store: the mutable job-record map queried by the gateway.
//!
//! [`ResultStore`] owns every job record and linearizes status changes
//! through a compare-and-swap [`ResultStore::transition`]. The
//! [`reaper::StoreReaper`] background loop evicts expired records and
//! force-fails jobs stuck in `processing` past the hard timeout.

pub mod reaper;
mod store;

pub use reaper::{ReaperConfig, StoreReaper};
pub use store::{ActiveJob, ResultStore, StoreError, SweepStats, TransitionPayload};
