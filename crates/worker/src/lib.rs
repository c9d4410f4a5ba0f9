//! Per-lane worker pool.
//!
//! Each lane runs a fixed number of single-concurrency execution loops
//! (default one, since each loop owns exclusive use of one accelerator
//! context). A loop claims one job at a time from the broker, executes
//! the transform under the resource guard, uploads the output, and is
//! the sole writer of that job's status transitions.

pub mod config;
pub mod pool;
pub mod runner;

pub use config::WorkerConfig;
pub use pool::{WorkerDeps, WorkerPool};
pub use runner::LaneRunner;
