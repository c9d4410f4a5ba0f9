//! Domain layer for the pixelift job orchestration service.
//!
//! This crate has zero internal dependencies and holds the types shared by
//! the gateway, broker, result store, and worker crates: job identity,
//! lanes, the closed options schema, the job envelope, the status state
//! machine, and the failure-reason taxonomy.

pub mod envelope;
pub mod error;
pub mod failure;
pub mod fingerprint;
pub mod lane;
pub mod options;
pub mod record;
pub mod types;
