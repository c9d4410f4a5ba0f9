//! Object storage boundary for transformed outputs.
//!
//! A completed job's `output_url` points at whatever a
//! [`StorageProvider`] returned from `upload`. The S3 provider is the
//! production implementation; [`MemoryProvider`] backs tests and local
//! development without credentials.

pub mod memory;
pub mod provider;
pub mod s3;

pub use memory::MemoryProvider;
pub use provider::{StorageError, StorageProvider};
pub use s3::{S3Config, S3Provider};
