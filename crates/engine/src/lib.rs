//! Transform capability boundary and accelerator resource guard.
//!
//! The orchestration layer treats the pixel-level transform as an opaque
//! capability behind the [`Transform`] trait. [`remote::RemoteEngine`]
//! defers to an inference sidecar over HTTP; [`guard::ResourceGuard`]
//! serializes access to the scarce accelerator context and drops its
//! cached allocations between jobs.

pub mod guard;
pub mod remote;
pub mod transform;

pub use guard::{AcceleratorContext, AcceleratorPermit, NoopAccelerator, ResourceGuard};
pub use remote::{RemoteAccelerator, RemoteEngine};
pub use transform::{Transform, TransformError, TransformErrorKind, TransformOutput};
