//! Mutual exclusion over the scarce accelerator context.
//!
//! One [`ResourceGuard`] exists per worker process. A loop must hold an
//! [`AcceleratorPermit`] for the duration of one transform call, and must
//! call [`ResourceGuard::reset`] after every job regardless of outcome —
//! accelerator memory is not reclaimed automatically between
//! heterogeneous invocations, so cached allocations are dropped
//! explicitly to bound peak memory over a long-running worker's lifetime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::transform::TransformError;

/// The accelerator context owned by one worker process.
///
/// Injected, never a hidden global: the worker pool acquires the model
/// context once at loop startup and threads it through the guard.
#[async_trait]
pub trait AcceleratorContext: Send + Sync {
    /// Drop cached allocations held by the accelerator.
    async fn clear_cache(&self) -> Result<(), TransformError>;
}

/// Exclusive handle on the accelerator while one transform runs.
///
/// Releasing is drop-based, so the slot is freed on every exit path,
/// including an erroring transform.
pub struct AcceleratorPermit<'a> {
    _slot: MutexGuard<'a, ()>,
}

/// Per-process mutual-exclusion wrapper around the accelerator context.
pub struct ResourceGuard {
    slot: Mutex<()>,
    ctx: Arc<dyn AcceleratorContext>,
}

impl ResourceGuard {
    pub fn new(ctx: Arc<dyn AcceleratorContext>) -> Self {
        Self {
            slot: Mutex::new(()),
            ctx,
        }
    }

    /// Acquire exclusive use of the accelerator, waiting if another
    /// in-process task holds it. Bounded by lane concurrency, so the
    /// wait is normally immediate.
    pub async fn acquire(&self) -> AcceleratorPermit<'_> {
        AcceleratorPermit {
            _slot: self.slot.lock().await,
        }
    }

    /// Instruct the accelerator to drop cached allocations.
    ///
    /// Invoked after every job. A failing cache clear is logged, not
    /// propagated — the next job must still run.
    pub async fn reset(&self) {
        if let Err(e) = self.ctx.clear_cache().await {
            tracing::warn!(error = %e, "Accelerator cache clear failed");
        }
    }
}

/// Accelerator context with no cache to clear (CPU engines, tests).
///
/// Counts `clear_cache` calls so tests can assert the reset contract.
#[derive(Default)]
pub struct NoopAccelerator {
    clears: AtomicUsize,
}

impl NoopAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `clear_cache` has been invoked.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AcceleratorContext for NoopAccelerator {
    async fn clear_cache(&self) -> Result<(), TransformError> {
        self.clears.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permit_serializes_access() {
        let guard = Arc::new(ResourceGuard::new(Arc::new(NoopAccelerator::new())));

        let permit = guard.acquire().await;

        // A second acquire must block while the permit is held.
        let contender = {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move {
                guard.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn reset_invokes_cache_clear() {
        let ctx = Arc::new(NoopAccelerator::new());
        let guard = ResourceGuard::new(Arc::clone(&ctx) as Arc<dyn AcceleratorContext>);

        guard.reset().await;
        guard.reset().await;
        assert_eq!(ctx.clear_count(), 2);
    }
}
