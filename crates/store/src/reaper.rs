//! Background reaper for the result store.
//!
//! A single long-lived Tokio task that periodically sweeps the store:
//! evicting records past the retention window and force-failing jobs
//! stuck in `processing` past the hard timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::store::ResultStore;

/// Retention and timeout policy for the reaper.
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// How long any record is kept before eviction (default 24h).
    pub retention: Duration,
    /// Hard ceiling on time spent in `processing` (default 120s,
    /// matching the client-facing timeout expectation).
    pub processing_timeout: Duration,
    /// How often to sweep.
    pub sweep_interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(24 * 60 * 60),
            processing_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// Background sweep loop over a shared [`ResultStore`].
pub struct StoreReaper {
    store: Arc<ResultStore>,
    config: ReaperConfig,
}

impl StoreReaper {
    pub fn new(store: Arc<ResultStore>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        tracing::info!(
            retention_secs = self.config.retention.as_secs(),
            processing_timeout_secs = self.config.processing_timeout.as_secs(),
            "Store reaper started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Store reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let stats = self
                        .store
                        .sweep(self.config.retention, self.config.processing_timeout)
                        .await;
                    if stats.evicted > 0 || stats.timed_out > 0 {
                        tracing::info!(
                            evicted = stats.evicted,
                            timed_out = stats.timed_out,
                            "Reaper sweep finished",
                        );
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
