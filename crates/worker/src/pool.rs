//! Pool supervisor: spawns the configured loops and owns their shutdown.

use std::sync::Arc;

use futures::future::join_all;
use pixelift_broker::BrokerChannel;
use pixelift_cloud::StorageProvider;
use pixelift_core::lane::Lane;
use pixelift_engine::{ResourceGuard, Transform};
use pixelift_store::ResultStore;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::runner::LaneRunner;

/// Collaborators shared by every worker loop.
#[derive(Clone)]
pub struct WorkerDeps {
    pub broker: Arc<dyn BrokerChannel>,
    pub store: Arc<ResultStore>,
    pub engine: Arc<dyn Transform>,
    pub storage: Arc<dyn StorageProvider>,
    pub guard: Arc<ResourceGuard>,
}

/// Running worker pool.
///
/// Concurrency is bounded structurally by loop count: each loop fully
/// owns one job from claim to settle, so no extra lock manager is
/// layered on top.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.concurrency(lane)` loops per lane.
    pub fn start(config: WorkerConfig, deps: WorkerDeps) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        for lane in Lane::all() {
            for slot in 0..config.concurrency(lane) {
                let runner = LaneRunner::new(
                    lane,
                    Arc::clone(&deps.broker),
                    Arc::clone(&deps.store),
                    Arc::clone(&deps.engine),
                    Arc::clone(&deps.storage),
                    Arc::clone(&deps.guard),
                    config,
                );
                tracing::info!(lane = %lane, slot, "Spawning worker loop");
                handles.push(tokio::spawn(runner.run(cancel.child_token())));
            }
        }

        Self { cancel, handles }
    }

    /// Stop all loops and wait for them to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        join_all(self.handles).await;
        tracing::info!("Worker pool shut down");
    }
}
