use std::sync::Arc;
use std::time::Instant;

use pixelift_store::ResultStore;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::ratelimit::RateLimiter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
    /// Submission pipeline: validate, record, enqueue.
    pub dispatcher: Arc<Dispatcher>,
    /// Job record store queried by the polling endpoints.
    pub store: Arc<ResultStore>,
    /// Per-client sliding-window counter for the submission endpoints.
    pub rate_limiter: Arc<RateLimiter>,
    /// Process start time, reported by the health endpoint.
    pub started_at: Instant,
}
