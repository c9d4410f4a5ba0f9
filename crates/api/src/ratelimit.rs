//! Per-client sliding-window rate counter for the submission endpoints.
//!
//! Applied only to the upload routes; polling is unmetered so clients can
//! check status as often as they like.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::state::AppState;

/// Sliding-window counter keyed by client address.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `key`; returns `false` when the window is full.
    pub async fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;

        // Sweep fully-expired clients so the map stays bounded by the
        // number of clients active within one window, not by every
        // distinct key ever seen.
        hits.retain(|_, stamps| {
            stamps.retain(|t| now.duration_since(*t) < self.window);
            !stamps.is_empty()
        });

        let entry = hits.entry(key.to_string()).or_default();
        if entry.len() as u32 >= self.max_requests {
            return false;
        }
        entry.push(now);
        true
    }

    /// Number of client keys currently tracked.
    pub async fn tracked_clients(&self) -> usize {
        self.hits.lock().await.len()
    }
}

/// Middleware enforcing the submission rate limit.
pub async fn enforce(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(
        state.config.trust_forwarded_for,
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    if !state.rate_limiter.try_acquire(&key).await {
        tracing::warn!(client = %key, "Submission rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}

/// Identify the client. `x-forwarded-for` is client-controlled, so it is
/// honored only when the deployment has declared a trusted proxy in front
/// of the gateway; otherwise the peer address is used.
fn client_key(
    trust_forwarded: bool,
    headers: &HeaderMap,
    conn: Option<&ConnectInfo<SocketAddr>>,
) -> String {
    if trust_forwarded {
        if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    match conn {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
