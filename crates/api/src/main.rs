use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelift_api::config::ServerConfig;
use pixelift_api::dispatch::Dispatcher;
use pixelift_api::ratelimit::RateLimiter;
use pixelift_api::routes;
use pixelift_api::state::AppState;
use pixelift_broker::{BrokerChannel, InMemoryBroker};
use pixelift_cloud::{MemoryProvider, S3Config, S3Provider, StorageProvider};
use pixelift_core::lane::LaneLimits;
use pixelift_engine::{RemoteAccelerator, RemoteEngine, ResourceGuard, Transform};
use pixelift_store::{ReaperConfig, ResultStore, StoreReaper};
use pixelift_worker::{WorkerConfig, WorkerDeps, WorkerPool};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixelift=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Broker and result store ---
    let broker = Arc::new(InMemoryBroker::with_nack_delay(Duration::from_millis(
        config.nack_delay_ms,
    )));
    let store = Arc::new(ResultStore::new());

    // --- Inference engine ---
    let http_client = reqwest::Client::new();
    let engine: Arc<dyn Transform> = Arc::new(RemoteEngine::with_client(
        http_client,
        config.inference_url.clone(),
    ));
    let guard = Arc::new(ResourceGuard::new(Arc::new(RemoteAccelerator::new(
        config.inference_url.clone(),
    ))));
    tracing::info!(inference_url = %config.inference_url, "Inference engine configured");

    // --- Output storage ---
    let storage: Arc<dyn StorageProvider> = match &config.s3_bucket {
        Some(bucket) => {
            let provider = S3Provider::from_env(S3Config {
                bucket: bucket.clone(),
                public_base_url: config.s3_public_base_url.clone(),
            })
            .await
            .expect("Failed to initialize S3 storage");
            tracing::info!(bucket = %bucket, "S3 storage provider configured");
            Arc::new(provider)
        }
        None => {
            tracing::warn!("S3_BUCKET not set; storing outputs in memory (development only)");
            Arc::new(MemoryProvider::new())
        }
    };

    // --- Store reaper ---
    let reaper_cancel = tokio_util::sync::CancellationToken::new();
    let reaper = StoreReaper::new(Arc::clone(&store), ReaperConfig::default());
    let reaper_handle = tokio::spawn(reaper.run(reaper_cancel.clone()));

    // --- Worker pool ---
    let worker_config = WorkerConfig {
        max_retries: config.worker_max_retries,
        ..Default::default()
    };
    let pool = WorkerPool::start(
        worker_config,
        WorkerDeps {
            broker: Arc::clone(&broker) as Arc<dyn BrokerChannel>,
            store: Arc::clone(&store),
            engine,
            storage,
            guard,
        },
    );
    tracing::info!("Worker pool started");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- App state ---
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&broker) as Arc<dyn BrokerChannel>,
        Arc::clone(&store),
        LaneLimits::default(),
    ));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    ));
    let state = AppState {
        config: Arc::new(config.clone()),
        dispatcher,
        store: Arc::clone(&store),
        rate_limiter,
        started_at: Instant::now(),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes(state.clone()))
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Drain worker loops first; they may have in-flight jobs.
    pool.shutdown().await;
    tracing::info!("Worker pool shut down");

    reaper_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), reaper_handle).await;
    tracing::info!("Store reaper stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
