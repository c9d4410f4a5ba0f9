use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use pixelift_api::config::ServerConfig;
use pixelift_api::dispatch::Dispatcher;
use pixelift_api::ratelimit::RateLimiter;
use pixelift_api::routes;
use pixelift_api::state::AppState;
use pixelift_broker::{BrokerChannel, InMemoryBroker};
use pixelift_core::lane::LaneLimits;
use pixelift_store::ResultStore;

/// Build a test `ServerConfig` with safe defaults.
///
/// The rate window is generous so unrelated tests never trip it; tests
/// that exercise the limiter pass their own config.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 50 * 1024 * 1024,
        inference_url: "http://127.0.0.1:8188".to_string(),
        s3_bucket: None,
        s3_public_base_url: String::new(),
        rate_limit_max_requests: 1000,
        rate_limit_window_secs: 60,
        trust_forwarded_for: false,
        worker_max_retries: 3,
        nack_delay_ms: 0,
    }
}

/// The gateway under test plus handles on its collaborators.
///
/// No worker pool is attached, so submitted jobs stay `queued` until a
/// test drives the store directly.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<ResultStore>,
    pub broker: Arc<InMemoryBroker>,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config(), LaneLimits::default())
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses.
pub fn build_test_app_with(config: ServerConfig, limits: LaneLimits) -> TestApp {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(ResultStore::new());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&broker) as Arc<dyn BrokerChannel>,
        Arc::clone(&store),
        limits,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    ));

    let request_timeout_secs = config.request_timeout_secs;
    let state = AppState {
        config: Arc::new(config),
        dispatcher,
        store: Arc::clone(&store),
        rate_limiter,
        started_at: Instant::now(),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        store,
        broker,
    }
}

/// Encode a minimal valid PNG of the given dimensions.
pub fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut buf = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut buf),
        image::ImageFormat::Png,
    )
    .unwrap();
    buf
}

const BOUNDARY: &str = "pixelift-test-boundary";

/// Hand-roll a single-field `multipart/form-data` body.
pub fn multipart_body(field_name: &str, filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// Send a GET request through the full middleware stack.
pub async fn get(router: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    router.oneshot(request).await.unwrap()
}

/// POST a multipart upload with the given bytes in the `file` field.
pub async fn post_upload(router: Router, uri: &str, bytes: &[u8]) -> Response<Body> {
    post_field(router, uri, "file", bytes).await
}

/// POST a multipart upload carrying an `x-forwarded-for` header.
pub async fn post_upload_forwarded(
    router: Router,
    uri: &str,
    bytes: &[u8],
    forwarded_for: &str,
) -> Response<Body> {
    let (content_type, body) = multipart_body("file", "input.png", bytes);
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, content_type)
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(body))
        .unwrap();
    router.oneshot(request).await.unwrap()
}

/// POST a multipart upload under an arbitrary field name.
pub async fn post_field(
    router: Router,
    uri: &str,
    field_name: &str,
    bytes: &[u8],
) -> Response<Body> {
    let (content_type, body) = multipart_body(field_name, "input.png", bytes);
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    router.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
