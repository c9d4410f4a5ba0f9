/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Hard cap on uploaded request bodies in bytes (default: 50 MB).
    pub max_upload_bytes: usize,
    /// Base URL of the inference sidecar.
    pub inference_url: String,
    /// S3 bucket for output uploads. When unset, outputs go to the
    /// in-memory provider (local development only).
    pub s3_bucket: Option<String>,
    /// Public base URL prepended to uploaded object paths.
    pub s3_public_base_url: String,
    /// Submissions allowed per client within one rate window.
    pub rate_limit_max_requests: u32,
    /// Rate window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Whether a trusted reverse proxy sits in front of the gateway.
    /// Only then is `x-forwarded-for` honored for rate-limit client keys.
    pub trust_forwarded_for: bool,
    /// Maximum redeliveries for a transiently failing job.
    pub worker_max_retries: u32,
    /// Delay before a nacked job is redelivered, in milliseconds.
    pub nack_delay_ms: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `MAX_UPLOAD_BYTES`        | `52428800` (50 MB)      |
    /// | `INFERENCE_URL`           | `http://127.0.0.1:8188` |
    /// | `S3_BUCKET`               | unset                   |
    /// | `S3_PUBLIC_BASE_URL`      | empty                   |
    /// | `RATE_LIMIT_MAX_REQUESTS` | `30`                    |
    /// | `RATE_LIMIT_WINDOW_SECS`  | `60`                    |
    /// | `TRUST_FORWARDED_FOR`     | `false`                 |
    /// | `WORKER_MAX_RETRIES`      | `3`                     |
    /// | `NACK_DELAY_MS`           | `1000`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "52428800".into())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let inference_url =
            std::env::var("INFERENCE_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".into());

        let s3_bucket = std::env::var("S3_BUCKET").ok().filter(|s| !s.is_empty());

        let s3_public_base_url = std::env::var("S3_PUBLIC_BASE_URL").unwrap_or_default();

        let rate_limit_max_requests: u32 = std::env::var("RATE_LIMIT_MAX_REQUESTS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("RATE_LIMIT_MAX_REQUESTS must be a valid u32");

        let rate_limit_window_secs: u64 = std::env::var("RATE_LIMIT_WINDOW_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("RATE_LIMIT_WINDOW_SECS must be a valid u64");

        let trust_forwarded_for: bool = std::env::var("TRUST_FORWARDED_FOR")
            .unwrap_or_else(|_| "false".into())
            .parse()
            .expect("TRUST_FORWARDED_FOR must be true or false");

        let worker_max_retries: u32 = std::env::var("WORKER_MAX_RETRIES")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("WORKER_MAX_RETRIES must be a valid u32");

        let nack_delay_ms: u64 = std::env::var("NACK_DELAY_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("NACK_DELAY_MS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            inference_url,
            s3_bucket,
            s3_public_base_url,
            rate_limit_max_requests,
            rate_limit_window_secs,
            trust_forwarded_for,
            worker_max_retries,
            nack_delay_ms,
        }
    }
}
