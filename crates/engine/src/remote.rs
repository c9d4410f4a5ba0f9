//! HTTP client for a remote inference sidecar.
//!
//! The GPU models live in a separate process exposing a small HTTP API:
//!
//! - `POST /v1/transform/{lane}` — raw image bytes in, transformed bytes
//!   out, with output metadata in `x-pixelift-*` response headers.
//! - `POST /v1/clear-cache` — drop the accelerator's cached allocations.
//!
//! Domain failures come back as `422` with a `{ "kind", "message" }`
//! JSON body; overload and restart windows map to retryable kinds.

use async_trait::async_trait;
use pixelift_core::envelope::InputRef;
use pixelift_core::lane::Lane;
use pixelift_core::options::JobOptions;
use serde::Deserialize;

use crate::guard::AcceleratorContext;
use crate::transform::{Transform, TransformError, TransformErrorKind, TransformOutput};

const HEADER_WIDTH: &str = "x-pixelift-width";
const HEADER_HEIGHT: &str = "x-pixelift-height";
const HEADER_SCALE: &str = "x-pixelift-scale-factor";
const HEADER_FACES: &str = "x-pixelift-face-count";

/// Engine-reported error body for classified failures.
#[derive(Debug, Deserialize)]
struct EngineErrorBody {
    kind: String,
    message: String,
}

/// Transform capability backed by a remote inference sidecar.
pub struct RemoteEngine {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteEngine {
    /// * `base_url` - sidecar base URL, e.g. `http://localhost:8188`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn header_parsed<T: std::str::FromStr>(
        response: &reqwest::Response,
        name: &str,
    ) -> Result<T, TransformError> {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                TransformError::new(
                    TransformErrorKind::Internal,
                    format!("Engine response missing or malformed header {name}"),
                )
            })
    }

    /// Map a non-success response to a classified error.
    async fn classify_failure(response: reqwest::Response) -> TransformError {
        let status = response.status();

        if status.as_u16() == 422 {
            // Classified domain error with a structured body.
            return match response.json::<EngineErrorBody>().await {
                Ok(body) => {
                    TransformError::new(TransformErrorKind::from_wire(&body.kind), body.message)
                }
                Err(e) => TransformError::new(
                    TransformErrorKind::Internal,
                    format!("Engine returned 422 with unreadable body: {e}"),
                ),
            };
        }

        let kind = match status.as_u16() {
            429 => TransformErrorKind::ResourceExhausted,
            502 | 503 | 504 => TransformErrorKind::Unavailable,
            _ => TransformErrorKind::Internal,
        };
        TransformError::new(kind, format!("Engine returned {status}"))
    }
}

#[async_trait]
impl Transform for RemoteEngine {
    async fn transform(
        &self,
        lane: Lane,
        input: &InputRef,
        options: &JobOptions,
    ) -> Result<TransformOutput, TransformError> {
        let url = format!("{}/v1/transform/{}", self.base_url, lane.queue_name());

        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/octet-stream")
            .query(&[
                ("output_format", options.output_format.as_str()),
                ("quality", options.quality.as_str()),
            ])
            .body(input.bytes.clone());
        if lane == Lane::Face {
            request = request.query(&[("only_center_face", options.only_center_face)]);
        }

        let response = request.send().await.map_err(|e| {
            TransformError::new(
                TransformErrorKind::Unavailable,
                format!("Engine request failed: {e}"),
            )
        })?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }

        let width = Self::header_parsed::<u32>(&response, HEADER_WIDTH)?;
        let height = Self::header_parsed::<u32>(&response, HEADER_HEIGHT)?;
        let scale_factor = Self::header_parsed::<f64>(&response, HEADER_SCALE)?;
        let face_count = match lane {
            Lane::Face => Some(Self::header_parsed::<u32>(&response, HEADER_FACES)?),
            Lane::Upscale => None,
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|e| {
                TransformError::new(
                    TransformErrorKind::Unavailable,
                    format!("Engine response body read failed: {e}"),
                )
            })?
            .to_vec();

        Ok(TransformOutput {
            bytes,
            width,
            height,
            scale_factor,
            face_count,
        })
    }
}

/// Accelerator context proxied to the remote sidecar's cache endpoint.
pub struct RemoteAccelerator {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteAccelerator {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl AcceleratorContext for RemoteAccelerator {
    async fn clear_cache(&self) -> Result<(), TransformError> {
        let response = self
            .client
            .post(format!("{}/v1/clear-cache", self.base_url))
            .send()
            .await
            .map_err(|e| {
                TransformError::new(
                    TransformErrorKind::Unavailable,
                    format!("Cache clear request failed: {e}"),
                )
            })?;

        if !response.status().is_success() {
            return Err(TransformError::new(
                TransformErrorKind::Internal,
                format!("Cache clear returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
