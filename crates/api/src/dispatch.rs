//! The submission pipeline behind the upload endpoints.
//!
//! Order matters here: the `queued` record is created in the result store
//! *before* the envelope is pushed onto the broker, so a client that polls
//! immediately after a 202 always finds its job. If the push then fails,
//! the record is flipped to `failed` with reason `enqueue_error` and the
//! job id is still returned to the caller.

use std::io::Cursor;
use std::sync::Arc;

use pixelift_broker::BrokerChannel;
use pixelift_core::envelope::{InputRef, JobEnvelope};
use pixelift_core::error::CoreError;
use pixelift_core::failure::REASON_ENQUEUE_ERROR;
use pixelift_core::fingerprint::fingerprint;
use pixelift_core::lane::{Lane, LaneLimits};
use pixelift_core::options::{JobOptions, SubmitOptions};
use pixelift_core::record::JobStatus;
use pixelift_core::types::JobId;
use pixelift_store::{ResultStore, StoreError, TransitionPayload};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Metadata extracted from a validated upload, echoed back on the 202.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A job accepted for asynchronous execution.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedJob {
    pub job_id: JobId,
    /// `Queued` normally; `Failed` when the record was created but the
    /// enqueue itself failed.
    pub status: JobStatus,
    pub image_info: ImageInfo,
    pub options: JobOptions,
}

/// Validates submissions and hands them to the broker.
pub struct Dispatcher {
    broker: Arc<dyn BrokerChannel>,
    store: Arc<ResultStore>,
    limits: LaneLimits,
}

impl Dispatcher {
    pub fn new(
        broker: Arc<dyn BrokerChannel>,
        store: Arc<ResultStore>,
        limits: LaneLimits,
    ) -> Self {
        Self {
            broker,
            store,
            limits,
        }
    }

    /// Validate an upload and enqueue it on `lane`.
    ///
    /// Validation failures return before any record exists. After the
    /// record is created the job id is always returned, even when the
    /// enqueue itself fails.
    pub async fn submit(
        &self,
        lane: Lane,
        bytes: Vec<u8>,
        filename: Option<String>,
        submitted: SubmitOptions,
    ) -> AppResult<AcceptedJob> {
        let options = JobOptions::for_lane(lane, submitted)?;
        let (width, height) = sniff_dimensions(&bytes)?;
        self.limits.admit(lane, width, height)?;

        let input = InputRef {
            fingerprint: fingerprint(&bytes),
            bytes,
            width,
            height,
            filename,
        };
        let image_info = ImageInfo {
            width,
            height,
            size_bytes: input.bytes.len(),
            fingerprint: input.fingerprint.clone(),
            filename: input.filename.clone(),
        };

        let envelope = JobEnvelope::new(lane, input, options.clone());
        let job_id = envelope.job_id;

        // Record first, enqueue second.
        self.store.create(job_id, lane).await?;

        let status = if let Err(e) = self.broker.push(envelope).await {
            tracing::error!(job_id = %job_id, lane = %lane, error = %e, "Enqueue failed");
            self.mark_enqueue_failed(job_id).await;
            JobStatus::Failed
        } else {
            tracing::info!(
                job_id = %job_id,
                lane = %lane,
                width,
                height,
                fingerprint = %image_info.fingerprint,
                "Job enqueued",
            );
            JobStatus::Queued
        };

        Ok(AcceptedJob {
            job_id,
            status,
            image_info,
            options,
        })
    }

    async fn mark_enqueue_failed(&self, job_id: JobId) {
        let result = self
            .store
            .transition(
                job_id,
                JobStatus::Queued,
                JobStatus::Failed,
                TransitionPayload::Error(REASON_ENQUEUE_ERROR.to_string()),
            )
            .await;
        if let Err(e) = result {
            // Not reachable through the normal submit path; the record was
            // created queued moments ago and nothing else has seen the job.
            match e {
                StoreError::StaleTransition { actual, .. } => {
                    tracing::warn!(job_id = %job_id, status = %actual, "Enqueue-failure write lost a race");
                }
                other => {
                    tracing::error!(job_id = %job_id, error = %other, "Enqueue-failure write failed");
                }
            }
        }
    }
}

/// Read width and height from the image header without decoding pixels.
fn sniff_dimensions(bytes: &[u8]) -> Result<(u32, u32), CoreError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CoreError::Internal(format!("Format detection failed: {e}")))?;
    reader
        .into_dimensions()
        .map_err(|_| CoreError::Validation("Uploaded file is not a supported image".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
