//! The per-lane execution loop.
//!
//! One iteration: pop a delivery (the loop's only suspension point),
//! claim the record, run the transform under the resource guard, upload
//! the output, settle the broker delivery. Every failure path performs
//! exactly one result-store write before the loop returns to idle.

use std::sync::Arc;
use std::time::Instant;

use pixelift_broker::{BrokerChannel, BrokerError, Delivery};
use pixelift_cloud::StorageProvider;
use pixelift_core::envelope::JobEnvelope;
use pixelift_core::failure::{REASON_RETRIES_EXHAUSTED, REASON_UPLOAD_ERROR};
use pixelift_core::lane::Lane;
use pixelift_core::record::{JobResult, JobStatus, Timings};
use pixelift_engine::{ResourceGuard, Transform, TransformError, TransformOutput};
use pixelift_store::{ResultStore, StoreError, TransitionPayload};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// A single-concurrency execution loop bound to one lane.
pub struct LaneRunner {
    lane: Lane,
    broker: Arc<dyn BrokerChannel>,
    store: Arc<ResultStore>,
    engine: Arc<dyn Transform>,
    storage: Arc<dyn StorageProvider>,
    guard: Arc<ResourceGuard>,
    config: WorkerConfig,
}

impl LaneRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lane: Lane,
        broker: Arc<dyn BrokerChannel>,
        store: Arc<ResultStore>,
        engine: Arc<dyn Transform>,
        storage: Arc<dyn StorageProvider>,
        guard: Arc<ResourceGuard>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            lane,
            broker,
            store,
            engine,
            storage,
            guard,
            config,
        }
    }

    /// Run the claim/execute loop until cancelled or the broker closes.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(lane = %self.lane, "Worker loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(lane = %self.lane, "Worker loop shutting down");
                    break;
                }
                popped = self.broker.pop(self.lane) => {
                    match popped {
                        Ok(delivery) => self.handle(delivery).await,
                        Err(BrokerError::Closed) => {
                            tracing::info!(lane = %self.lane, "Broker closed; worker loop exiting");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(lane = %self.lane, error = %e, "Broker pop failed");
                        }
                    }
                }
            }
        }
    }

    /// Process one delivery start-to-finish.
    async fn handle(&self, delivery: Delivery) {
        let job_id = delivery.envelope.job_id;

        if !self.claim(&delivery).await {
            self.settle_ack(delivery.tag).await;
            return;
        }

        tracing::info!(
            job_id = %job_id,
            lane = %self.lane,
            redeliveries = delivery.redeliveries,
            "Job claimed",
        );

        let started = Instant::now();
        // Hold the accelerator only for the transform itself; the permit
        // is dropped before the (network-bound) upload. The cache clear
        // runs on every exit path, success or failure, and stays inside
        // the critical section so it can never interleave with the other
        // lane's in-flight transform.
        let outcome = {
            let _permit = self.guard.acquire().await;
            let outcome = self
                .engine
                .transform(self.lane, &delivery.envelope.input, &delivery.envelope.options)
                .await;
            self.guard.reset().await;
            outcome
        };

        match outcome {
            Ok(output) => self.finish_success(&delivery, output, started).await,
            Err(error) => self.finish_failure(&delivery, error).await,
        }
    }

    /// Claim the job record, or report that the delivery must be dropped.
    ///
    /// First delivery: CAS `queued -> processing`; exactly one of two
    /// duplicate deliveries wins. Redelivery after a nack: the record is
    /// already `processing` and the redelivery path bumps the attempt
    /// counter instead.
    async fn claim(&self, delivery: &Delivery) -> bool {
        let job_id = delivery.envelope.job_id;
        let claimed = if delivery.redeliveries == 0 {
            self.store
                .transition(
                    job_id,
                    JobStatus::Queued,
                    JobStatus::Processing,
                    TransitionPayload::None,
                )
                .await
        } else {
            self.store.record_redelivery(job_id).await.map(|_| ())
        };

        match claimed {
            Ok(()) => true,
            Err(StoreError::NotFound(_)) => {
                // Duplicate delivery after retention expiry.
                tracing::warn!(job_id = %job_id, "No record for delivered job; dropping");
                false
            }
            Err(StoreError::StaleTransition { actual, .. }) => {
                // Lost the claim race, or the reaper already timed it out.
                tracing::warn!(
                    job_id = %job_id,
                    status = %actual,
                    "Record not claimable; dropping delivery",
                );
                false
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Claim failed; dropping delivery");
                false
            }
        }
    }

    async fn finish_success(&self, delivery: &Delivery, output: TransformOutput, started: Instant) {
        let envelope = &delivery.envelope;
        let processing_ms = started.elapsed().as_millis() as u64;

        let upload_started = Instant::now();
        match self.upload_with_retries(envelope, &output).await {
            Ok(output_url) => {
                let upload_ms = upload_started.elapsed().as_millis() as u64;
                let result = JobResult {
                    output_url,
                    original_width: envelope.input.width,
                    original_height: envelope.input.height,
                    output_width: output.width,
                    output_height: output.height,
                    scale_factor: output.scale_factor,
                    output_format: envelope.options.output_format,
                    face_count: output.face_count,
                    timings: Timings {
                        processing_ms,
                        upload_ms,
                        total_ms: started.elapsed().as_millis() as u64,
                    },
                };
                self.settle_terminal(
                    envelope,
                    JobStatus::Completed,
                    TransitionPayload::Result(result),
                )
                .await;
            }
            Err(e) => {
                tracing::error!(job_id = %envelope.job_id, error = %e, "Output upload failed");
                self.settle_terminal(
                    envelope,
                    JobStatus::Failed,
                    TransitionPayload::Error(REASON_UPLOAD_ERROR.to_string()),
                )
                .await;
            }
        }
        self.settle_ack(delivery.tag).await;
    }

    /// Upload the output, retrying only the upload step. The transform
    /// output is discarded once upload retries are exhausted.
    async fn upload_with_retries(
        &self,
        envelope: &JobEnvelope,
        output: &TransformOutput,
    ) -> Result<String, pixelift_cloud::StorageError> {
        let path = format!(
            "{}/{}.{}",
            self.lane.queue_name(),
            envelope.job_id,
            envelope.options.output_format.as_str(),
        );
        let content_type = envelope.options.output_format.content_type();

        let mut last_error = None;
        for attempt in 0..=self.config.upload_retries {
            match self.storage.upload(&output.bytes, &path, content_type).await {
                Ok(url) => return Ok(url),
                Err(e) => {
                    tracing::warn!(
                        job_id = %envelope.job_id,
                        attempt,
                        error = %e,
                        "Upload attempt failed",
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.expect("at least one upload attempt was made"))
    }

    async fn finish_failure(&self, delivery: &Delivery, error: TransformError) {
        let envelope = &delivery.envelope;

        let reason = if error.kind.is_retryable() {
            if delivery.redeliveries < self.config.max_retries {
                tracing::warn!(
                    job_id = %envelope.job_id,
                    kind = %error.kind,
                    redeliveries = delivery.redeliveries,
                    "Transient failure; requeueing for another attempt",
                );
                if let Err(e) = self.broker.nack(delivery.tag).await {
                    tracing::error!(job_id = %envelope.job_id, error = %e, "Nack failed");
                }
                return;
            }
            REASON_RETRIES_EXHAUSTED
        } else {
            error.kind.as_str()
        };

        tracing::warn!(
            job_id = %envelope.job_id,
            reason,
            detail = %error.message,
            "Job failed",
        );
        self.settle_terminal(
            envelope,
            JobStatus::Failed,
            TransitionPayload::Error(reason.to_string()),
        )
        .await;
        self.settle_ack(delivery.tag).await;
    }

    /// Write the terminal transition; a stale write (the reaper timed the
    /// job out first) is discarded, never resurrected.
    async fn settle_terminal(
        &self,
        envelope: &JobEnvelope,
        to: JobStatus,
        payload: TransitionPayload,
    ) {
        match self
            .store
            .transition(envelope.job_id, JobStatus::Processing, to, payload)
            .await
        {
            Ok(()) => {
                tracing::info!(job_id = %envelope.job_id, status = %to, "Job settled");
            }
            Err(StoreError::StaleTransition { actual, .. }) => {
                tracing::warn!(
                    job_id = %envelope.job_id,
                    status = %actual,
                    "Late terminal write rejected; record already settled",
                );
            }
            Err(e) => {
                tracing::error!(job_id = %envelope.job_id, error = %e, "Terminal write failed");
            }
        }
    }

    async fn settle_ack(&self, tag: pixelift_broker::DeliveryTag) {
        if let Err(e) = self.broker.ack(tag).await {
            tracing::error!(tag, error = %e, "Ack failed");
        }
    }
}
