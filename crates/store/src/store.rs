use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixelift_core::failure::REASON_TIMEOUT;
use pixelift_core::lane::Lane;
use pixelift_core::record::{JobRecord, JobResult, JobStatus};
use pixelift_core::types::{JobId, Timestamp};
use serde::Serialize;
use tokio::sync::RwLock;

/// Errors from result store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record already exists for this id. Ids are UUID v4, so this
    /// indicates an invariant violation, not a normal collision.
    #[error("Duplicate job id: {0}")]
    DuplicateJob(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// The compare-and-swap lost: the record's current status did not
    /// match the expected `from` status.
    #[error("Stale transition for job {job_id}: expected {expected}, found {actual}")]
    StaleTransition {
        job_id: JobId,
        expected: JobStatus,
        actual: JobStatus,
    },

    /// The requested transition is not permitted by the forward-only
    /// state machine. Always a programming error.
    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}

/// Data written alongside a status transition.
#[derive(Debug, Clone)]
pub enum TransitionPayload {
    None,
    Result(JobResult),
    Error(String),
}

/// One entry of [`ResultStore::list_active`].
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJob {
    pub job_id: JobId,
    pub lane: Lane,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
}

/// Counts reported by one reaper sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Records evicted because they aged past the retention window.
    pub evicted: usize,
    /// Records force-failed because they were stuck in `processing`.
    pub timed_out: usize,
}

/// In-memory job record store.
///
/// Safe for concurrent use from the gateway's request handlers and every
/// worker loop; all mutations are serialized behind one `RwLock`, which
/// also linearizes racing compare-and-swap transitions.
#[derive(Default)]
pub struct ResultStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `queued` record for a newly submitted job.
    ///
    /// Must happen before the envelope is pushed to the broker so a
    /// worker can never observe a job whose record does not exist yet.
    pub async fn create(&self, job_id: JobId, lane: Lane) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job_id) {
            return Err(StoreError::DuplicateJob(job_id));
        }
        jobs.insert(job_id, JobRecord::queued(job_id, lane));
        Ok(())
    }

    /// Atomic compare-and-swap on a record's status.
    ///
    /// Exactly one of two racing calls with the same `from` wins; the
    /// loser observes [`StoreError::StaleTransition`]. Repeating a write
    /// of the terminal status a record already holds is a no-op, so
    /// duplicate terminal writes are idempotent.
    pub async fn transition(
        &self,
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
        payload: TransitionPayload,
    ) -> Result<(), StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::IllegalTransition { from, to });
        }

        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;

        if record.status == to && to.is_terminal() {
            return Ok(());
        }
        if record.status != from {
            return Err(StoreError::StaleTransition {
                job_id,
                expected: from,
                actual: record.status,
            });
        }

        let now = Utc::now();
        record.status = to;
        match to {
            JobStatus::Processing => {
                record.started_at = Some(now);
                record.attempt_count += 1;
            }
            JobStatus::Completed | JobStatus::Failed => {
                record.completed_at = Some(now);
            }
            JobStatus::Queued => unreachable!("no transition targets queued"),
        }
        match payload {
            TransitionPayload::None => {}
            TransitionPayload::Result(result) => record.result = Some(result),
            TransitionPayload::Error(reason) => record.error = Some(reason),
        }
        Ok(())
    }

    /// Record a broker redelivery of a job that is already `processing`.
    ///
    /// The redelivery path, not the worker, owns the attempt counter:
    /// each redelivered claim bumps it by one. Returns the new count.
    pub async fn record_redelivery(&self, job_id: JobId) -> Result<u32, StoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;

        if record.status != JobStatus::Processing {
            return Err(StoreError::StaleTransition {
                job_id,
                expected: JobStatus::Processing,
                actual: record.status,
            });
        }
        record.attempt_count += 1;
        Ok(record.attempt_count)
    }

    /// Fetch a snapshot of a job record.
    pub async fn get(&self, job_id: JobId) -> Result<JobRecord, StoreError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    /// Non-terminal jobs, optionally filtered to one lane.
    pub async fn list_active(&self, lane: Option<Lane>) -> Vec<ActiveJob> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|r| !r.status.is_terminal())
            .filter(|r| lane.is_none_or(|l| r.lane == l))
            .map(|r| ActiveJob {
                job_id: r.job_id,
                lane: r.lane,
                status: r.status,
                started_at: r.started_at,
            })
            .collect()
    }

    /// One reaper pass against the current clock.
    pub async fn sweep(&self, retention: Duration, processing_timeout: Duration) -> SweepStats {
        self.sweep_at(Utc::now(), retention, processing_timeout)
            .await
    }

    /// One reaper pass evaluated at `now` (injectable for tests).
    ///
    /// Force-failing a stuck job is the only transition not performed by
    /// the owning worker; it exists so a crashed worker cannot leave a
    /// job unresolved from the client's perspective.
    pub async fn sweep_at(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
        processing_timeout: Duration,
    ) -> SweepStats {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let processing_timeout =
            chrono::Duration::from_std(processing_timeout).unwrap_or(chrono::Duration::MAX);

        let mut stats = SweepStats::default();
        let mut jobs = self.jobs.write().await;

        for record in jobs.values_mut() {
            if record.status == JobStatus::Processing {
                let started = record.started_at.unwrap_or(record.created_at);
                if now - started > processing_timeout {
                    record.status = JobStatus::Failed;
                    record.error = Some(REASON_TIMEOUT.to_string());
                    record.completed_at = Some(now);
                    stats.timed_out += 1;
                    tracing::warn!(
                        job_id = %record.job_id,
                        lane = %record.lane,
                        "Job stuck in processing past the hard timeout; force-failed",
                    );
                }
            }
        }

        let before = jobs.len();
        jobs.retain(|_, record| now - record.created_at <= retention);
        stats.evicted = before - jobs.len();

        stats
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
