//! Job records and the status state machine.
//!
//! A [`JobRecord`] is the mutable status/result entry owned exclusively
//! by the result store. Records move strictly forward through
//! `queued -> processing -> {completed | failed}`; a terminal status is
//! never overwritten. (`queued -> failed` is also legal: it is the
//! dispatcher's enqueue-failure path.)

use serde::{Deserialize, Serialize};

use crate::lane::Lane;
use crate::options::OutputFormat;
use crate::types::{JobId, Timestamp};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// A terminal status is never overwritten once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the forward-only state machine permits `self -> to`.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase timing breakdown reported on a completed job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timings {
    pub processing_ms: u64,
    pub upload_ms: u64,
    pub total_ms: u64,
}

/// Result payload, present iff the job completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// Public URL of the uploaded output.
    pub output_url: String,
    pub original_width: u32,
    pub original_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    /// Upscaling factor applied (4.0 on the upscale lane, 1.0 on face).
    pub scale_factor: f64,
    pub output_format: OutputFormat,
    /// Number of faces processed; face lane only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_count: Option<u32>,
    pub timings: Timings,
}

/// Mutable status/result entry, one per job id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub lane: Lane,
    pub status: JobStatus,
    /// Number of execution attempts made so far.
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Short classified reason, present iff the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl JobRecord {
    /// A fresh `queued` record as created at submission.
    pub fn queued(job_id: JobId, lane: Lane) -> Self {
        Self {
            job_id,
            lane,
            status: JobStatus::Queued,
            attempt_count: 0,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn forward_transitions_are_legal() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn backward_and_terminal_transitions_are_illegal() {
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
    }

    #[test]
    fn fresh_record_is_queued_with_zero_attempts() {
        let record = JobRecord::queued(uuid::Uuid::new_v4(), Lane::Face);
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.attempt_count, 0);
        assert!(record.result.is_none());
        assert!(record.error.is_none());
    }
}
