//! Well-known classified failure reason strings.
//!
//! These are the exact values written to a failed job record's `error`
//! field and exposed to clients. Engine-classified domain errors (e.g.
//! `no_face_detected`) pass through verbatim alongside these.

/// The broker rejected the push at submission; the record is created
/// and immediately failed so the returned job id still resolves.
pub const REASON_ENQUEUE_ERROR: &str = "enqueue_error";

/// A retryable failure persisted through every allowed attempt.
pub const REASON_RETRIES_EXHAUSTED: &str = "retries_exhausted";

/// The reaper force-failed a job stuck in `processing` past the hard
/// timeout. Distinguishes "never finished" from "finished badly".
pub const REASON_TIMEOUT: &str = "timeout";

/// The transform succeeded but uploading the output did not.
pub const REASON_UPLOAD_ERROR: &str = "upload_error";
