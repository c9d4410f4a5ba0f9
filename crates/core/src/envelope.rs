//! The immutable description of one unit of work.
//!
//! A [`JobEnvelope`] is constructed by the dispatcher at submission and
//! placed on the broker channel. It is never mutated afterwards; all
//! mutable state lives in the result store's job record.

use serde::{Deserialize, Serialize};

use crate::lane::Lane;
use crate::options::JobOptions;
use crate::types::{JobId, Timestamp};

/// Handle to a validated input payload.
///
/// Ownership of the bytes transfers to the worker for the duration of
/// execution; the gateway keeps only the fingerprint and dimensions.
#[derive(Clone, Serialize, Deserialize)]
pub struct InputRef {
    /// SHA-256 hex fingerprint of the payload.
    pub fingerprint: String,
    /// The validated image bytes.
    pub bytes: Vec<u8>,
    /// Width declared by the image header.
    pub width: u32,
    /// Height declared by the image header.
    pub height: u32,
    /// Client-supplied filename, if any.
    pub filename: Option<String>,
}

impl std::fmt::Debug for InputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputRef")
            .field("fingerprint", &self.fingerprint)
            .field("bytes_len", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("filename", &self.filename)
            .finish()
    }
}

/// Immutable job description as delivered through the broker channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: JobId,
    pub lane: Lane,
    pub input: InputRef,
    pub options: JobOptions,
    pub submitted_at: Timestamp,
}

impl JobEnvelope {
    /// Create an envelope with a fresh job id and the current time.
    pub fn new(lane: Lane, input: InputRef, options: JobOptions) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4(),
            lane,
            input,
            options,
            submitted_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SubmitOptions;

    fn input() -> InputRef {
        InputRef {
            fingerprint: crate::fingerprint::fingerprint(b"test"),
            bytes: b"test".to_vec(),
            width: 4,
            height: 4,
            filename: Some("test.png".to_string()),
        }
    }

    #[test]
    fn envelopes_receive_distinct_ids() {
        let options = JobOptions::for_lane(Lane::Upscale, SubmitOptions::default()).unwrap();
        let a = JobEnvelope::new(Lane::Upscale, input(), options.clone());
        let b = JobEnvelope::new(Lane::Upscale, input(), options);
        assert_ne!(a.job_id, b.job_id);
    }

    #[test]
    fn debug_does_not_dump_payload_bytes() {
        let rendered = format!("{:?}", input());
        assert!(rendered.contains("bytes_len"));
        assert!(!rendered.contains("116, 101, 115, 116"));
    }
}
