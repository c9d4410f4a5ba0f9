//! The opaque `Transform(image, options) -> image | error` capability.

use async_trait::async_trait;
use pixelift_core::envelope::InputRef;
use pixelift_core::lane::Lane;
use pixelift_core::options::JobOptions;

/// Classified failure kinds from the transform capability.
///
/// The kind decides retryability: only momentary conditions are retried.
/// Anything the worker cannot classify defaults to [`Internal`], which is
/// non-retryable — failing closed avoids retry storms on unknown failure
/// modes.
///
/// [`Internal`]: TransformErrorKind::Internal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// Face lane: the detector found no face in the input.
    NoFaceDetected,
    /// The input bytes could not be decoded as an image.
    InvalidImage,
    /// The accelerator ran out of memory or the engine shed load.
    ResourceExhausted,
    /// The engine could not be reached or was mid-restart.
    Unavailable,
    /// Anything else.
    Internal,
}

impl TransformErrorKind {
    /// Wire string, also used verbatim as the job's classified `error`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformErrorKind::NoFaceDetected => "no_face_detected",
            TransformErrorKind::InvalidImage => "invalid_image",
            TransformErrorKind::ResourceExhausted => "resource_exhausted",
            TransformErrorKind::Unavailable => "unavailable",
            TransformErrorKind::Internal => "internal_error",
        }
    }

    /// Parse an engine-reported kind; unknown strings fail closed.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "no_face_detected" => TransformErrorKind::NoFaceDetected,
            "invalid_image" => TransformErrorKind::InvalidImage,
            "resource_exhausted" => TransformErrorKind::ResourceExhausted,
            "unavailable" => TransformErrorKind::Unavailable,
            _ => TransformErrorKind::Internal,
        }
    }

    /// Whether the worker may nack the job for another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransformErrorKind::ResourceExhausted | TransformErrorKind::Unavailable
        )
    }
}

impl std::fmt::Display for TransformErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified transform failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransformError {
    pub kind: TransformErrorKind,
    /// Internal detail for logs; never forwarded to the client.
    pub message: String,
}

impl TransformError {
    pub fn new(kind: TransformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Output of one successful transform invocation.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Encoded output image in the requested format.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Upscaling factor relative to the input (4.0 for upscale, 1.0 for face).
    pub scale_factor: f64,
    /// Faces processed; face lane only.
    pub face_count: Option<u32>,
}

/// The external transform capability consumed by worker loops.
///
/// Implementations must be idempotent: invoking the same input and
/// options repeatedly must be safe, since retried jobs re-run the call.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn transform(
        &self,
        lane: Lane,
        input: &InputRef,
        options: &JobOptions,
    ) -> Result<TransformOutput, TransformError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
