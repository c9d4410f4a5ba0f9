//! The closed, lane-specific job options schema.
//!
//! Options arrive from the gateway as a loosely-populated [`SubmitOptions`]
//! and are validated into a fully-resolved [`JobOptions`] before a job is
//! created. Unrecognized keys are rejected at the wire boundary
//! (`deny_unknown_fields`), never silently ignored.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::lane::Lane;

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Webp,
    Png,
    Jpeg,
}

impl OutputFormat {
    /// Wire name, also used as the file extension on upload paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
        }
    }

    /// MIME type for the encoded output.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Auto,
    High,
    Medium,
    Low,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Auto => "auto",
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
        }
    }
}

/// Options as submitted by the client, before lane validation.
///
/// Every field is optional; defaults are applied during validation.
/// `deny_unknown_fields` makes an unrecognized key a deserialization
/// error, which the gateway surfaces as a 400 before any job exists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitOptions {
    pub format: Option<OutputFormat>,
    pub quality: Option<Quality>,
    pub only_center_face: Option<bool>,
}

/// Fully-resolved options carried on the job envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    pub output_format: OutputFormat,
    pub quality: Quality,
    /// Only meaningful on the face lane; always `false` on upscale.
    pub only_center_face: bool,
}

impl JobOptions {
    /// Validate submitted options against the closed schema for `lane`.
    ///
    /// - `format` defaults to webp, `quality` to auto.
    /// - The face lane accepts `only_center_face` and defaults it to `false`.
    /// - The upscale lane rejects `only_center_face` entirely.
    pub fn for_lane(lane: Lane, submitted: SubmitOptions) -> Result<Self, CoreError> {
        if lane == Lane::Upscale && submitted.only_center_face.is_some() {
            return Err(CoreError::Validation(
                "Option only_center_face is not supported on the upscale lane".to_string(),
            ));
        }

        Ok(Self {
            output_format: submitted.format.unwrap_or(OutputFormat::Webp),
            quality: submitted.quality.unwrap_or(Quality::Auto),
            only_center_face: match lane {
                Lane::Upscale => false,
                Lane::Face => submitted.only_center_face.unwrap_or(false),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
