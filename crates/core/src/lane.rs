//! Lanes map a job's model family to exactly one isolated work queue.
//!
//! Each transform type owns one lane; lanes never share workers and the
//! broker never cross-delivers between them. The per-lane pixel ceilings
//! bound accelerator memory before a job ever reaches a worker.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Pixel-area admission ceiling for the upscale lane (50 megapixels).
pub const UPSCALE_MAX_PIXELS: u64 = 50 * 1_000_000;

/// Pixel-area admission ceiling for the face lane (25 megapixels).
pub const FACE_MAX_PIXELS: u64 = 25 * 1_000_000;

/// The model family a job must be executed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Resolution upscaling (Real-ESRGAN family, fixed 4x factor).
    Upscale,
    /// Face restoration (GFPGAN family).
    Face,
}

impl Lane {
    /// Queue name used on the broker channel for this lane.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Lane::Upscale => "upscale",
            Lane::Face => "face",
        }
    }

    /// Default pixel-area ceiling for jobs on this lane.
    pub fn default_max_pixels(&self) -> u64 {
        match self {
            Lane::Upscale => UPSCALE_MAX_PIXELS,
            Lane::Face => FACE_MAX_PIXELS,
        }
    }

    /// All lanes, in a stable order. Used when spawning per-lane workers.
    pub fn all() -> [Lane; 2] {
        [Lane::Upscale, Lane::Face]
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.queue_name())
    }
}

/// Per-lane admission ceilings, overridable for testing and deployment.
#[derive(Debug, Clone, Copy)]
pub struct LaneLimits {
    pub upscale_max_pixels: u64,
    pub face_max_pixels: u64,
}

impl Default for LaneLimits {
    fn default() -> Self {
        Self {
            upscale_max_pixels: UPSCALE_MAX_PIXELS,
            face_max_pixels: FACE_MAX_PIXELS,
        }
    }
}

impl LaneLimits {
    /// Ceiling applying to the given lane.
    pub fn max_pixels(&self, lane: Lane) -> u64 {
        match lane {
            Lane::Upscale => self.upscale_max_pixels,
            Lane::Face => self.face_max_pixels,
        }
    }

    /// Reject an input whose declared pixel area exceeds the lane ceiling.
    ///
    /// Runs at submission time so oversized inputs never reach a worker.
    pub fn admit(&self, lane: Lane, width: u32, height: u32) -> Result<(), CoreError> {
        let pixels = u64::from(width) * u64::from(height);
        let ceiling = self.max_pixels(lane);
        if pixels > ceiling {
            return Err(CoreError::Validation(format!(
                "Image too large for the {lane} lane: {pixels} pixels exceeds the {ceiling} pixel ceiling"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_are_distinct() {
        assert_ne!(Lane::Upscale.queue_name(), Lane::Face.queue_name());
    }

    #[test]
    fn lane_serializes_to_queue_name() {
        let json = serde_json::to_string(&Lane::Upscale).unwrap();
        assert_eq!(json, "\"upscale\"");
        let json = serde_json::to_string(&Lane::Face).unwrap();
        assert_eq!(json, "\"face\"");
    }

    #[test]
    fn default_ceilings_match_lane_policy() {
        let limits = LaneLimits::default();
        assert_eq!(limits.max_pixels(Lane::Upscale), 50_000_000);
        assert_eq!(limits.max_pixels(Lane::Face), 25_000_000);
    }

    #[test]
    fn admit_accepts_input_at_the_ceiling() {
        let limits = LaneLimits {
            upscale_max_pixels: 64,
            face_max_pixels: 64,
        };
        assert!(limits.admit(Lane::Upscale, 8, 8).is_ok());
    }

    #[test]
    fn admit_rejects_oversized_input() {
        let limits = LaneLimits {
            upscale_max_pixels: 63,
            face_max_pixels: 63,
        };
        let err = limits.admit(Lane::Upscale, 8, 8).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
