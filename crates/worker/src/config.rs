use pixelift_core::lane::Lane;

/// Tuning knobs for the worker pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Execution loops on the upscale lane.
    pub upscale_concurrency: usize,
    /// Execution loops on the face lane.
    pub face_concurrency: usize,
    /// Maximum nack-driven redeliveries for a transient failure.
    /// A job makes at most `max_retries + 1` attempts.
    pub max_retries: u32,
    /// Additional upload attempts after a successful transform before
    /// the job fails with `upload_error`. The transform is never re-run
    /// for an upload failure.
    pub upload_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            upscale_concurrency: 1,
            face_concurrency: 1,
            max_retries: 3,
            upload_retries: 2,
        }
    }
}

impl WorkerConfig {
    /// Loop count for the given lane.
    pub fn concurrency(&self, lane: Lane) -> usize {
        match lane {
            Lane::Upscale => self.upscale_concurrency,
            Lane::Face => self.face_concurrency,
        }
    }
}
