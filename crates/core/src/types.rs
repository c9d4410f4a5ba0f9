/// Jobs are identified by a UUID v4 generated at submission.
///
/// The id is the sole external handle a client holds for a job.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
