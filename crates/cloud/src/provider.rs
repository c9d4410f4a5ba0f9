use async_trait::async_trait;

/// Errors from the storage boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The upload itself failed (network, credentials, provider error).
    #[error("Upload failed: {0}")]
    Upload(String),

    /// The provider is misconfigured (bad bucket, missing base URL).
    #[error("Storage configuration error: {0}")]
    Configuration(String),
}

/// Post-success output upload capability.
///
/// Upload failure after a successful transform is a job failure
/// (`upload_error`), never silently dropped.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store `bytes` at `path` and return the public URL.
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;
}
