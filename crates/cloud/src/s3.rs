//! S3-backed storage provider.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::provider::{StorageError, StorageProvider};

/// Configuration for the S3 provider.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Bucket that receives transformed outputs.
    pub bucket: String,
    /// Public base URL for uploaded objects, e.g. a CDN domain in front
    /// of the bucket. The object key is appended to this.
    pub public_base_url: String,
}

/// Uploads outputs to S3 and returns CDN-facing URLs.
pub struct S3Provider {
    client: aws_sdk_s3::Client,
    config: S3Config,
}

impl S3Provider {
    /// Build a provider from the ambient AWS environment (credentials,
    /// region) and the given bucket configuration.
    pub async fn from_env(config: S3Config) -> Result<Self, StorageError> {
        if config.bucket.is_empty() {
            return Err(StorageError::Configuration(
                "S3 bucket must not be empty".to_string(),
            ));
        }
        let sdk_config = aws_config::load_from_env().await;
        Ok(Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            config,
        })
    }

    /// Build a provider around an existing SDK client (tests, custom
    /// endpoints).
    pub fn with_client(client: aws_sdk_s3::Client, config: S3Config) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl StorageProvider for S3Provider {
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Upload(format!("S3 put_object failed: {e}")))?;

        tracing::debug!(
            bucket = %self.config.bucket,
            key = %path,
            size = bytes.len(),
            "Uploaded output object",
        );

        Ok(format!(
            "{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            path
        ))
    }
}
