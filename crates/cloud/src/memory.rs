//! In-memory storage provider for tests and credential-less local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::provider::{StorageError, StorageProvider};

/// Stores uploads in a process-local map and returns `memory://` URLs.
#[derive(Default)]
pub struct MemoryProvider {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a stored object by path.
    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(path).cloned()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn upload(
        &self,
        bytes: &[u8],
        path: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.objects
            .write()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(format!("memory://{path}"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
