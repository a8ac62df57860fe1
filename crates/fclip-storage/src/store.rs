//! Blob store abstraction.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::StorageResult;

/// Durable object storage as seen by the render pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file under `key`, returning the object's durable URL.
    ///
    /// Writing an existing key replaces the object.
    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> StorageResult<String>;

    /// Time-limited read URL for `key`.
    async fn signed_get(&self, key: &str, ttl: Duration) -> StorageResult<String>;
}
