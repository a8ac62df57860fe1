//! Artifact publishing.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use fclip_models::ArtifactRef;
use tracing::{info, warn};

use crate::error::StorageResult;
use crate::store::BlobStore;

/// Uploads finished artifacts and removes the local copy.
#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn BlobStore>,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Upload `local_path` under `key`.
    ///
    /// The local file is deleted afterwards whether or not the upload
    /// succeeded; a failed delete is only logged.
    pub async fn publish(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> StorageResult<ArtifactRef> {
        let started = Instant::now();
        let result = self.store.put(local_path, key, content_type).await;

        if let Err(e) = tokio::fs::remove_file(local_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    path = %local_path.display(),
                    error = %e,
                    "Failed to remove local artifact after publish"
                );
            }
        }

        let url = result?;
        info!(
            key = %key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Published artifact"
        );
        Ok(ArtifactRef {
            key: key.to_string(),
            url,
        })
    }
}
