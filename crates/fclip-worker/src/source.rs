//! Source acquisition.
//!
//! Resolves a [`SourceRef`] to a readable local file. Remote sources are
//! streamed into the work directory and belong to the batch that fetched
//! them; local paths are used in place and never deleted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, info};

use fclip_media::fs_utils::{move_file, remove_file_best_effort};
use fclip_media::wait_for_cancel;
use fclip_models::SourceRef;
use fclip_storage::BlobStore;

use crate::error::{WorkerError, WorkerResult};

/// A source file ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredSource {
    pub path: PathBuf,
    /// Whether the file was created by acquisition and must be cleaned up
    pub owned: bool,
}

impl AcquiredSource {
    /// Delete the file if acquisition created it.
    pub async fn cleanup(&self) {
        if self.owned && remove_file_best_effort(&self.path).await {
            debug!(path = %self.path.display(), "Removed acquired source");
        }
    }
}

/// Fetches sources into the work directory.
#[derive(Clone)]
pub struct SourceAcquirer {
    http: reqwest::Client,
    store: Arc<dyn BlobStore>,
    work_dir: PathBuf,
    signed_url_ttl: Duration,
}

impl SourceAcquirer {
    pub fn new(
        store: Arc<dyn BlobStore>,
        work_dir: impl Into<PathBuf>,
        download_timeout: Duration,
        signed_url_ttl: Duration,
    ) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            store,
            work_dir: work_dir.into(),
            signed_url_ttl,
        })
    }

    /// Resolve `source` to a local file.
    ///
    /// A cancellation observed mid-download aborts with
    /// [`WorkerError::Cancelled`] and removes the partial file.
    pub async fn acquire(
        &self,
        source: &SourceRef,
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<AcquiredSource> {
        let started = Instant::now();
        let result = match source {
            SourceRef::Path { path } => self.acquire_local(path).await,
            SourceRef::Url { url } => self.download(url, cancel).await,
            SourceRef::Stored { key } => self.acquire_stored(key, cancel).await,
        };

        crate::metrics::record_source_acquired(
            source_kind(source),
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        if let Ok(acquired) = &result {
            info!(
                source = %source,
                path = %acquired.path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Source acquired"
            );
        }
        result
    }

    async fn acquire_stored(&self, key: &str, cancel: &watch::Receiver<bool>) -> WorkerResult<AcquiredSource> {
        let url = self
            .store
            .signed_get(key, self.signed_url_ttl)
            .await
            .map_err(|e| WorkerError::acquisition(format!("Failed to sign '{}': {}", key, e)))?;
        self.download(&url, cancel).await
    }

    async fn acquire_local(&self, path: &Path) -> WorkerResult<AcquiredSource> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(AcquiredSource {
                path: path.to_path_buf(),
                owned: false,
            }),
            Ok(_) => Err(WorkerError::acquisition(format!(
                "Source is not a regular file: {}",
                path.display()
            ))),
            Err(e) => Err(WorkerError::acquisition(format!(
                "Source not readable: {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn download(&self, url: &str, cancel: &watch::Receiver<bool>) -> WorkerResult<AcquiredSource> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let part = self.work_dir.join(format!("source-{}.part", id));
        let dest = self.work_dir.join(format!("source-{}{}", id, url_extension(url)));

        if let Err(e) = self.stream_to(url, &part, cancel).await {
            remove_file_best_effort(&part).await;
            return Err(e);
        }
        if let Err(e) = move_file(&part, &dest).await {
            remove_file_best_effort(&part).await;
            return Err(WorkerError::acquisition(format!("Failed to finalize download: {}", e)));
        }

        Ok(AcquiredSource {
            path: dest,
            owned: true,
        })
    }

    /// Stream `url` into `part`. The pending request and every chunk wait
    /// race the cancel flag.
    async fn stream_to(&self, url: &str, part: &Path, cancel: &watch::Receiver<bool>) -> WorkerResult<()> {
        let response = tokio::select! {
            response = self.http.get(url).send() => {
                response.map_err(|e| WorkerError::acquisition(format!("Request failed: {}", e)))?
            }
            _ = wait_for_cancel(Some(cancel.clone())) => {
                info!("Download cancelled before response");
                return Err(WorkerError::Cancelled);
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::acquisition(format!(
                "Download returned HTTP {}",
                status.as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(part).await?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = wait_for_cancel(Some(cancel.clone())) => {
                    info!(bytes = downloaded, "Download cancelled");
                    return Err(WorkerError::Cancelled);
                }
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| WorkerError::acquisition(format!("Download interrupted: {}", e)))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;

        if downloaded == 0 {
            return Err(WorkerError::acquisition("Downloaded source is empty"));
        }
        debug!(bytes = downloaded, "Download complete");
        Ok(())
    }
}

fn source_kind(source: &SourceRef) -> &'static str {
    match source {
        SourceRef::Path { .. } => "path",
        SourceRef::Url { .. } => "url",
        SourceRef::Stored { .. } => "stored",
    }
}

/// `.ext` taken from the URL path, or `.mp4` when there is none worth keeping.
fn url_extension(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| (1..=5).contains(&e.len()) && e.chars().all(|c| c.is_ascii_alphanumeric()))
                .map(|e| format!(".{}", e.to_ascii_lowercase()))
        })
        .unwrap_or_else(|| ".mp4".to_string())
}
