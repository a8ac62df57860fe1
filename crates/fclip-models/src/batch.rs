//! Batch render requests and aggregated results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::clip::{ClipRenderRequest, ClipRenderResult};

/// Where the source video comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRef {
    /// Readable file on the local filesystem; never deleted by the engine
    Path { path: PathBuf },
    /// HTTP(S) URL, downloaded to a temporary file
    Url { url: String },
    /// Key in the blob store, read through a signed URL
    Stored { key: String },
}

impl SourceRef {
    /// Whether acquiring this source creates a temporary copy.
    pub fn is_remote(&self) -> bool {
        !matches!(self, SourceRef::Path { .. })
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Path { path } => write!(f, "{}", path.display()),
            SourceRef::Url { url } => write!(f, "{}", url),
            SourceRef::Stored { key } => write!(f, "stored:{}", key),
        }
    }
}

impl FromStr for SourceRef {
    type Err = SourceRefError;

    /// `http(s)://` URLs, `stored:<key>` blob keys, anything else a local path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SourceRefError::Empty);
        }
        if let Some(key) = s.strip_prefix("stored:") {
            if key.is_empty() {
                return Err(SourceRefError::Empty);
            }
            return Ok(SourceRef::Stored {
                key: key.to_string(),
            });
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            let parsed = url::Url::parse(s).map_err(|e| SourceRefError::InvalidUrl(e.to_string()))?;
            return Ok(SourceRef::Url {
                url: parsed.to_string(),
            });
        }
        Ok(SourceRef::Path {
            path: PathBuf::from(s),
        })
    }
}

#[derive(Debug, Error)]
pub enum SourceRefError {
    #[error("Source reference cannot be empty")]
    Empty,
    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),
}

/// Namespace that published artifacts are stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Owner {
    pub user_id: String,
    pub project_id: String,
}

impl Owner {
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
        }
    }
}

/// One source and an ordered list of independent clip requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchRenderRequest {
    #[serde(default = "new_batch_id")]
    pub batch_id: String,
    pub source: SourceRef,
    pub owner: Owner,
    pub clip_requests: Vec<ClipRenderRequest>,
}

fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl BatchRenderRequest {
    pub fn new(source: SourceRef, owner: Owner, clip_requests: Vec<ClipRenderRequest>) -> Self {
        Self {
            batch_id: new_batch_id(),
            source,
            owner,
            clip_requests,
        }
    }
}

/// Aggregated outcome of a batch, one result per request in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchRenderResult {
    pub batch_id: String,
    pub results: Vec<ClipRenderResult>,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_requested: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchRenderResult {
    /// Build the aggregate; counts are always derived from `results`.
    pub fn from_results(
        batch_id: impl Into<String>,
        results: Vec<ClipRenderResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        let total_requested = results.len();
        Self {
            batch_id: batch_id.into(),
            success_count,
            failure_count: total_requested - success_count,
            total_requested,
            results,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0
    }

    /// `success + failure == total == results.len()`
    pub fn is_consistent(&self) -> bool {
        self.success_count + self.failure_count == self.total_requested
            && self.total_requested == self.results.len()
    }
}
