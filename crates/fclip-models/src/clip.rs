//! Clip render requests and results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::options::RenderOptions;
use crate::segment::{DroppedSegment, FilterOutcome, SegmentSpec};

/// One output clip to assemble from a shared source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRenderRequest {
    /// Caller-chosen identifier; also names the published artifact
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub segments: Vec<SegmentSpec>,
    #[serde(default)]
    pub options: RenderOptions,
}

impl ClipRenderRequest {
    pub fn new(id: impl Into<String>, segments: Vec<SegmentSpec>) -> Self {
        Self {
            id: id.into(),
            title: None,
            segments,
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }
}

/// Terminal status of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    Completed,
    Failed,
}

impl ClipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipStatus::Completed => "completed",
            ClipStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stage a clip failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    /// Segment filtering or option checks
    Validation,
    /// Source acquisition (batch-wide)
    Acquisition,
    /// Filter graph construction
    GraphBuild,
    /// FFmpeg encode
    Render,
    /// Upload to the blob store
    Publish,
    /// Batch cancelled before the clip finished
    Cancelled,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Validation => "validation",
            RenderStage::Acquisition => "acquisition",
            RenderStage::GraphBuild => "graph_build",
            RenderStage::Render => "render",
            RenderStage::Publish => "publish",
            RenderStage::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable reference to a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactRef {
    /// Blob store key
    pub key: String,
    /// URL returned by the store for the key
    pub url: String,
}

/// Outcome of one clip request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRenderResult {
    pub id: String,
    pub status: ClipStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<RenderStage>,
    /// Segments the filter removed, even when the clip still rendered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_segments: Vec<DroppedSegment>,
}

impl ClipRenderResult {
    pub fn completed(
        id: impl Into<String>,
        artifact: ArtifactRef,
        file_size_bytes: u64,
        duration_seconds: f64,
        dropped_segments: Vec<DroppedSegment>,
    ) -> Self {
        Self {
            id: id.into(),
            status: ClipStatus::Completed,
            artifact: Some(artifact),
            file_size_bytes: Some(file_size_bytes),
            duration_seconds: Some(duration_seconds),
            error: None,
            failed_stage: None,
            dropped_segments,
        }
    }

    pub fn failed(id: impl Into<String>, stage: RenderStage, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ClipStatus::Failed,
            artifact: None,
            file_size_bytes: None,
            duration_seconds: None,
            error: Some(error.into()),
            failed_stage: Some(stage),
            dropped_segments: Vec::new(),
        }
    }

    /// Result for a request whose segments were all dropped.
    ///
    /// Reports zero duration and the drop reasons; nothing was rendered.
    pub fn degraded(id: impl Into<String>, outcome: &FilterOutcome) -> Self {
        let message = if outcome.dropped.is_empty() {
            "no segments provided".to_string()
        } else {
            format!("all segments were dropped: {}", outcome.drop_summary())
        };
        Self {
            duration_seconds: Some(0.0),
            dropped_segments: outcome.dropped.clone(),
            ..Self::failed(id, RenderStage::Validation, message)
        }
    }

    pub fn with_dropped(mut self, dropped: Vec<DroppedSegment>) -> Self {
        self.dropped_segments = dropped;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ClipStatus::Completed
    }
}
