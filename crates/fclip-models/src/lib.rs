//! Shared data models for the clip assembly engine.
//!
//! This crate provides Serde-serializable types for:
//! - The `HH:MM:SS,mmm` timestamp codec
//! - Segment specifications and the validity filter
//! - Render options, quality presets and encoder settings
//! - Clip and batch requests and results

pub mod batch;
pub mod clip;
pub mod encoding;
pub mod options;
pub mod segment;
pub mod timestamp;

// Re-export common types
pub use batch::{BatchRenderRequest, BatchRenderResult, Owner, SourceRef, SourceRefError};
pub use clip::{ArtifactRef, ClipRenderRequest, ClipRenderResult, ClipStatus, RenderStage};
pub use encoding::EncodingConfig;
pub use options::{OutputFormat, Quality, QualityPreset, RenderOptions};
pub use segment::{
    filter_segments, DropReason, DroppedSegment, FilterOutcome, SegmentPurpose, SegmentSpec,
    ValidatedSegment, DEFAULT_MAX_SEGMENT_SECS,
};
pub use timestamp::{to_seconds, to_timestamp, Timestamp, TimestampError};
