//! Structured batch logging utilities.
//!
//! Provides consistent, structured logging for batch processing with
//! tracing spans and contextual information.

use fclip_models::DroppedSegment;
use tracing::{error, info, warn, Span};

/// Batch logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct BatchLogger {
    batch_id: String,
    total_clips: usize,
}

impl BatchLogger {
    pub fn new(batch_id: &str, total_clips: usize) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            total_clips,
        }
    }

    /// Log the start of a batch.
    pub fn log_start(&self, source: &str) {
        info!(
            batch_id = %self.batch_id,
            total_clips = self.total_clips,
            source = %source,
            "Batch started"
        );
    }

    /// Log a progress update for one clip.
    pub fn log_clip(&self, index: usize, clip_id: &str, message: &str) {
        info!(
            batch_id = %self.batch_id,
            clip_id = %clip_id,
            clip_index = index + 1,
            total_clips = self.total_clips,
            "{}", message
        );
    }

    /// Log a segment the filter removed from a clip.
    pub fn log_dropped(&self, clip_id: &str, dropped: &DroppedSegment) {
        warn!(
            batch_id = %self.batch_id,
            clip_id = %clip_id,
            label = %dropped.segment.label,
            start_time = %dropped.segment.start_time,
            end_time = %dropped.segment.end_time,
            reason = %dropped.reason,
            "Dropped segment"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(batch_id = %self.batch_id, "Batch warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(batch_id = %self.batch_id, "Batch error: {}", message);
    }

    /// Log batch completion with final counts.
    pub fn log_completion(&self, success_count: usize, failure_count: usize, elapsed_secs: f64) {
        info!(
            batch_id = %self.batch_id,
            total_clips = self.total_clips,
            success_count,
            failure_count,
            elapsed_sec = elapsed_secs,
            "Batch completed"
        );
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Create a tracing span for this batch.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "batch",
            batch_id = %self.batch_id,
            total_clips = self.total_clips
        )
    }
}
