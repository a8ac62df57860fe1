//! Prometheus metrics for the render worker.

use std::net::SocketAddr;

use fclip_models::ClipRenderResult;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const CLIPS_RENDERED_TOTAL: &str = "fclip_clips_rendered_total";
    pub const CLIP_DURATION_SECONDS: &str = "fclip_clip_output_duration_seconds";
    pub const RENDER_DURATION_SECONDS: &str = "fclip_render_duration_seconds";
    pub const SEGMENTS_DROPPED_TOTAL: &str = "fclip_segments_dropped_total";
    pub const SOURCE_ACQUIRE_DURATION_SECONDS: &str = "fclip_source_acquire_duration_seconds";
    pub const BATCHES_TOTAL: &str = "fclip_batches_total";
    pub const TEMP_FILES_REAPED_TOTAL: &str = "fclip_temp_files_reaped_total";
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install metrics exporter: {}", e)))
}

/// Record the outcome of one clip and the time spent on it.
pub fn record_clip(result: &ClipRenderResult, elapsed_secs: f64) {
    let stage = result
        .failed_stage
        .map(|s| s.as_str())
        .unwrap_or("none");
    let labels = [
        ("status", result.status.as_str().to_string()),
        ("failed_stage", stage.to_string()),
    ];

    counter!(names::CLIPS_RENDERED_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, &labels).record(elapsed_secs);

    if let Some(duration) = result.duration_seconds.filter(|_| result.is_success()) {
        histogram!(names::CLIP_DURATION_SECONDS).record(duration);
    }
    if !result.dropped_segments.is_empty() {
        counter!(names::SEGMENTS_DROPPED_TOTAL).increment(result.dropped_segments.len() as u64);
    }
}

/// Record how long acquiring a source took.
pub fn record_source_acquired(kind: &str, success: bool, elapsed_secs: f64) {
    let labels = [
        ("kind", kind.to_string()),
        ("status", if success { "success" } else { "failure" }.to_string()),
    ];
    histogram!(names::SOURCE_ACQUIRE_DURATION_SECONDS, &labels).record(elapsed_secs);
}

/// Record a finished batch.
pub fn record_batch(success_count: usize, failure_count: usize) {
    let outcome = match (success_count, failure_count) {
        (_, 0) => "success",
        (0, _) => "failure",
        _ => "partial",
    };
    counter!(names::BATCHES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_reaped(count: usize) {
    counter!(names::TEMP_FILES_REAPED_TOTAL).increment(count as u64);
}
