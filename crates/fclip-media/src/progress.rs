//! FFmpeg progress parsing and render progress reporting.
//!
//! The runner turns `-progress pipe:2` key/value blocks into
//! [`FfmpegProgress`] snapshots. A [`ProgressSender`] converts those into
//! per-clip [`RenderProgress`] events on a bounded channel. Events are
//! advisory: when the channel is full they are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Default capacity for render progress channels.
pub const DEFAULT_PROGRESS_CAPACITY: usize = 32;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }

    /// Estimate time remaining in seconds.
    pub fn eta_seconds(&self, total_duration_ms: i64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_ms <= 0 {
            return None;
        }

        let remaining_ms = total_duration_ms - self.out_time_ms;
        if remaining_ms <= 0 {
            return Some(0.0);
        }

        Some((remaining_ms as f64 / 1000.0) / self.speed)
    }
}

/// Progress event for one clip render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderProgress {
    pub clip_id: String,
    /// 0.0 to 100.0
    pub percent: f64,
    /// Encoding speed relative to realtime
    pub speed: f64,
    pub eta_seconds: Option<f64>,
    pub is_complete: bool,
}

/// Sends [`RenderProgress`] for a single clip without ever blocking the render.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<RenderProgress>,
    clip_id: String,
}

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<RenderProgress>, clip_id: impl Into<String>) -> Self {
        Self {
            tx,
            clip_id: clip_id.into(),
        }
    }

    pub fn clip_id(&self) -> &str {
        &self.clip_id
    }

    /// Report an FFmpeg snapshot against the expected output duration.
    pub fn report(&self, progress: &FfmpegProgress, total_duration_ms: i64) {
        let _ = self.tx.try_send(RenderProgress {
            clip_id: self.clip_id.clone(),
            percent: progress.percentage(total_duration_ms),
            speed: progress.speed,
            eta_seconds: progress.eta_seconds(total_duration_ms),
            is_complete: progress.is_complete,
        });
    }
}

/// Create a bounded progress channel.
pub fn channel(capacity: usize) -> (mpsc::Sender<RenderProgress>, mpsc::Receiver<RenderProgress>) {
    mpsc::channel(capacity.max(1))
}

/// Parse one line of FFmpeg's `-progress` output into `current`.
///
/// Returns a snapshot at the end of each block (`progress=continue|end`).
/// FFmpeg reports both `out_time_us` and the misnamed `out_time_ms` in
/// microseconds.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();

    match key {
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }

    None
}
