//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while building graphs or driving FFmpeg.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found (set FFMPEG_PATH or add ffmpeg to PATH)")]
    FfmpegNotFound,

    #[error("FFprobe not found (set FFPROBE_PATH or add ffprobe to PATH)")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}{}", stderr_suffix(.stderr))]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}{}", stderr_suffix(.stderr))]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid filter graph: {0}")]
    InvalidGraph(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error came from a cancellation request rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }

    /// Captured FFmpeg stderr, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

/// Trailing stderr lines folded onto one line for error messages.
fn stderr_suffix(stderr: &Option<String>) -> String {
    let lines: Vec<&str> = stderr
        .as_deref()
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        String::new()
    } else {
        format!(": {}", lines.join(" | "))
    }
}
