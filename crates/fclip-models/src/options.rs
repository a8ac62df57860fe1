//! Render options and quality presets.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Named quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

/// Fixed encoder targets for a [`Quality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreset {
    pub video_bitrate: &'static str,
    pub audio_bitrate: &'static str,
    pub target_width: u32,
}

impl Quality {
    pub const fn preset(&self) -> QualityPreset {
        match self {
            Quality::Low => QualityPreset {
                video_bitrate: "500k",
                audio_bitrate: "64k",
                target_width: 720,
            },
            Quality::Medium => QualityPreset {
                video_bitrate: "1000k",
                audio_bitrate: "128k",
                target_width: 1280,
            },
            Quality::High => QualityPreset {
                video_bitrate: "2000k",
                audio_bitrate: "192k",
                target_width: 1920,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Quality {
    type Err = OptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            _ => Err(OptionParseError::Quality(s.to_string())),
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mov,
    Avi,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mov => "mov",
            OutputFormat::Avi => "avi",
        }
    }

    /// FFmpeg muxer name (`-f`).
    pub fn muxer(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mov => "mov",
            OutputFormat::Avi => "avi",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Mov => "video/quicktime",
            OutputFormat::Avi => "video/x-msvideo",
        }
    }

    /// Whether the moov atom can be moved to the front for progressive playback.
    pub fn supports_faststart(&self) -> bool {
        matches!(self, OutputFormat::Mp4 | OutputFormat::Mov)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = OptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "mov" => Ok(OutputFormat::Mov),
            "avi" => Ok(OutputFormat::Avi),
            _ => Err(OptionParseError::Format(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum OptionParseError {
    #[error("Unknown quality: {0}")]
    Quality(String),
    #[error("Unknown output format: {0}")]
    Format(String),
}

/// Per-clip render settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_crossfade"))]
pub struct RenderOptions {
    pub quality: Quality,
    pub format: OutputFormat,
    /// Requested frame width; capped by the quality preset
    #[validate(range(min = 16, max = 7680))]
    pub width: u32,
    #[validate(range(min = 16, max = 4320))]
    pub height: u32,
    #[validate(range(min = 1, max = 120))]
    pub fps: u32,
    /// Blend adjacent segments instead of hard cuts
    pub crossfade: bool,
    /// Requested crossfade length in seconds
    #[validate(range(min = 0.0, max = 5.0))]
    pub crossfade_duration: f64,
    /// Fade in at the start and out at the end
    pub include_fades: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            quality: Quality::Medium,
            format: OutputFormat::Mp4,
            width: 1920,
            height: 1080,
            fps: 30,
            crossfade: false,
            crossfade_duration: 0.5,
            include_fades: false,
        }
    }
}

fn validate_crossfade(options: &RenderOptions) -> Result<(), ValidationError> {
    if !options.crossfade_duration.is_finite() {
        return Err(ValidationError::new("crossfade_duration_not_finite"));
    }
    if options.crossfade && options.crossfade_duration <= 0.0 {
        return Err(ValidationError::new("crossfade_duration_must_be_positive"));
    }
    Ok(())
}

impl RenderOptions {
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_crossfade(mut self, duration_secs: f64) -> Self {
        self.crossfade = true;
        self.crossfade_duration = duration_secs;
        self
    }

    pub fn with_fades(mut self) -> Self {
        self.include_fades = true;
        self
    }

    /// Normalized frame size.
    ///
    /// Width is the smaller of the requested width and the preset's target
    /// width; height follows the requested aspect ratio. Both are rounded
    /// down to even values for yuv420p.
    pub fn output_size(&self) -> (u32, u32) {
        let requested_w = self.width.max(2);
        let requested_h = self.height.max(2);
        let width = requested_w.min(self.quality.preset().target_width);
        let height = (u64::from(requested_h) * u64::from(width) / u64::from(requested_w)) as u32;
        (even(width), even(height))
    }
}

fn even(value: u32) -> u32 {
    (value - value % 2).max(2)
}
