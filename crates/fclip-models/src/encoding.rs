//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::options::{OutputFormat, RenderOptions};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Pixel format with the widest player support
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

/// Encoder settings for one render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    #[serde(default = "default_video_codec")]
    pub codec: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    /// Target video bitrate (e.g. "1000k")
    pub video_bitrate: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate (e.g. "128k")
    pub audio_bitrate: String,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    pub format: OutputFormat,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::for_options(&RenderOptions::default())
    }
}

impl EncodingConfig {
    /// Encoder settings implied by a clip's render options.
    pub fn for_options(options: &RenderOptions) -> Self {
        let preset = options.quality.preset();
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            video_bitrate: preset.video_bitrate.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: preset.audio_bitrate.to_string(),
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            format: options.format,
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-b:v".to_string(),
            self.video_bitrate.clone(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ];

        if self.format.supports_faststart() {
            args.extend_from_slice(&["-movflags".to_string(), "+faststart".to_string()]);
        }

        args.extend_from_slice(&["-f".to_string(), self.format.muxer().to_string()]);

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Quality;

    #[test]
    fn test_for_options_uses_preset_bitrates() {
        let options = RenderOptions::default().with_quality(Quality::Low);
        let config = EncodingConfig::for_options(&options);
        assert_eq!(config.video_bitrate, "500k");
        assert_eq!(config.audio_bitrate, "64k");
        assert_eq!(config.codec, "libx264");
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = EncodingConfig::default().to_ffmpeg_args();
        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 1000k"));
        assert!(joined.contains("-pix_fmt yuv420p"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(joined.ends_with("-f mp4"));
    }

    #[test]
    fn test_avi_skips_faststart() {
        let options = RenderOptions {
            format: OutputFormat::Avi,
            ..Default::default()
        };
        let args = EncodingConfig::for_options(&options).to_ffmpeg_args();
        assert!(!args.contains(&"-movflags".to_string()));
        assert!(args.ends_with(&["-f".to_string(), "avi".to_string()]));
    }
}
