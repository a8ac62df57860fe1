//! Single-clip renderer.
//!
//! Drives one FFmpeg process per clip: one source in, one graph, one
//! output file out. A failed render never leaves a partial file behind.

use async_trait::async_trait;
use metrics::histogram;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use fclip_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegConfig, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_file_best_effort;
use crate::graph::FilterGraph;
use crate::probe::probe_video;
use crate::progress::ProgressSender;

/// Everything needed to render one clip.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub clip_id: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub graph: FilterGraph,
    pub encoding: EncodingConfig,
    pub progress: Option<ProgressSender>,
    pub cancel: Option<watch::Receiver<bool>>,
}

impl RenderJob {
    pub fn new(
        clip_id: impl Into<String>,
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        graph: FilterGraph,
        encoding: EncodingConfig,
    ) -> Self {
        Self {
            clip_id: clip_id.into(),
            source: source.into(),
            output: output.into(),
            graph,
            encoding,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A finished artifact on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub path: PathBuf,
    pub file_size_bytes: u64,
    pub duration_seconds: f64,
}

/// Renders a built graph against a source into a single file.
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    async fn render(&self, job: RenderJob) -> MediaResult<RenderOutput>;

    /// Whether `source` carries an audio stream. Graphs for video-only
    /// sources use generated silence instead of `[0:a]`.
    async fn has_audio(&self, _source: &Path) -> MediaResult<bool> {
        Ok(true)
    }
}

/// [`ClipRenderer`] backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    config: FfmpegConfig,
}

impl FfmpegRenderer {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    async fn run(&self, job: &RenderJob) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(&job.source, &job.output)
            .filter_complex(job.graph.to_filter_complex())
            .map(job.graph.video_map())
            .map(job.graph.audio_map())
            .output_args(job.encoding.to_ffmpeg_args());

        let mut runner = FfmpegRunner::new(&self.config);
        if let Some(cancel) = job.cancel.clone() {
            runner = runner.with_cancel(cancel);
        }

        let total_ms = (job.graph.expected_duration_secs() * 1000.0).round() as i64;
        let progress = job.progress.clone();
        runner
            .run_with_progress(&cmd, move |p| {
                if let Some(sender) = &progress {
                    sender.report(&p, total_ms);
                }
            })
            .await
    }

    /// Size and duration of a finished file; duration falls back to the
    /// graph's expectation when probing fails.
    async fn measure(&self, job: &RenderJob) -> MediaResult<RenderOutput> {
        let metadata = tokio::fs::metadata(&job.output).await?;
        if metadata.len() == 0 {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg produced an empty output file",
                None,
                Some(0),
            ));
        }

        let duration_seconds = match probe_video(&self.config, &job.output).await {
            Ok(info) if info.duration > 0.0 => info.duration,
            Ok(_) => job.graph.expected_duration_secs(),
            Err(e) => {
                warn!(
                    clip_id = %job.clip_id,
                    error = %e,
                    "Failed to probe rendered clip, using expected duration"
                );
                job.graph.expected_duration_secs()
            }
        };

        Ok(RenderOutput {
            path: job.output.clone(),
            file_size_bytes: metadata.len(),
            duration_seconds,
        })
    }
}

#[async_trait]
impl ClipRenderer for FfmpegRenderer {
    async fn render(&self, job: RenderJob) -> MediaResult<RenderOutput> {
        job.graph.validate()?;

        if !job.source.exists() {
            return Err(MediaError::FileNotFound(job.source.clone()));
        }
        if let Some(parent) = job.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let started = Instant::now();
        debug!(
            clip_id = %job.clip_id,
            segments = job.graph.segment_count(),
            expected_duration_sec = job.graph.expected_duration_secs(),
            output = %job.output.display(),
            "Starting render"
        );

        let result = match self.run(&job).await {
            Ok(()) => self.measure(&job).await,
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(output) => {
                histogram!("fclip_ffmpeg_duration_seconds", "outcome" => "success").record(elapsed);
                info!(
                    clip_id = %job.clip_id,
                    size_bytes = output.file_size_bytes,
                    duration_sec = output.duration_seconds,
                    elapsed_sec = elapsed,
                    "Render complete"
                );
                Ok(output)
            }
            Err(e) => {
                histogram!("fclip_ffmpeg_duration_seconds", "outcome" => "failure").record(elapsed);
                remove_file_best_effort(&job.output).await;
                Err(e)
            }
        }
    }

    async fn has_audio(&self, source: &Path) -> MediaResult<bool> {
        let info = probe_video(&self.config, source).await?;
        debug!(source = %source.display(), has_audio = info.has_audio, "Inspected source streams");
        Ok(info.has_audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph;
    use fclip_models::{filter_segments, RenderOptions, SegmentSpec};
    use tempfile::TempDir;

    fn job(dir: &TempDir, source: PathBuf) -> RenderJob {
        let segments = vec![SegmentSpec::new("a", "00:00:00,000", "00:00:01,000")];
        let outcome = filter_segments(&segments, 60.0);
        let options = RenderOptions::default();
        let graph = graph::build(&outcome.kept, &options).unwrap();
        RenderJob::new(
            "clip-1",
            source,
            dir.path().join("out").join("clip-1.mp4"),
            graph,
            EncodingConfig::for_options(&options),
        )
    }

    #[tokio::test]
    async fn test_missing_source_is_rejected() {
        let dir = TempDir::new().unwrap();
        let renderer = FfmpegRenderer::new(FfmpegConfig::new("ffmpeg", "ffprobe"));

        let err = renderer
            .render(job(&dir, dir.path().join("missing.mp4")))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_render_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mp4");
        tokio::fs::write(&source, b"not a video").await.unwrap();

        let renderer = FfmpegRenderer::new(FfmpegConfig::new(
            "/nonexistent/ffmpeg-binary",
            "/nonexistent/ffprobe-binary",
        ));
        let job = job(&dir, source);
        let output = job.output.clone();
        tokio::fs::create_dir_all(output.parent().unwrap()).await.unwrap();
        tokio::fs::write(&output, b"stale partial").await.unwrap();

        let err = renderer.render(job).await.unwrap_err();
        assert!(matches!(err, MediaError::FfmpegNotFound));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_has_audio_on_missing_source_errors() {
        let dir = TempDir::new().unwrap();
        let renderer = FfmpegRenderer::new(FfmpegConfig::new("ffmpeg", "ffprobe"));

        let err = renderer
            .has_audio(&dir.path().join("missing.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_render_video_only_source() {
        let dir = TempDir::new().unwrap();
        let config = FfmpegConfig::from_env().unwrap();
        let source = dir.path().join("silent.mp4");

        let status = tokio::process::Command::new(&config.ffmpeg_path)
            .args([
                "-y", "-v", "error",
                "-f", "lavfi", "-i", "testsrc=size=320x240:rate=30:duration=3",
                "-c:v", "libx264",
            ])
            .arg(&source)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let renderer = FfmpegRenderer::new(config);
        assert!(!renderer.has_audio(&source).await.unwrap());

        let segments = vec![SegmentSpec::new("a", "00:00:00,000", "00:00:01,000")];
        let outcome = filter_segments(&segments, 60.0);
        let options = RenderOptions::default();
        let graph = graph::build_with_audio(&outcome.kept, &options, graph::AudioInput::Silence).unwrap();
        let job = RenderJob::new(
            "clip-1",
            source,
            dir.path().join("out").join("clip-1.mp4"),
            graph,
            EncodingConfig::for_options(&options),
        );
        let output = renderer.render(job).await.unwrap();
        assert!(output.file_size_bytes > 0);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_render_synthetic_source() {
        let dir = TempDir::new().unwrap();
        let config = FfmpegConfig::from_env().unwrap();
        let source = dir.path().join("source.mp4");

        let status = tokio::process::Command::new(&config.ffmpeg_path)
            .args([
                "-y", "-v", "error",
                "-f", "lavfi", "-i", "testsrc=size=320x240:rate=30:duration=3",
                "-f", "lavfi", "-i", "sine=frequency=440:duration=3",
                "-shortest", "-c:v", "libx264", "-c:a", "aac",
            ])
            .arg(&source)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let renderer = FfmpegRenderer::new(config);
        let output = renderer.render(job(&dir, source)).await.unwrap();
        assert!(output.file_size_bytes > 0);
        assert!((output.duration_seconds - 1.0).abs() < 0.2);
    }
}
