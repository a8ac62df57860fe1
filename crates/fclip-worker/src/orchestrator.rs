//! Batch render orchestration.
//!
//! A batch acquires its source once, then walks the clip requests in order.
//! Every request is attempted exactly once and produces exactly one
//! [`ClipRenderResult`]; a failing clip never stops its siblings. Only a
//! failed source acquisition is fatal, and then every request is failed
//! with the same error.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;
use validator::Validate;

use fclip_media::fs_utils::unique_output_path;
use fclip_media::graph::{self, AudioInput};
use fclip_media::{ClipRenderer, ProgressSender, RenderJob, RenderProgress};
use fclip_models::{
    filter_segments, BatchRenderRequest, BatchRenderResult, ClipRenderRequest, ClipRenderResult,
    EncodingConfig, FilterOutcome, Owner, RenderStage,
};
use fclip_storage::{clip_key, ArtifactPublisher, BlobStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::BatchLogger;
use crate::metrics;
use crate::source::{AcquiredSource, SourceAcquirer};

/// Runs batches against a renderer and a blob store.
#[derive(Clone)]
pub struct BatchOrchestrator {
    config: WorkerConfig,
    renderer: Arc<dyn ClipRenderer>,
    store: Arc<dyn BlobStore>,
    publisher: ArtifactPublisher,
    progress_tx: Option<mpsc::Sender<RenderProgress>>,
}

impl BatchOrchestrator {
    pub fn new(config: WorkerConfig, renderer: Arc<dyn ClipRenderer>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            config,
            renderer,
            publisher: ArtifactPublisher::new(store.clone()),
            store,
            progress_tx: None,
        }
    }

    /// Forward per-clip render progress to `tx`. Events are dropped when the
    /// channel is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<RenderProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Run a batch to completion.
    pub async fn run(&self, request: BatchRenderRequest) -> BatchRenderResult {
        let (_tx, rx) = watch::channel(false);
        self.run_with_cancel(request, rx).await
    }

    /// Run a batch, stopping early once `cancel` turns true.
    ///
    /// The in-flight render is killed; clips that already finished keep
    /// their results and clips not yet attempted are failed as cancelled.
    pub async fn run_with_cancel(
        &self,
        request: BatchRenderRequest,
        cancel: watch::Receiver<bool>,
    ) -> BatchRenderResult {
        let logger = BatchLogger::new(&request.batch_id, request.clip_requests.len());
        let span = logger.create_span();
        self.run_batch(request, cancel, logger).instrument(span).await
    }

    async fn run_batch(
        &self,
        request: BatchRenderRequest,
        cancel: watch::Receiver<bool>,
        logger: BatchLogger,
    ) -> BatchRenderResult {
        let started_at = Utc::now();
        let started = Instant::now();
        logger.log_start(&request.source.to_string());

        let results = match self.acquire(&request, &cancel).await {
            Ok(source) => {
                let audio = self.audio_input(&source.path, &logger).await;
                let results = self
                    .render_all(&request, &source.path, audio, &cancel, &logger)
                    .await;
                source.cleanup().await;
                results
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                let stage = e.stage();
                let message = e.to_string();
                request
                    .clip_requests
                    .iter()
                    .map(|clip| {
                        let result = ClipRenderResult::failed(&clip.id, stage, message.clone());
                        metrics::record_clip(&result, 0.0);
                        result
                    })
                    .collect()
            }
        };

        let result = BatchRenderResult::from_results(&request.batch_id, results, started_at);
        metrics::record_batch(result.success_count, result.failure_count);
        logger.log_completion(
            result.success_count,
            result.failure_count,
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn acquire(
        &self,
        request: &BatchRenderRequest,
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<AcquiredSource> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| WorkerError::acquisition(format!("Cannot create work directory: {}", e)))?;

        let acquirer = SourceAcquirer::new(
            self.store.clone(),
            &self.config.work_dir,
            self.config.download_timeout,
            self.config.signed_url_ttl,
        )?;
        acquirer.acquire(&request.source, cancel).await
    }

    /// Inspect the source once per batch. An unreadable source is assumed to
    /// have audio; the render then reports the real problem.
    async fn audio_input(&self, source: &Path, logger: &BatchLogger) -> AudioInput {
        match self.renderer.has_audio(source).await {
            Ok(true) => AudioInput::Source,
            Ok(false) => {
                logger.log_warning("Source has no audio stream, clips get a silent track");
                AudioInput::Silence
            }
            Err(e) => {
                logger.log_warning(&format!("Could not inspect source streams: {}", e));
                AudioInput::Source
            }
        }
    }

    async fn render_all(
        &self,
        request: &BatchRenderRequest,
        source: &Path,
        audio: AudioInput,
        cancel: &watch::Receiver<bool>,
        logger: &BatchLogger,
    ) -> Vec<ClipRenderResult> {
        let mut results = Vec::with_capacity(request.clip_requests.len());

        for (index, clip) in request.clip_requests.iter().enumerate() {
            if *cancel.borrow() {
                results.push(ClipRenderResult::failed(
                    &clip.id,
                    RenderStage::Cancelled,
                    "batch cancelled before this clip started",
                ));
                continue;
            }

            logger.log_clip(index, &clip.id, "Rendering clip");
            let started = Instant::now();
            let result = self
                .render_clip(clip, source, audio, &request.owner, cancel, logger)
                .await;
            metrics::record_clip(&result, started.elapsed().as_secs_f64());

            match (&result.error, result.failed_stage) {
                (Some(error), Some(stage)) => {
                    logger.log_warning(&format!("Clip {} failed at {}: {}", clip.id, stage, error))
                }
                _ => logger.log_clip(index, &clip.id, "Clip published"),
            }
            results.push(result);
        }

        results
    }

    /// Filter, build, render and publish one clip. Never fails; errors
    /// become a failed result.
    async fn render_clip(
        &self,
        clip: &ClipRenderRequest,
        source: &Path,
        audio: AudioInput,
        owner: &Owner,
        cancel: &watch::Receiver<bool>,
        logger: &BatchLogger,
    ) -> ClipRenderResult {
        let outcome = filter_segments(&clip.segments, self.config.max_segment_secs);
        for dropped in &outcome.dropped {
            logger.log_dropped(&clip.id, dropped);
        }
        if outcome.is_empty() {
            return ClipRenderResult::degraded(&clip.id, &outcome);
        }

        let assembled = self
            .assemble(clip, &outcome, source, audio, owner, cancel)
            .await;
        match assembled {
            Ok(result) => result,
            Err(e) => ClipRenderResult::failed(&clip.id, e.stage(), e.to_string())
                .with_dropped(outcome.dropped),
        }
    }

    async fn assemble(
        &self,
        clip: &ClipRenderRequest,
        outcome: &FilterOutcome,
        source: &Path,
        audio: AudioInput,
        owner: &Owner,
        cancel: &watch::Receiver<bool>,
    ) -> WorkerResult<ClipRenderResult> {
        let options = &clip.options;
        options
            .validate()
            .map_err(|e| WorkerError::validation(format!("Invalid render options: {}", e)))?;
        let key = clip_key(owner, &clip.id, options.format)
            .map_err(|e| WorkerError::validation(e.to_string()))?;

        let graph = graph::build_with_audio(&outcome.kept, options, audio)?;
        let output = unique_output_path(&self.config.work_dir, &clip.id, options.format.extension());

        let mut job = RenderJob::new(&clip.id, source, output, graph, EncodingConfig::for_options(options))
            .with_cancel(cancel.clone());
        if let Some(tx) = &self.progress_tx {
            job = job.with_progress(ProgressSender::new(tx.clone(), &clip.id));
        }

        let rendered = self.renderer.render(job).await?;
        let artifact = self
            .publisher
            .publish(&rendered.path, &key, options.format.content_type())
            .await?;

        Ok(ClipRenderResult::completed(
            &clip.id,
            artifact,
            rendered.file_size_bytes,
            rendered.duration_seconds,
            outcome.dropped.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fclip_media::{MediaError, MediaResult, RenderOutput};
    use fclip_models::{SegmentSpec, SourceRef};
    use fclip_storage::StorageResult;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes a small file instead of running FFmpeg.
    struct FakeRenderer;

    #[async_trait]
    impl ClipRenderer for FakeRenderer {
        async fn render(&self, job: RenderJob) -> MediaResult<RenderOutput> {
            tokio::fs::write(&job.output, b"rendered").await?;
            Ok(RenderOutput {
                path: job.output,
                file_size_bytes: 8,
                duration_seconds: job.graph.expected_duration_secs(),
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobStore for MemoryStore {
        async fn put(&self, _: &Path, key: &str, _: &str) -> StorageResult<String> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(format!("https://cdn.test/{}", key))
        }

        async fn signed_get(&self, key: &str, _: Duration) -> StorageResult<String> {
            Ok(format!("https://cdn.test/{}", key))
        }
    }

    fn clip(id: &str, ranges: &[(&str, &str)]) -> ClipRenderRequest {
        let segments = ranges
            .iter()
            .enumerate()
            .map(|(i, (s, e))| SegmentSpec::new(format!("s{}", i), *s, *e))
            .collect();
        ClipRenderRequest::new(id, segments)
    }

    async fn setup() -> (TempDir, BatchOrchestrator, Arc<MemoryStore>, SourceRef) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mp4");
        tokio::fs::write(&source, b"source").await.unwrap();
        let store = Arc::new(MemoryStore::default());
        let config = WorkerConfig::default().with_work_dir(dir.path().join("work"));
        let orchestrator = BatchOrchestrator::new(config, Arc::new(FakeRenderer), store.clone());
        (dir, orchestrator, store, SourceRef::Path { path: source })
    }

    #[tokio::test]
    async fn test_each_request_gets_one_result_in_order() {
        let (_dir, orchestrator, store, source) = setup().await;
        let request = BatchRenderRequest::new(
            source,
            Owner::new("u", "p"),
            vec![
                clip("a", &[("00:00:01,000", "00:00:05,000")]),
                clip("b", &[("00:00:10,000", "00:00:08,000")]),
                clip("c", &[("00:00:01,000", "00:00:03,000"), ("00:00:04,000", "00:00:06,000")]),
            ],
        );

        let result = orchestrator.run(request).await;

        assert!(result.is_consistent());
        let ids: Vec<_> = result.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.results[1].failed_stage, Some(RenderStage::Validation));
        assert_eq!(result.results[1].duration_seconds, Some(0.0));
        assert_eq!(result.results[2].duration_seconds, Some(4.0));
        assert_eq!(
            *store.keys.lock().unwrap(),
            vec!["u/p/clips/a.mp4".to_string(), "u/p/clips/c.mp4".to_string()]
        );
    }

    #[tokio::test]
    async fn test_render_failure_does_not_stop_siblings() {
        struct FailFirst(Mutex<bool>);

        #[async_trait]
        impl ClipRenderer for FailFirst {
            async fn render(&self, job: RenderJob) -> MediaResult<RenderOutput> {
                let first = std::mem::replace(&mut *self.0.lock().unwrap(), false);
                if first {
                    return Err(MediaError::ffmpeg_failed("boom", None, Some(1)));
                }
                FakeRenderer.render(job).await
            }
        }

        let (dir, _, store, source) = setup().await;
        let orchestrator = BatchOrchestrator::new(
            WorkerConfig::default().with_work_dir(dir.path().join("work")),
            Arc::new(FailFirst(Mutex::new(true))),
            store,
        );
        let request = BatchRenderRequest::new(
            source,
            Owner::new("u", "p"),
            vec![
                clip("a", &[("00:00:01,000", "00:00:02,000")]),
                clip("b", &[("00:00:01,000", "00:00:02,000")]),
            ],
        );

        let result = orchestrator.run(request).await;
        assert_eq!(result.results[0].failed_stage, Some(RenderStage::Render));
        assert!(result.results[1].is_success());
    }

    #[tokio::test]
    async fn test_missing_source_fails_every_clip_identically() {
        let (dir, orchestrator, store, _) = setup().await;
        let request = BatchRenderRequest::new(
            SourceRef::Path {
                path: dir.path().join("nope.mp4"),
            },
            Owner::new("u", "p"),
            vec![clip("a", &[("00:00:01,000", "00:00:02,000")]), clip("b", &[])],
        );

        let result = orchestrator.run(request).await;
        assert_eq!(result.failure_count, 2);
        assert!(result
            .results
            .iter()
            .all(|r| r.failed_stage == Some(RenderStage::Acquisition)));
        assert_eq!(result.results[0].error, result.results[1].error);
        assert!(store.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_owner_is_a_validation_failure() {
        let (_dir, orchestrator, _, source) = setup().await;
        let request = BatchRenderRequest::new(
            source,
            Owner::new("u/../x", "p"),
            vec![clip("a", &[("00:00:01,000", "00:00:02,000")])],
        );

        let result = orchestrator.run(request).await;
        assert_eq!(result.results[0].failed_stage, Some(RenderStage::Validation));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    /// Route this thread's events into a buffer until the guard drops.
    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn test_dropped_segments_are_logged_with_reason() {
        let (logs, _guard) = capture_logs();

        let (_dir, orchestrator, _, source) = setup().await;
        let request = BatchRenderRequest::new(
            source,
            Owner::new("u", "p"),
            vec![clip(
                "a",
                &[("00:00:00,000", "00:01:35,000"), ("00:00:05,000", "00:00:06,000")],
            )],
        );
        let result = orchestrator.run(request).await;
        assert!(result.results[0].is_success());

        let text = logs.text();
        let line = text
            .lines()
            .find(|l| l.contains("Dropped segment"))
            .expect("dropped segment should be logged");
        assert!(line.contains("WARN"));
        assert!(line.contains("clip_id=a"));
        assert!(line.contains("label=s0"));
        assert!(line.contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn test_acquisition_failure_logged_once_prefixed() {
        let (logs, _guard) = capture_logs();
        let (dir, orchestrator, _, _) = setup().await;
        let request = BatchRenderRequest::new(
            SourceRef::Path {
                path: dir.path().join("nope.mp4"),
            },
            Owner::new("u", "p"),
            vec![clip("a", &[("00:00:01,000", "00:00:02,000")])],
        );

        orchestrator.run(request).await;

        let text = logs.text();
        let line = text
            .lines()
            .find(|l| l.contains("Batch error"))
            .expect("acquisition failure should be logged");
        assert_eq!(line.matches("Source acquisition failed").count(), 1);
        assert!(line.contains("nope.mp4"));
    }

    /// Reports a video-only source and records the audio chains it is given.
    #[derive(Default)]
    struct VideoOnlyRenderer {
        chains: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClipRenderer for VideoOnlyRenderer {
        async fn render(&self, job: RenderJob) -> MediaResult<RenderOutput> {
            self.chains
                .lock()
                .unwrap()
                .extend(job.graph.chains().iter().cloned());
            FakeRenderer.render(job).await
        }

        async fn has_audio(&self, _source: &Path) -> MediaResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_video_only_source_gets_silent_audio() {
        let (dir, _, store, source) = setup().await;
        let renderer = Arc::new(VideoOnlyRenderer::default());
        let orchestrator = BatchOrchestrator::new(
            WorkerConfig::default().with_work_dir(dir.path().join("work")),
            renderer.clone(),
            store,
        );
        let request = BatchRenderRequest::new(
            source,
            Owner::new("u", "p"),
            vec![clip(
                "a",
                &[("00:00:01,000", "00:00:03,000"), ("00:00:04,000", "00:00:06,000")],
            )],
        );

        let result = orchestrator.run(request).await;

        assert!(result.all_succeeded());
        let chains = renderer.chains.lock().unwrap();
        assert!(chains.iter().all(|c| !c.contains("[0:a]")));
        assert_eq!(chains.iter().filter(|c| c.starts_with("anullsrc=")).count(), 2);
    }

    #[tokio::test]
    async fn test_uninspectable_source_keeps_source_audio() {
        struct Unreadable;

        #[async_trait]
        impl ClipRenderer for Unreadable {
            async fn render(&self, job: RenderJob) -> MediaResult<RenderOutput> {
                assert!(job.graph.chains().iter().any(|c| c.starts_with("[0:a]")));
                FakeRenderer.render(job).await
            }

            async fn has_audio(&self, _source: &Path) -> MediaResult<bool> {
                Err(MediaError::InvalidVideo("no streams".to_string()))
            }
        }

        let (dir, _, store, source) = setup().await;
        let orchestrator = BatchOrchestrator::new(
            WorkerConfig::default().with_work_dir(dir.path().join("work")),
            Arc::new(Unreadable),
            store,
        );
        let request = BatchRenderRequest::new(
            source,
            Owner::new("u", "p"),
            vec![clip("a", &[("00:00:01,000", "00:00:02,000")])],
        );

        assert!(orchestrator.run(request).await.all_succeeded());
    }

    #[tokio::test]
    async fn test_cancelled_batch_marks_unattempted_clips() {
        let (_dir, orchestrator, store, source) = setup().await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let request = BatchRenderRequest::new(
            source,
            Owner::new("u", "p"),
            vec![clip("a", &[("00:00:01,000", "00:00:02,000")])],
        );
        let result = orchestrator.run_with_cancel(request, rx).await;

        assert_eq!(result.results[0].failed_stage, Some(RenderStage::Cancelled));
        assert!(store.keys.lock().unwrap().is_empty());
    }
}
