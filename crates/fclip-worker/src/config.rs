//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use fclip_models::DEFAULT_MAX_SEGMENT_SECS;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for downloaded sources and rendered clips
    pub work_dir: PathBuf,
    /// Segments longer than this are dropped before rendering
    pub max_segment_secs: f64,
    /// Kill an FFmpeg render that runs longer than this
    pub render_timeout: Duration,
    /// Give up on a source download after this long
    pub download_timeout: Duration,
    /// Lifetime of signed URLs issued for stored sources
    pub signed_url_ttl: Duration,
    /// Files in the work directory older than this are reaped
    pub temp_ttl: Duration,
    /// Prometheus exporter listen address (disabled when unset)
    pub metrics_addr: Option<SocketAddr>,
    /// Capacity of the render progress channel
    pub progress_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/fclip"),
            max_segment_secs: DEFAULT_MAX_SEGMENT_SECS,
            render_timeout: Duration::from_secs(1800), // 30 minutes
            download_timeout: Duration::from_secs(600),
            signed_url_ttl: Duration::from_secs(900),
            temp_ttl: Duration::from_secs(86_400), // 1 day
            metrics_addr: None,
            progress_capacity: fclip_media::progress::DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("FCLIP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_segment_secs: env_parse("FCLIP_MAX_SEGMENT_SECS")
                .filter(|secs: &f64| secs.is_finite() && *secs > 0.0)
                .unwrap_or(defaults.max_segment_secs),
            render_timeout: env_parse("FCLIP_RENDER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.render_timeout),
            download_timeout: env_parse("FCLIP_DOWNLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            signed_url_ttl: env_parse("FCLIP_SIGNED_URL_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.signed_url_ttl),
            temp_ttl: env_parse("FCLIP_TEMP_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.temp_ttl),
            metrics_addr: env_parse("FCLIP_METRICS_ADDR"),
            progress_capacity: env_parse("FCLIP_PROGRESS_CAPACITY")
                .unwrap_or(defaults.progress_capacity),
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_max_segment_secs(mut self, secs: f64) -> Self {
        self.max_segment_secs = secs;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
