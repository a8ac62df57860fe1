//! Worker error types.

use fclip_media::MediaError;
use fclip_models::RenderStage;
use fclip_storage::StorageError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Source acquisition failed: {0}")]
    Acquisition(String),

    #[error("Encode failed: {0}")]
    Encode(#[from] MediaError),

    #[error("Publish failed: {0}")]
    Publish(#[from] StorageError),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Pipeline stage to report for a clip that failed with this error.
    pub fn stage(&self) -> RenderStage {
        match self {
            WorkerError::Validation(_) | WorkerError::ConfigError(_) => RenderStage::Validation,
            WorkerError::Acquisition(_) => RenderStage::Acquisition,
            WorkerError::Cancelled | WorkerError::Encode(MediaError::Cancelled) => {
                RenderStage::Cancelled
            }
            WorkerError::Encode(MediaError::InvalidGraph(_)) => RenderStage::GraphBuild,
            WorkerError::Encode(_) | WorkerError::Io(_) => RenderStage::Render,
            WorkerError::Publish(_) => RenderStage::Publish,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.stage() == RenderStage::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(WorkerError::validation("x").stage(), RenderStage::Validation);
        assert_eq!(WorkerError::acquisition("x").stage(), RenderStage::Acquisition);
        assert_eq!(
            WorkerError::from(MediaError::invalid_graph("x")).stage(),
            RenderStage::GraphBuild
        );
        assert_eq!(
            WorkerError::from(MediaError::ffmpeg_failed("x", None, Some(1))).stage(),
            RenderStage::Render
        );
        assert_eq!(
            WorkerError::from(StorageError::upload_failed("x")).stage(),
            RenderStage::Publish
        );
        assert!(WorkerError::from(MediaError::Cancelled).is_cancelled());
        assert!(WorkerError::Cancelled.is_cancelled());
    }
}
