//! FFmpeg CLI wrapper for multi-segment clip assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with an explicit binary configuration
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeouts via tokio
//! - Filter graph construction (trim, normalize, concat or crossfade, fades)
//! - A single-clip renderer behind the [`ClipRenderer`] trait
//! - Temporary file cleanup and stale file reaping

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod graph;
pub mod probe;
pub mod progress;
pub mod renderer;

pub use command::{check_ffmpeg, check_ffprobe, wait_for_cancel, FfmpegCommand, FfmpegConfig, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, reap_stale_files, remove_file_best_effort, unique_output_path, ReapReport};
pub use graph::{AudioInput, FilterGraph, JoinMode, Seam};
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressSender, RenderProgress};
pub use renderer::{ClipRenderer, FfmpegRenderer, RenderJob, RenderOutput};
