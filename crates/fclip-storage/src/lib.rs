//! Artifact storage on Cloudflare R2.
//!
//! This crate provides:
//! - The [`BlobStore`] trait the render pipeline publishes through
//! - An R2 implementation (upload, presigned GET)
//! - The clip artifact key layout
//! - [`ArtifactPublisher`], which uploads and cleans up local artifacts

pub mod client;
pub mod error;
pub mod keys;
pub mod publisher;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::clip_key;
pub use publisher::ArtifactPublisher;
pub use store::BlobStore;
