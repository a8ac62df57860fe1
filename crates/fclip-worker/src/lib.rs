//! Batch clip assembly worker.
//!
//! This crate provides:
//! - Batch orchestration over one shared source
//! - Source acquisition (local, HTTP, blob store)
//! - Parsing of upstream clip proposals
//! - Structured logging and Prometheus metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod proposal;
pub mod source;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::BatchLogger;
pub use orchestrator::BatchOrchestrator;
pub use proposal::{parse_proposal, proposal_to_batch, ProposalError, ProposedClip, ProposedSegment};
pub use source::{AcquiredSource, SourceAcquirer};
