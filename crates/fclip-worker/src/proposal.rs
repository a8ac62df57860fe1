//! Parsing of upstream clip proposals.
//!
//! Proposal generators (usually an LLM) emit clip definitions in a few
//! loosely specified JSON shapes, sometimes wrapped in a markdown code
//! fence. This module normalizes them into [`ClipRenderRequest`]s.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use fclip_models::{
    BatchRenderRequest, ClipRenderRequest, Owner, RenderOptions, SegmentPurpose, SegmentSpec,
    SourceRef,
};

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("proposal is empty")]
    Empty,

    #[error("unrecognized proposal shape: {0}")]
    UnrecognizedShape(String),
}

/// One proposed segment. Accepts camelCase and short field names.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposedSegment {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(alias = "startTime", alias = "start")]
    pub start_time: String,
    #[serde(alias = "endTime", alias = "end")]
    pub end_time: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default, alias = "sequenceOrder", alias = "order")]
    pub sequence_order: Option<u32>,
}

/// One proposed clip.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposedClip {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub segments: Vec<ProposedSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProposalShape {
    Wrapped { clips: Vec<ProposedClip> },
    List(Vec<ProposedClip>),
    Single(ProposedClip),
}

impl ProposalShape {
    fn name(&self) -> &'static str {
        match self {
            ProposalShape::Wrapped { .. } => "wrapped",
            ProposalShape::List(_) => "list",
            ProposalShape::Single(_) => "single",
        }
    }

    fn into_clips(self) -> Vec<ProposedClip> {
        match self {
            ProposalShape::Wrapped { clips } | ProposalShape::List(clips) => clips,
            ProposalShape::Single(clip) => vec![clip],
        }
    }
}

impl ProposedClip {
    /// Convert into a render request with the given id and options.
    ///
    /// Unknown purposes are dropped so that the default hook/build/payoff
    /// assignment applies; sequence order defaults to position.
    pub fn into_request(self, id: impl Into<String>, options: RenderOptions) -> ClipRenderRequest {
        let id = id.into();
        let segments = self
            .segments
            .into_iter()
            .enumerate()
            .map(|(i, seg)| {
                let purpose = seg.purpose.as_deref().and_then(|p| match p.parse::<SegmentPurpose>() {
                    Ok(purpose) => Some(purpose),
                    Err(e) => {
                        warn!(clip_id = %id, segment = i, "Ignoring segment purpose: {}", e);
                        None
                    }
                });
                SegmentSpec {
                    label: seg.label.unwrap_or_else(|| format!("segment-{}", i + 1)),
                    start_time: seg.start_time,
                    end_time: seg.end_time,
                    purpose,
                    sequence_order: seg.sequence_order.unwrap_or(i as u32),
                }
            })
            .collect();

        ClipRenderRequest {
            id,
            title: self.title,
            segments,
            options,
        }
    }
}

/// Parse proposal text, tolerating a surrounding ```json fence.
pub fn parse_proposal(text: &str) -> Result<Vec<ProposedClip>, ProposalError> {
    let text = strip_code_fence(text);
    if text.is_empty() {
        return Err(ProposalError::Empty);
    }

    let shape: ProposalShape =
        serde_json::from_str(text).map_err(|e| ProposalError::UnrecognizedShape(e.to_string()))?;
    debug!(shape = shape.name(), "Parsed clip proposal");

    let clips = shape.into_clips();
    if clips.is_empty() {
        return Err(ProposalError::Empty);
    }
    Ok(clips)
}

/// Build a batch request from proposal text.
///
/// Clip ids are `{prefix}-{n}`, numbered from 1 in proposal order.
pub fn proposal_to_batch(
    text: &str,
    source: SourceRef,
    owner: Owner,
    options: RenderOptions,
    id_prefix: &str,
) -> Result<BatchRenderRequest, ProposalError> {
    let requests = parse_proposal(text)?
        .into_iter()
        .enumerate()
        .map(|(i, clip)| clip.into_request(format!("{}-{}", id_prefix, i + 1), options.clone()))
        .collect();
    Ok(BatchRenderRequest::new(source, owner, requests))
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}
