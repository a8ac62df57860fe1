//! Segment specifications and the validity filter applied before rendering.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::timestamp::{Timestamp, TimestampError};

/// Default upper bound on a single segment's duration, in seconds.
pub const DEFAULT_MAX_SEGMENT_SECS: f64 = 60.0;

/// Narrative role of a segment within an assembled clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SegmentPurpose {
    /// Opening segment that grabs attention
    Hook,
    /// Middle segments that develop the story
    Build,
    /// Closing segment
    Payoff,
}

impl SegmentPurpose {
    /// Purpose implied by a segment's final position.
    ///
    /// A lone segment is the hook.
    pub fn for_position(index: usize, len: usize) -> Self {
        if index == 0 {
            SegmentPurpose::Hook
        } else if index + 1 == len {
            SegmentPurpose::Payoff
        } else {
            SegmentPurpose::Build
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentPurpose::Hook => "hook",
            SegmentPurpose::Build => "build",
            SegmentPurpose::Payoff => "payoff",
        }
    }
}

impl fmt::Display for SegmentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SegmentPurpose {
    type Err = PurposeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hook" => Ok(SegmentPurpose::Hook),
            "build" | "build_up" | "buildup" => Ok(SegmentPurpose::Build),
            "payoff" | "pay_off" => Ok(SegmentPurpose::Payoff),
            _ => Err(PurposeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown segment purpose: {0}")]
pub struct PurposeParseError(String);

/// A labeled time range within the source video, as proposed upstream.
///
/// Timestamps stay as strings until the filter parses them so that a
/// malformed value drops one segment instead of rejecting the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentSpec {
    pub label: String,
    /// Start time, `HH:MM:SS,mmm`
    pub start_time: String,
    /// End time, `HH:MM:SS,mmm`
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<SegmentPurpose>,
    #[serde(default)]
    pub sequence_order: u32,
}

impl SegmentSpec {
    pub fn new(
        label: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            purpose: None,
            sequence_order: 0,
        }
    }

    pub fn with_purpose(mut self, purpose: SegmentPurpose) -> Self {
        self.purpose = Some(purpose);
        self
    }
}

/// A segment that passed the filter, with parsed bounds and its final
/// position in the clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSegment {
    pub label: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub purpose: SegmentPurpose,
    pub sequence_order: u32,
}

impl ValidatedSegment {
    pub fn start_secs(&self) -> f64 {
        self.start.as_secs_f64()
    }

    pub fn end_secs(&self) -> f64 {
        self.end.as_secs_f64()
    }

    pub fn duration_secs(&self) -> f64 {
        self.end.millis_since(self.start) as f64 / 1000.0
    }

    /// Back to the wire representation, carrying the reassigned order and purpose.
    pub fn to_spec(&self) -> SegmentSpec {
        SegmentSpec {
            label: self.label.clone(),
            start_time: self.start.to_string(),
            end_time: self.end.to_string(),
            purpose: Some(self.purpose),
            sequence_order: self.sequence_order,
        }
    }
}

/// Why the filter dropped a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    #[error("duration {duration_secs:.3}s exceeds maximum {max_secs:.3}s")]
    TooLong { duration_secs: f64, max_secs: f64 },

    #[error("non-positive duration {duration_secs:.3}s (end must be after start)")]
    NonPositive { duration_secs: f64 },

    #[error("malformed timestamp: {message}")]
    Malformed { message: String },
}

impl From<TimestampError> for DropReason {
    fn from(e: TimestampError) -> Self {
        DropReason::Malformed {
            message: e.to_string(),
        }
    }
}

/// A segment removed by the filter, kept for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DroppedSegment {
    pub segment: SegmentSpec,
    pub reason: DropReason,
}

/// Result of [`filter_segments`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub kept: Vec<ValidatedSegment>,
    pub dropped: Vec<DroppedSegment>,
}

impl FilterOutcome {
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    /// Sum of kept durations, before any crossfade overlap.
    pub fn total_duration_secs(&self) -> f64 {
        self.kept.iter().map(ValidatedSegment::duration_secs).sum()
    }

    /// One line per dropped segment, for error messages.
    pub fn drop_summary(&self) -> String {
        self.dropped
            .iter()
            .map(|d| format!("'{}': {}", d.segment.label, d.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Keep segments with `0 < duration <= max_segment_secs`, preserving order.
///
/// Surviving segments get `sequence_order` and `purpose` reassigned from
/// their final position; whatever the input carried for those is ignored.
/// Durations are compared in whole milliseconds so a segment exactly at
/// the bound is kept.
pub fn filter_segments(segments: &[SegmentSpec], max_segment_secs: f64) -> FilterOutcome {
    let max_ms = (max_segment_secs.max(0.0) * 1000.0).round() as i64;
    let mut outcome = FilterOutcome::default();
    let mut survivors = Vec::with_capacity(segments.len());

    for segment in segments {
        match check_segment(segment, max_ms, max_segment_secs) {
            Ok((start, end)) => survivors.push((segment, start, end)),
            Err(reason) => outcome.dropped.push(DroppedSegment {
                segment: segment.clone(),
                reason,
            }),
        }
    }

    let len = survivors.len();
    outcome.kept = survivors
        .into_iter()
        .enumerate()
        .map(|(index, (segment, start, end))| ValidatedSegment {
            label: segment.label.clone(),
            start,
            end,
            purpose: SegmentPurpose::for_position(index, len),
            sequence_order: index as u32,
        })
        .collect();

    outcome
}

fn check_segment(
    segment: &SegmentSpec,
    max_ms: i64,
    max_secs: f64,
) -> Result<(Timestamp, Timestamp), DropReason> {
    let start: Timestamp = segment.start_time.parse()?;
    let end: Timestamp = segment.end_time.parse()?;
    let duration_ms = end.millis_since(start);
    let duration_secs = duration_ms as f64 / 1000.0;

    if duration_ms <= 0 {
        return Err(DropReason::NonPositive { duration_secs });
    }
    if duration_ms > max_ms {
        return Err(DropReason::TooLong {
            duration_secs,
            max_secs,
        });
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(label: &str, start: &str, end: &str) -> SegmentSpec {
        SegmentSpec::new(label, start, end)
    }

    #[test]
    fn test_keeps_order_and_reassigns_positions() {
        let input = vec![
            seg("a", "00:00:10,000", "00:00:20,000").with_purpose(SegmentPurpose::Payoff),
            seg("b", "00:01:00,000", "00:01:05,000"),
            seg("c", "00:00:00,000", "00:00:03,000"),
        ];

        let outcome = filter_segments(&input, DEFAULT_MAX_SEGMENT_SECS);
        assert!(outcome.dropped.is_empty());

        let labels: Vec<_> = outcome.kept.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["a", "b", "c"]);

        let purposes: Vec<_> = outcome.kept.iter().map(|s| s.purpose).collect();
        assert_eq!(
            purposes,
            [SegmentPurpose::Hook, SegmentPurpose::Build, SegmentPurpose::Payoff]
        );
        let orders: Vec<_> = outcome.kept.iter().map(|s| s.sequence_order).collect();
        assert_eq!(orders, [0, 1, 2]);
    }

    #[test]
    fn test_drops_too_long_and_non_positive() {
        let input = vec![
            seg("long", "00:00:00,000", "00:01:35,000"),
            seg("ok", "00:00:00,000", "00:00:05,000"),
            seg("reversed", "00:00:10,000", "00:00:05,000"),
            seg("empty", "00:00:10,000", "00:00:10,000"),
        ];

        let outcome = filter_segments(&input, 60.0);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].label, "ok");
        assert_eq!(outcome.dropped.len(), 3);
        assert!(matches!(outcome.dropped[0].reason, DropReason::TooLong { .. }));
        assert!(matches!(outcome.dropped[1].reason, DropReason::NonPositive { .. }));
        assert!(matches!(outcome.dropped[2].reason, DropReason::NonPositive { .. }));
    }

    #[test]
    fn test_duration_equal_to_max_is_kept() {
        let input = vec![seg("edge", "00:00:00,000", "00:01:00,000")];
        let outcome = filter_segments(&input, 60.0);
        assert_eq!(outcome.kept.len(), 1);

        let input = vec![seg("over", "00:00:00,000", "00:01:00,001")];
        let outcome = filter_segments(&input, 60.0);
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_malformed_timestamp_drops_only_that_segment() {
        let input = vec![
            seg("bad", "0:00:01", "00:00:04,000"),
            seg("good", "00:00:01,000", "00:00:04,000"),
        ];
        let outcome = filter_segments(&input, 60.0);
        assert_eq!(outcome.kept.len(), 1);
        assert!(matches!(outcome.dropped[0].reason, DropReason::Malformed { .. }));
    }

    #[test]
    fn test_single_survivor_is_hook() {
        let input = vec![
            seg("a", "00:00:00,000", "00:02:00,000"),
            seg("b", "00:00:00,000", "00:00:05,000"),
        ];
        let outcome = filter_segments(&input, 60.0);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].purpose, SegmentPurpose::Hook);
        assert_eq!(outcome.kept[0].sequence_order, 0);
    }

    #[test]
    fn test_all_dropped_summary() {
        let input = vec![seg("huge", "00:00:00,000", "00:01:35,000")];
        let outcome = filter_segments(&input, 60.0);
        assert!(outcome.is_empty());
        let summary = outcome.drop_summary();
        assert!(summary.contains("huge"));
        assert!(summary.contains("exceeds maximum"));
    }

    #[test]
    fn test_total_duration() {
        let input = vec![
            seg("a", "00:00:00,000", "00:00:20,000"),
            seg("b", "00:00:30,000", "00:00:50,000"),
            seg("c", "00:01:00,000", "00:01:20,000"),
        ];
        let outcome = filter_segments(&input, 60.0);
        assert!((outcome.total_duration_secs() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_purpose_parsing() {
        assert_eq!("HOOK".parse::<SegmentPurpose>().unwrap(), SegmentPurpose::Hook);
        assert_eq!("build_up".parse::<SegmentPurpose>().unwrap(), SegmentPurpose::Build);
        assert!("climax".parse::<SegmentPurpose>().is_err());
    }

    #[test]
    fn test_drop_reason_serializes_with_kind() {
        let reason = DropReason::NonPositive { duration_secs: -5.0 };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "non_positive");
    }
}
