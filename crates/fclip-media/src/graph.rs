//! Filter graph construction for multi-segment clips.
//!
//! Every segment is trimmed from the single source input (`0`) on both its
//! video and audio streams, rebased to zero, and normalized to a common
//! frame size, pixel aspect, frame rate and sample format. The normalized
//! pairs are then joined either by one `concat` filter or by a left-to-right
//! chain of `xfade`/`acrossfade`, and optionally faded in and out.
//!
//! Crossfade seams are clamped: a seam between segments `a` and `b` lasts
//! `min(requested, min(dur(a), dur(b)) / 2)` so no segment is consumed by
//! the transitions on both of its sides.
//!
//! Sources without an audio stream get generated silence per segment so the
//! join filters always see matching audio and video pads.

use std::collections::HashSet;
use std::fmt::Write as _;

use fclip_models::{RenderOptions, ValidatedSegment};

use crate::error::{MediaError, MediaResult};

/// Longest fade-in/fade-out applied at the clip edges.
pub const MAX_EDGE_FADE_SECS: f64 = 1.0;

/// Audio is resampled to this rate before joining.
const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Filters that generate a stream and take no input pads.
const SOURCE_FILTERS: &[&str] = &["anullsrc"];

/// Where each segment's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioInput {
    /// The source's first audio stream
    #[default]
    Source,
    /// Generated silence, for video-only sources
    Silence,
}

/// How the segments are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Single segment, nothing to join
    Single,
    /// Hard cuts via one `concat` filter
    Concat,
    /// Pairwise `xfade` / `acrossfade`
    Crossfade,
}

/// One crossfade transition between adjacent segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seam {
    /// Offset into the accumulated output where the transition starts
    pub offset_secs: f64,
    /// Effective transition length after clamping
    pub duration_secs: f64,
}

/// A `-filter_complex` graph plus the labels to map into the output.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    chains: Vec<String>,
    video_out: String,
    audio_out: String,
    input_count: usize,
    segment_count: usize,
    join_mode: JoinMode,
    seams: Vec<Seam>,
    expected_duration_secs: f64,
}

impl FilterGraph {
    /// The graph as passed to `-filter_complex`.
    pub fn to_filter_complex(&self) -> String {
        self.chains.join(";")
    }

    pub fn chains(&self) -> &[String] {
        &self.chains
    }

    /// Video output label in `-map` form, e.g. `[vout]`.
    pub fn video_map(&self) -> String {
        format!("[{}]", self.video_out)
    }

    /// Audio output label in `-map` form.
    pub fn audio_map(&self) -> String {
        format!("[{}]", self.audio_out)
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn join_mode(&self) -> JoinMode {
        self.join_mode
    }

    pub fn seams(&self) -> &[Seam] {
        &self.seams
    }

    /// Duration the rendered clip should have, in seconds.
    pub fn expected_duration_secs(&self) -> f64 {
        self.expected_duration_secs
    }

    /// Number of filter instances with the given name (e.g. `concat`).
    pub fn count_filter(&self, name: &str) -> usize {
        self.chains
            .iter()
            .flat_map(|chain| split_labels(chain).1.split(','))
            .filter(|filter| filter.split('=').next() == Some(name))
            .count()
    }

    /// Check label wiring.
    ///
    /// Every label is defined once and consumed at most once, every input
    /// pad refers to an existing input index or an earlier output, and both
    /// final outputs are defined and left unconsumed.
    pub fn validate(&self) -> MediaResult<()> {
        let mut defined: HashSet<&str> = HashSet::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for chain in &self.chains {
            let (inputs, body, outputs) = split_labels(chain);

            if body.trim().is_empty() {
                return Err(MediaError::invalid_graph(format!("empty filter chain: {}", chain)));
            }
            if inputs.is_empty() && !is_source_filter(body) {
                return Err(MediaError::invalid_graph(format!("chain has no inputs: {}", chain)));
            }

            for input in inputs {
                if let Some(index) = stream_input_index(input) {
                    if index >= self.input_count {
                        return Err(MediaError::invalid_graph(format!(
                            "input index {} out of range (graph declares {} input(s))",
                            index, self.input_count
                        )));
                    }
                    continue;
                }
                if !defined.contains(input) {
                    return Err(MediaError::invalid_graph(format!(
                        "label [{}] used before it is defined",
                        input
                    )));
                }
                if !consumed.insert(input) {
                    return Err(MediaError::invalid_graph(format!(
                        "label [{}] consumed more than once",
                        input
                    )));
                }
            }

            for output in outputs {
                if !defined.insert(output) {
                    return Err(MediaError::invalid_graph(format!(
                        "label [{}] defined more than once",
                        output
                    )));
                }
            }
        }

        for out in [self.video_out.as_str(), self.audio_out.as_str()] {
            if !defined.contains(out) || consumed.contains(out) {
                return Err(MediaError::invalid_graph(format!(
                    "output label [{}] is not a final stream",
                    out
                )));
            }
        }

        Ok(())
    }
}

/// Build the assembly graph for already-filtered segments, taking audio
/// from the source.
pub fn build(segments: &[ValidatedSegment], options: &RenderOptions) -> MediaResult<FilterGraph> {
    build_with_audio(segments, options, AudioInput::Source)
}

/// Build the assembly graph with an explicit audio input.
pub fn build_with_audio(
    segments: &[ValidatedSegment],
    options: &RenderOptions,
    audio: AudioInput,
) -> MediaResult<FilterGraph> {
    if segments.is_empty() {
        return Err(MediaError::invalid_graph("no segments to assemble"));
    }
    if let Some(bad) = segments.iter().find(|s| s.duration_secs() <= 0.0) {
        return Err(MediaError::invalid_graph(format!(
            "segment '{}' has non-positive duration",
            bad.label
        )));
    }
    let crossfade = options.crossfade && segments.len() > 1;
    if crossfade && !(options.crossfade_duration.is_finite() && options.crossfade_duration > 0.0) {
        return Err(MediaError::invalid_graph(format!(
            "crossfade duration must be positive, got {}",
            options.crossfade_duration
        )));
    }

    let (width, height) = options.output_size();
    let mut chains = Vec::with_capacity(segments.len() * 2 + 3);

    for (i, segment) in segments.iter().enumerate() {
        chains.push(segment_video_chain(i, segment, width, height, options.fps));
        chains.push(match audio {
            AudioInput::Source => segment_audio_chain(i, segment),
            AudioInput::Silence => silent_audio_chain(i, segment),
        });
    }

    let durations: Vec<f64> = segments.iter().map(ValidatedSegment::duration_secs).collect();

    let (mut video_out, mut audio_out, join_mode, seams, total) = if segments.len() == 1 {
        ("v0".to_string(), "a0".to_string(), JoinMode::Single, Vec::new(), durations[0])
    } else if crossfade {
        let (v, a, seams, total) =
            push_crossfade_chains(&mut chains, &durations, options.crossfade_duration);
        (v, a, JoinMode::Crossfade, seams, total)
    } else {
        push_concat_chain(&mut chains, segments.len());
        (
            "vcat".to_string(),
            "acat".to_string(),
            JoinMode::Concat,
            Vec::new(),
            durations.iter().sum(),
        )
    };

    if options.include_fades {
        let fade = edge_fade_secs(total);
        let fade_out_start = (total - fade).max(0.0);
        chains.push(format!(
            "[{}]fade=t=in:st=0:d={:.3},fade=t=out:st={:.3}:d={:.3}[vout]",
            video_out, fade, fade_out_start, fade
        ));
        chains.push(format!(
            "[{}]afade=t=in:st=0:d={:.3},afade=t=out:st={:.3}:d={:.3}[aout]",
            audio_out, fade, fade_out_start, fade
        ));
        video_out = "vout".to_string();
        audio_out = "aout".to_string();
    }

    let graph = FilterGraph {
        chains,
        video_out,
        audio_out,
        input_count: 1,
        segment_count: segments.len(),
        join_mode,
        seams,
        expected_duration_secs: total,
    };
    graph.validate()?;
    Ok(graph)
}

/// Fade length at each clip edge: `min(1s, total / 4)`.
pub fn edge_fade_secs(total_secs: f64) -> f64 {
    (total_secs / 4.0).clamp(0.0, MAX_EDGE_FADE_SECS)
}

fn segment_video_chain(
    i: usize,
    segment: &ValidatedSegment,
    width: u32,
    height: u32,
    fps: u32,
) -> String {
    let mut chain = format!(
        "[0:v]trim=start={:.3}:end={:.3},setpts=PTS-STARTPTS",
        segment.start_secs(),
        segment.end_secs()
    );
    let _ = write!(
        chain,
        ",scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p[v{i}]",
        w = width,
        h = height,
        fps = fps,
        i = i
    );
    chain
}

fn segment_audio_chain(i: usize, segment: &ValidatedSegment) -> String {
    format!(
        "[0:a]atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS,aresample={rate},aformat=sample_fmts=fltp:sample_rates={rate}:channel_layouts=stereo[a{i}]",
        segment.start_secs(),
        segment.end_secs(),
        rate = AUDIO_SAMPLE_RATE,
        i = i
    )
}

fn silent_audio_chain(i: usize, segment: &ValidatedSegment) -> String {
    format!(
        "anullsrc=channel_layout=stereo:sample_rate={rate},atrim=duration={:.3},asetpts=PTS-STARTPTS,aformat=sample_fmts=fltp:sample_rates={rate}:channel_layouts=stereo[a{i}]",
        segment.duration_secs(),
        rate = AUDIO_SAMPLE_RATE,
        i = i
    )
}

fn push_concat_chain(chains: &mut Vec<String>, n: usize) {
    let mut pads = String::new();
    for i in 0..n {
        let _ = write!(pads, "[v{i}][a{i}]", i = i);
    }
    chains.push(format!("{}concat=n={}:v=1:a=1[vcat][acat]", pads, n));
}

/// Append the xfade/acrossfade chain; returns the final labels, seams and total.
fn push_crossfade_chains(
    chains: &mut Vec<String>,
    durations: &[f64],
    requested: f64,
) -> (String, String, Vec<Seam>, f64) {
    let mut video = "v0".to_string();
    let mut audio = "a0".to_string();
    let mut accumulated = durations[0];
    let mut seams = Vec::with_capacity(durations.len() - 1);

    for i in 1..durations.len() {
        let d = requested.min(durations[i - 1].min(durations[i]) / 2.0);
        let offset = (accumulated - d).max(0.0);

        let next_video = format!("vx{}", i);
        let next_audio = format!("ax{}", i);
        chains.push(format!(
            "[{}][v{}]xfade=transition=fade:duration={:.3}:offset={:.3}[{}]",
            video, i, d, offset, next_video
        ));
        chains.push(format!(
            "[{}][a{}]acrossfade=d={:.3}:c1=tri:c2=tri[{}]",
            audio, i, d, next_audio
        ));

        seams.push(Seam {
            offset_secs: offset,
            duration_secs: d,
        });
        accumulated += durations[i] - d;
        video = next_video;
        audio = next_audio;
    }

    (video, audio, seams, accumulated)
}

/// Split `[in][in2]body[out]` into its input labels, body and output labels.
fn split_labels(chain: &str) -> (Vec<&str>, &str, Vec<&str>) {
    let mut rest = chain.trim();

    let mut inputs = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(end) = stripped.find(']') else { break };
        inputs.push(&stripped[..end]);
        rest = &stripped[end + 1..];
    }

    let mut outputs = Vec::new();
    while let Some(stripped) = rest.strip_suffix(']') {
        let Some(start) = stripped.rfind('[') else { break };
        outputs.push(&stripped[start + 1..]);
        rest = &stripped[..start];
    }
    outputs.reverse();

    (inputs, rest, outputs)
}

fn is_source_filter(body: &str) -> bool {
    let first = body.trim().split(',').next().unwrap_or_default();
    let name = first.split('=').next().unwrap_or_default();
    SOURCE_FILTERS.contains(&name)
}

/// `0:v` / `1:a` style references to an input file's streams.
fn stream_input_index(label: &str) -> Option<usize> {
    let (index, _) = label.split_once(':')?;
    index.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fclip_models::{filter_segments, SegmentSpec};
    use std::collections::HashMap;

    fn label_definitions(graph: &FilterGraph) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for chain in graph.chains() {
            for output in split_labels(chain).2 {
                *counts.entry(output).or_insert(0) += 1;
            }
        }
        counts
    }

    fn segments(ranges: &[(&str, &str)]) -> Vec<ValidatedSegment> {
        let specs: Vec<_> = ranges
            .iter()
            .enumerate()
            .map(|(i, (s, e))| SegmentSpec::new(format!("s{}", i), *s, *e))
            .collect();
        let outcome = filter_segments(&specs, 60.0);
        assert!(outcome.dropped.is_empty());
        outcome.kept
    }

    #[test]
    fn test_single_segment_has_no_join() {
        let segs = segments(&[("00:00:10,000", "00:00:15,000")]);
        let graph = build(&segs, &RenderOptions::default()).unwrap();

        assert_eq!(graph.join_mode(), JoinMode::Single);
        assert_eq!(graph.count_filter("concat"), 0);
        assert_eq!(graph.count_filter("xfade"), 0);
        assert_eq!(graph.video_map(), "[v0]");
        assert_eq!(graph.audio_map(), "[a0]");
        assert!((graph.expected_duration_secs() - 5.0).abs() < 1e-9);
        assert!(graph.chains()[0].starts_with("[0:v]trim=start=10.000:end=15.000,setpts=PTS-STARTPTS"));
    }

    #[test]
    fn test_concat_three_segments() {
        let segs = segments(&[
            ("00:00:00,000", "00:00:20,000"),
            ("00:01:00,000", "00:01:20,000"),
            ("00:02:00,000", "00:02:20,000"),
        ]);
        let graph = build(&segs, &RenderOptions::default()).unwrap();

        assert_eq!(graph.join_mode(), JoinMode::Concat);
        assert_eq!(graph.count_filter("concat"), 1);
        assert!(graph
            .to_filter_complex()
            .contains("[v0][a0][v1][a1][v2][a2]concat=n=3:v=1:a=1[vcat][acat]"));
        assert!((graph.expected_duration_secs() - 60.0).abs() < 0.05);
        assert!(graph.seams().is_empty());
    }

    #[test]
    fn test_concat_duration_is_additive() {
        let segs = segments(&[
            ("00:00:01,250", "00:00:04,000"),
            ("00:00:10,000", "00:00:10,500"),
            ("00:05:00,000", "00:05:33,333"),
        ]);
        let graph = build(&segs, &RenderOptions::default()).unwrap();
        let sum: f64 = segs.iter().map(ValidatedSegment::duration_secs).sum();
        assert!((graph.expected_duration_secs() - sum).abs() < 0.05);
    }

    #[test]
    fn test_crossfade_offset_law() {
        let segs = segments(&[
            ("00:00:00,000", "00:00:10,000"),
            ("00:00:30,000", "00:00:40,000"),
        ]);
        let options = RenderOptions::default().with_crossfade(0.3);
        let graph = build(&segs, &options).unwrap();

        assert_eq!(graph.join_mode(), JoinMode::Crossfade);
        assert_eq!(graph.seams().len(), 1);
        assert!((graph.seams()[0].offset_secs - 9.7).abs() < 1e-9);
        assert!((graph.expected_duration_secs() - 19.7).abs() < 0.05);
        assert!(graph
            .to_filter_complex()
            .contains("[v0][v1]xfade=transition=fade:duration=0.300:offset=9.700[vx1]"));
        assert!(graph.to_filter_complex().contains("acrossfade=d=0.300"));
        assert_eq!(graph.count_filter("concat"), 0);
    }

    #[test]
    fn test_crossfade_offsets_accumulate() {
        let segs = segments(&[
            ("00:00:00,000", "00:00:10,000"),
            ("00:00:20,000", "00:00:25,000"),
            ("00:00:40,000", "00:00:48,000"),
        ]);
        let options = RenderOptions::default().with_crossfade(0.5);
        let graph = build(&segs, &options).unwrap();

        let offsets: Vec<f64> = graph.seams().iter().map(|s| s.offset_secs).collect();
        assert!((offsets[0] - 9.5).abs() < 1e-9);
        // accumulated = 10 + 5 - 0.5 = 14.5
        assert!((offsets[1] - 14.0).abs() < 1e-9);
        assert!((graph.expected_duration_secs() - 22.0).abs() < 1e-9);
        assert_eq!(graph.video_map(), "[vx2]");
    }

    #[test]
    fn test_crossfade_clamped_to_half_shorter_segment() {
        let segs = segments(&[
            ("00:00:00,000", "00:00:00,400"),
            ("00:00:10,000", "00:00:20,000"),
        ]);
        let options = RenderOptions::default().with_crossfade(2.0);
        let graph = build(&segs, &options).unwrap();

        let seam = graph.seams()[0];
        assert!((seam.duration_secs - 0.2).abs() < 1e-9);
        assert!((seam.offset_secs - 0.2).abs() < 1e-9);
        assert!(seam.offset_secs >= 0.0);
        assert!((graph.expected_duration_secs() - 10.2).abs() < 1e-9);
    }

    #[test]
    fn test_crossfade_rejects_non_positive_duration() {
        let segs = segments(&[
            ("00:00:00,000", "00:00:05,000"),
            ("00:00:10,000", "00:00:15,000"),
        ]);
        let options = RenderOptions::default().with_crossfade(0.0);
        assert!(matches!(build(&segs, &options), Err(MediaError::InvalidGraph(_))));
    }

    #[test]
    fn test_single_segment_ignores_crossfade() {
        let segs = segments(&[("00:00:00,000", "00:00:05,000")]);
        let options = RenderOptions::default().with_crossfade(0.0);
        let graph = build(&segs, &options).unwrap();
        assert_eq!(graph.join_mode(), JoinMode::Single);
    }

    #[test]
    fn test_fades_at_edges() {
        let segs = segments(&[
            ("00:00:00,000", "00:00:01,000"),
            ("00:00:05,000", "00:00:06,000"),
        ]);
        let options = RenderOptions::default().with_fades();
        let graph = build(&segs, &options).unwrap();

        // total 2s -> fade 0.5s
        let filter = graph.to_filter_complex();
        assert!(filter.contains("[vcat]fade=t=in:st=0:d=0.500,fade=t=out:st=1.500:d=0.500[vout]"));
        assert!(filter.contains("[acat]afade=t=in:st=0:d=0.500"));
        assert_eq!(graph.video_map(), "[vout]");
        assert_eq!(graph.audio_map(), "[aout]");
    }

    #[test]
    fn test_edge_fade_caps_at_one_second() {
        assert!((edge_fade_secs(60.0) - 1.0).abs() < 1e-9);
        assert!((edge_fade_secs(2.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_normalization_uses_output_size() {
        let segs = segments(&[("00:00:00,000", "00:00:05,000")]);
        let graph = build(&segs, &RenderOptions::default()).unwrap();
        let video = &graph.chains()[0];
        assert!(video.contains("scale=1280:720:force_original_aspect_ratio=decrease"));
        assert!(video.contains("pad=1280:720:(ow-iw)/2:(oh-ih)/2"));
        assert!(video.contains("setsar=1"));
        assert!(video.contains("fps=30"));
    }

    #[test]
    fn test_labels_unique_and_inputs_in_range() {
        let segs = segments(&[
            ("00:00:00,000", "00:00:03,000"),
            ("00:00:03,000", "00:00:06,000"),
            ("00:00:09,000", "00:00:12,000"),
            ("00:00:20,000", "00:00:24,000"),
        ]);
        for options in [
            RenderOptions::default(),
            RenderOptions::default().with_crossfade(0.5).with_fades(),
        ] {
            let graph = build(&segs, &options).unwrap();
            assert!(label_definitions(&graph).values().all(|&n| n == 1));
            for chain in graph.chains() {
                for input in split_labels(chain).0 {
                    if let Some(index) = stream_input_index(input) {
                        assert!(index < graph.input_count());
                    }
                }
            }
        }
    }

    #[test]
    fn test_validate_rejects_bad_wiring() {
        let graph = FilterGraph {
            chains: vec![
                "[1:v]null[v0]".to_string(),
                "[0:a]anull[a0]".to_string(),
            ],
            video_out: "v0".to_string(),
            audio_out: "a0".to_string(),
            input_count: 1,
            segment_count: 1,
            join_mode: JoinMode::Single,
            seams: Vec::new(),
            expected_duration_secs: 1.0,
        };
        assert!(graph.validate().is_err());

        let duplicate = FilterGraph {
            chains: vec!["[0:v]null[v0]".to_string(), "[0:a]anull[v0]".to_string()],
            ..graph.clone()
        };
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn test_silent_audio_for_video_only_source() {
        let segs = segments(&[
            ("00:00:00,000", "00:00:02,000"),
            ("00:00:05,000", "00:00:08,500"),
        ]);
        let options = RenderOptions::default().with_crossfade(0.5);
        let graph = build_with_audio(&segs, &options, AudioInput::Silence).unwrap();

        assert!(graph.chains().iter().all(|c| !c.contains("[0:a]")));
        assert!(graph.chains()[1].starts_with("anullsrc="));
        assert!(graph.chains()[1].contains("atrim=duration=2.000"));
        assert!(graph.chains()[3].contains("atrim=duration=3.500"));
        assert!(graph.chains().iter().any(|c| c.contains("acrossfade")));
        graph.validate().unwrap();
    }

    #[test]
    fn test_validate_still_rejects_inputless_non_source_chain() {
        let graph = FilterGraph {
            chains: vec![
                "[0:v]null[v0]".to_string(),
                "anull[a0]".to_string(),
            ],
            video_out: "v0".to_string(),
            audio_out: "a0".to_string(),
            input_count: 1,
            segment_count: 1,
            join_mode: JoinMode::Single,
            seams: Vec::new(),
            expected_duration_secs: 1.0,
        };
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_empty_segments_rejected() {
        assert!(build(&[], &RenderOptions::default()).is_err());
    }

    #[test]
    fn test_split_labels() {
        let (inputs, body, outputs) = split_labels("[v0][v1]xfade=duration=1:offset=2[vx1]");
        assert_eq!(inputs, ["v0", "v1"]);
        assert_eq!(body, "xfade=duration=1:offset=2");
        assert_eq!(outputs, ["vx1"]);
    }
}
