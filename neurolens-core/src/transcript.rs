//! Segment normalizer: stitches timestamped utterances into one transcript
//!
//! Segments come from the transcription capability as
//! `{"start": <float>, "end": <float>, "text": <string>}`. Timing fields are read
//! leniently: a missing, null or non-numeric time becomes `NaN`, and any gap that
//! touches a `NaN` is skipped instead of failing the whole transcript.

use serde::{Deserialize, Deserializer, Serialize};

/// Marker inserted into the stitched text where the speaker paused for long.
pub const PAUSE_MARKER: &str = "...";

/// One timestamped utterance from speech-to-text output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default = "missing_time", deserialize_with = "lenient_seconds")]
    pub start: f64,
    #[serde(default = "missing_time", deserialize_with = "lenient_seconds")]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

fn missing_time() -> f64 {
    f64::NAN
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

/// Silence between two consecutive segments, or `None` when either timestamp is unusable.
pub fn gap_between(prev: &Segment, next: &Segment) -> Option<f64> {
    if !prev.end.is_finite() || !next.start.is_finite() {
        return None;
    }
    Some(next.start - prev.end)
}

/// Stitched transcript text plus its total duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub duration_sec: f64,
}

impl Transcript {
    /// Build from segments, inserting [`PAUSE_MARKER`] wherever the gap exceeds
    /// `pause_threshold_sec`.
    pub fn from_segments(segments: &[Segment], pause_threshold_sec: f64) -> Self {
        Self {
            text: stitch_segments(segments, pause_threshold_sec),
            duration_sec: transcript_duration(segments),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub fn stitch_segments(segments: &[Segment], pause_threshold_sec: f64) -> String {
    let mut iter = segments.iter();
    let first = match iter.next() {
        Some(s) => s,
        None => return String::new(),
    };

    let mut stitched = first.text.trim().to_string();
    let mut prev = first;
    for next in iter {
        match gap_between(prev, next) {
            Some(gap) if gap > pause_threshold_sec => {
                stitched.push(' ');
                stitched.push_str(PAUSE_MARKER);
                stitched.push(' ');
            }
            _ => stitched.push(' '),
        }
        stitched.push_str(next.text.trim());
        prev = next;
    }
    stitched
}

/// End of the last segment; 0 for no segments or an unusable end time.
pub fn transcript_duration(segments: &[Segment]) -> f64 {
    segments
        .last()
        .map(|s| s.end)
        .filter(|end| end.is_finite())
        .unwrap_or(0.0)
}

/// Parse a `{"segments": [...]}` document or a bare segment array.
pub fn segments_from_json(value: &serde_json::Value) -> Vec<Segment> {
    let items = match value {
        serde_json::Value::Array(items) => items.as_slice(),
        serde_json::Value::Object(map) => match map.get("segments") {
            Some(serde_json::Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Segment>(item.clone()) {
            Ok(seg) => Some(seg),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable segment");
                None
            }
        })
        .collect()
}
