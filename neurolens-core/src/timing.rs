//! Pause and articulation statistics from marker tokens and segment timing.

use serde::{Deserialize, Serialize};

use crate::lexical::rate;
use crate::text::{count_pause_markers, syllable_count};
use crate::transcript::{gap_between, Segment};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub marker_pauses: usize,
    pub gap_pauses: usize,
    pub pauses: f64,
    pub pause_mean: f64,
    pub pause_var: f64,
    pub speech_articulation_rate: f64,
}

impl TimingStats {
    pub fn compute(text: &str, segments: &[Segment], duration_sec: f64, gap_threshold_sec: f64) -> Self {
        let marker_pauses = count_pause_markers(text);
        let gaps = pause_gaps(segments, gap_threshold_sec);
        let (pause_mean, pause_var) = mean_and_variance(&gaps);

        Self {
            marker_pauses,
            gap_pauses: gaps.len(),
            pauses: (marker_pauses + gaps.len()) as f64,
            pause_mean,
            pause_var,
            speech_articulation_rate: rate(syllable_count(text), duration_sec),
        }
    }
}

/// Inter-segment silences longer than the threshold; unusable pairs are skipped.
pub fn pause_gaps(segments: &[Segment], threshold_sec: f64) -> Vec<f64> {
    segments
        .windows(2)
        .filter_map(|pair| gap_between(&pair[0], &pair[1]))
        .filter(|&gap| gap > threshold_sec)
        .collect()
}

/// Mean and population variance; `(0, 0)` for an empty slice.
pub fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_segments_no_pauses() {
        let t = TimingStats::compute("", &[], 0.0, 0.3);
        assert_eq!(t, TimingStats::default());
    }

    #[test]
    fn test_pauses_sum_markers_and_gaps() {
        let segments = vec![
            Segment::new(0.0, 1.0, "a"),
            Segment::new(1.2, 2.0, "b"),
            Segment::new(3.0, 4.0, "c"),
            Segment::new(6.0, 7.0, "d"),
        ];
        let t = TimingStats::compute("a b ... c <pause> d", &segments, 7.0, 0.3);
        assert_eq!(t.marker_pauses, 2);
        assert_eq!(t.gap_pauses, 2);
        assert_eq!(t.pauses, 4.0);
        assert!((t.pause_mean - 1.5).abs() < 1e-12);
        assert!((t.pause_var - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_gap_at_threshold_not_counted() {
        let segments = vec![Segment::new(0.0, 1.0, "a"), Segment::new(1.5, 2.0, "b")];
        assert_eq!(pause_gaps(&segments, 0.5).len(), 0);
        assert_eq!(pause_gaps(&segments, 0.3).len(), 1);
    }

    #[test]
    fn test_invalid_times_are_skipped() {
        let segments = vec![
            Segment::new(0.0, f64::NAN, "a"),
            Segment::new(5.0, 6.0, "b"),
            Segment::new(8.0, 9.0, "c"),
        ];
        assert_eq!(pause_gaps(&segments, 0.3), vec![2.0]);
    }

    #[test]
    fn test_articulation_rate() {
        // "hello world" = 3 syllables over 1.5 s
        let t = TimingStats::compute("hello world", &[], 1.5, 0.3);
        assert!((t.speech_articulation_rate - 2.0).abs() < 1e-12);
        let t = TimingStats::compute("hello world", &[], 0.0, 0.3);
        assert_eq!(t.speech_articulation_rate, 0.0);
    }

    #[test]
    fn test_hello_world_scenario() {
        let segments = vec![Segment::new(0.0, 2.0, "hello"), Segment::new(5.0, 7.0, "world")];
        let transcript = crate::transcript::Transcript::from_segments(&segments, 0.3);
        let t = TimingStats::compute(&transcript.text, &segments, transcript.duration_sec, 0.3);
        assert_eq!(t.marker_pauses, 1);
        assert!(t.pauses >= 1.0);
        assert_eq!(transcript.duration_sec, 7.0);
    }
}
