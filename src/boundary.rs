//! Word timing for synthesized audio.
//!
//! None of the offline models report alignments, so timings are normally
//! estimated by spreading the audio duration evenly over the words. This is
//! an approximation for highlighting and progress display, not a phonetic
//! alignment: long words and pauses are not accounted for.

use serde::Serialize;

use crate::audio::duration_ms;

/// When a word is spoken within the synthesized audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordBoundary {
    pub text: String,
    pub offset_ms: f64,
    pub duration_ms: f64,
}

/// Time unit of boundaries reported by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    /// 100-nanosecond ticks.
    Ticks,
    /// Output samples at the given rate.
    Samples(u32),
}

impl TimeUnit {
    fn to_ms(self, value: f64) -> f64 {
        match self {
            TimeUnit::Seconds => value * 1000.0,
            TimeUnit::Milliseconds => value,
            TimeUnit::Ticks => value / 10_000.0,
            TimeUnit::Samples(0) => 0.0,
            TimeUnit::Samples(rate) => value / f64::from(rate) * 1000.0,
        }
    }
}

/// Boundaries as an engine reported them, in its own unit.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeBoundaries {
    pub unit: TimeUnit,
    /// `(word, offset, duration)` triples.
    pub words: Vec<(String, f64, f64)>,
}

/// Convert engine-reported boundaries to milliseconds, otherwise unchanged.
pub fn rescale(native: &NativeBoundaries) -> Vec<WordBoundary> {
    native
        .words
        .iter()
        .map(|(text, offset, duration)| WordBoundary {
            text: text.clone(),
            offset_ms: native.unit.to_ms(*offset),
            duration_ms: native.unit.to_ms(*duration),
        })
        .collect()
}

/// Spread the audio duration evenly over the whitespace-delimited words of
/// `text`. Spans are contiguous and cover the whole duration.
pub fn estimate(text: &str, sample_count: usize, sample_rate: u32) -> Vec<WordBoundary> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let total_ms = duration_ms(sample_count, sample_rate);
    let per_word = total_ms / words.len() as f64;

    words
        .into_iter()
        .enumerate()
        .map(|(i, word)| WordBoundary {
            text: word.to_string(),
            offset_ms: per_word * i as f64,
            duration_ms: per_word,
        })
        .collect()
}

/// Use native boundaries when the engine produced them, otherwise estimate.
pub fn boundaries_for(
    text: &str,
    native: Option<&NativeBoundaries>,
    sample_count: usize,
    sample_rate: u32,
) -> Vec<WordBoundary> {
    match native {
        Some(native) => rescale(native),
        None => estimate(text, sample_count, sample_rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_boundary_per_word_covering_the_duration() {
        let text = "  the quick\tbrown fox\njumps ";
        let boundaries = estimate(text, 22_050 * 3, 22_050);

        assert_eq!(boundaries.len(), 5);
        assert_eq!(boundaries[0].text, "the");
        assert_eq!(boundaries[4].text, "jumps");
        assert_eq!(boundaries[0].offset_ms, 0.0);
        for pair in boundaries.windows(2) {
            let end = pair[0].offset_ms + pair[0].duration_ms;
            assert!((end - pair[1].offset_ms).abs() < 1e-9, "spans must be contiguous");
        }
        let total: f64 = boundaries.iter().map(|b| b.duration_ms).sum();
        assert!((total - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn blank_text_has_no_boundaries() {
        assert!(estimate("   \n\t", 1000, 16_000).is_empty());
    }

    #[test]
    fn zero_samples_gives_zero_length_spans() {
        let boundaries = estimate("a b", 0, 16_000);
        assert_eq!(boundaries.len(), 2);
        assert!(boundaries.iter().all(|b| b.duration_ms == 0.0));
    }

    #[test]
    fn native_boundaries_are_rescaled_not_reestimated() {
        let native = NativeBoundaries {
            unit: TimeUnit::Ticks,
            words: vec![
                ("hello".to_string(), 500_000.0, 3_000_000.0),
                ("world".to_string(), 4_000_000.0, 2_500_000.0),
            ],
        };
        let boundaries = boundaries_for("ignored text here", Some(&native), 48_000, 24_000);
        assert_eq!(
            boundaries,
            vec![
                WordBoundary { text: "hello".into(), offset_ms: 50.0, duration_ms: 300.0 },
                WordBoundary { text: "world".into(), offset_ms: 400.0, duration_ms: 250.0 },
            ]
        );
    }

    #[test]
    fn sample_unit_converts_with_rate() {
        let native = NativeBoundaries {
            unit: TimeUnit::Samples(16_000),
            words: vec![("hi".to_string(), 8_000.0, 16_000.0)],
        };
        let b = rescale(&native);
        assert_eq!(b[0].offset_ms, 500.0);
        assert_eq!(b[0].duration_ms, 1000.0);

        let secs = NativeBoundaries {
            unit: TimeUnit::Seconds,
            words: vec![("hi".to_string(), 0.25, 0.5)],
        };
        assert_eq!(rescale(&secs)[0].offset_ms, 250.0);
    }
}
