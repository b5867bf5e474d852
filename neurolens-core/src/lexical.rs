//! Surface statistics of a transcript: speed, richness, diversity, fillers, repetition.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::text::{lexicon_count, split_sentences, tokenize_words};

const FILLER_WORDS: [&str; 7] = ["um", "uh", "like", "so", "actually", "basically", "right"];
const FILLER_PHRASES: [(&str, &str); 2] = [("you", "know"), ("i", "mean")];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LexicalStats {
    pub word_count: usize,
    pub sentence_count: usize,
    pub speech_speed: f64,
    pub vocab_richness: f64,
    pub filler_word_rate: f64,
    pub lexical_diversity: f64,
    pub avg_sentence_length: f64,
    pub repetition_rate: f64,
}

impl LexicalStats {
    pub fn compute(text: &str, duration_sec: f64) -> Self {
        let words = tokenize_words(text);
        let sentence_count = split_sentences(text).len();
        let word_count = words.len();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for w in &words {
            *counts.entry(w.as_str()).or_insert(0) += 1;
        }
        let unique = counts.len();
        let repeated = counts.values().filter(|&&c| c > 1).count();

        Self {
            word_count,
            sentence_count,
            speech_speed: rate(word_count, duration_sec),
            vocab_richness: ratio(unique, word_count),
            filler_word_rate: ratio(count_fillers(&words), word_count),
            lexical_diversity: ratio(lexicon_count(text), word_count),
            avg_sentence_length: ratio(word_count, sentence_count),
            repetition_rate: ratio(repeated, word_count),
        }
    }
}

/// Single-word fillers plus two-word filler phrases (each phrase counts once).
pub fn count_fillers(words: &[String]) -> usize {
    let fillers: HashSet<&str> = FILLER_WORDS.into_iter().collect();
    let single = words.iter().filter(|w| fillers.contains(w.as_str())).count();
    let phrases = words
        .windows(2)
        .filter(|pair| {
            FILLER_PHRASES
                .iter()
                .any(|(a, b)| pair[0] == *a && pair[1] == *b)
        })
        .count();
    single + phrases
}

pub(crate) fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Per-second rate; 0 when the duration is not positive.
pub(crate) fn rate(count: usize, duration_sec: f64) -> f64 {
    if duration_sec > 0.0 {
        count as f64 / duration_sec
    } else {
        0.0
    }
}
