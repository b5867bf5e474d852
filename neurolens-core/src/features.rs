//! The fixed, versioned feature schema.
//!
//! Adding, removing or renaming a field is a breaking change: bump
//! [`FEATURE_SCHEMA_VERSION`] so stored histories are never silently reinterpreted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NeurolensError;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureField {
    SpeechSpeed,
    Pauses,
    PauseMean,
    PauseVar,
    VocabRichness,
    FillerWordRate,
    LexicalDiversity,
    AvgSentenceLength,
    SpeechArticulationRate,
    RepetitionRate,
    PronounNounRatio,
    AvgDependencyLength,
    TenseRatioPresent,
    TenseRatioPast,
    TenseRatioFuture,
    SemanticSimilarityDrift,
}

impl FeatureField {
    /// Every field, in schema order.
    pub const ALL: [FeatureField; 16] = [
        FeatureField::SpeechSpeed,
        FeatureField::Pauses,
        FeatureField::PauseMean,
        FeatureField::PauseVar,
        FeatureField::VocabRichness,
        FeatureField::FillerWordRate,
        FeatureField::LexicalDiversity,
        FeatureField::AvgSentenceLength,
        FeatureField::SpeechArticulationRate,
        FeatureField::RepetitionRate,
        FeatureField::PronounNounRatio,
        FeatureField::AvgDependencyLength,
        FeatureField::TenseRatioPresent,
        FeatureField::TenseRatioPast,
        FeatureField::TenseRatioFuture,
        FeatureField::SemanticSimilarityDrift,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureField::SpeechSpeed => "speech_speed",
            FeatureField::Pauses => "pauses",
            FeatureField::PauseMean => "pause_mean",
            FeatureField::PauseVar => "pause_var",
            FeatureField::VocabRichness => "vocab_richness",
            FeatureField::FillerWordRate => "filler_word_rate",
            FeatureField::LexicalDiversity => "lexical_diversity",
            FeatureField::AvgSentenceLength => "avg_sentence_length",
            FeatureField::SpeechArticulationRate => "speech_articulation_rate",
            FeatureField::RepetitionRate => "repetition_rate",
            FeatureField::PronounNounRatio => "pronoun_noun_ratio",
            FeatureField::AvgDependencyLength => "avg_dependency_length",
            FeatureField::TenseRatioPresent => "tense_ratio_present",
            FeatureField::TenseRatioPast => "tense_ratio_past",
            FeatureField::TenseRatioFuture => "tense_ratio_future",
            FeatureField::SemanticSimilarityDrift => "semantic_similarity_drift",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            FeatureField::SpeechSpeed => "words/sec",
            FeatureField::Pauses => "count",
            FeatureField::PauseMean => "sec",
            FeatureField::PauseVar => "sec^2",
            FeatureField::AvgSentenceLength => "words",
            FeatureField::SpeechArticulationRate => "syllables/sec",
            FeatureField::AvgDependencyLength => "tokens",
            FeatureField::SemanticSimilarityDrift => "unitless",
            _ => "ratio",
        }
    }
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureField {
    type Err = NeurolensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| NeurolensError::InvalidInput(format!("unknown feature field '{s}'")))
    }
}

/// One measurement per transcript. Every field is always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub speech_speed: f64,
    pub pauses: f64,
    pub pause_mean: f64,
    pub pause_var: f64,
    pub vocab_richness: f64,
    pub filler_word_rate: f64,
    pub lexical_diversity: f64,
    pub avg_sentence_length: f64,
    pub speech_articulation_rate: f64,
    pub repetition_rate: f64,
    pub pronoun_noun_ratio: f64,
    pub avg_dependency_length: f64,
    pub tense_ratio_present: f64,
    pub tense_ratio_past: f64,
    pub tense_ratio_future: f64,
    pub semantic_similarity_drift: f64,
}

impl FeatureVector {
    pub fn get(&self, field: FeatureField) -> f64 {
        match field {
            FeatureField::SpeechSpeed => self.speech_speed,
            FeatureField::Pauses => self.pauses,
            FeatureField::PauseMean => self.pause_mean,
            FeatureField::PauseVar => self.pause_var,
            FeatureField::VocabRichness => self.vocab_richness,
            FeatureField::FillerWordRate => self.filler_word_rate,
            FeatureField::LexicalDiversity => self.lexical_diversity,
            FeatureField::AvgSentenceLength => self.avg_sentence_length,
            FeatureField::SpeechArticulationRate => self.speech_articulation_rate,
            FeatureField::RepetitionRate => self.repetition_rate,
            FeatureField::PronounNounRatio => self.pronoun_noun_ratio,
            FeatureField::AvgDependencyLength => self.avg_dependency_length,
            FeatureField::TenseRatioPresent => self.tense_ratio_present,
            FeatureField::TenseRatioPast => self.tense_ratio_past,
            FeatureField::TenseRatioFuture => self.tense_ratio_future,
            FeatureField::SemanticSimilarityDrift => self.semantic_similarity_drift,
        }
    }

    pub fn set(&mut self, field: FeatureField, value: f64) {
        let slot = match field {
            FeatureField::SpeechSpeed => &mut self.speech_speed,
            FeatureField::Pauses => &mut self.pauses,
            FeatureField::PauseMean => &mut self.pause_mean,
            FeatureField::PauseVar => &mut self.pause_var,
            FeatureField::VocabRichness => &mut self.vocab_richness,
            FeatureField::FillerWordRate => &mut self.filler_word_rate,
            FeatureField::LexicalDiversity => &mut self.lexical_diversity,
            FeatureField::AvgSentenceLength => &mut self.avg_sentence_length,
            FeatureField::SpeechArticulationRate => &mut self.speech_articulation_rate,
            FeatureField::RepetitionRate => &mut self.repetition_rate,
            FeatureField::PronounNounRatio => &mut self.pronoun_noun_ratio,
            FeatureField::AvgDependencyLength => &mut self.avg_dependency_length,
            FeatureField::TenseRatioPresent => &mut self.tense_ratio_present,
            FeatureField::TenseRatioPast => &mut self.tense_ratio_past,
            FeatureField::TenseRatioFuture => &mut self.tense_ratio_future,
            FeatureField::SemanticSimilarityDrift => &mut self.semantic_similarity_drift,
        };
        *slot = value;
    }

    /// `(field, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureField, f64)> + '_ {
        FeatureField::ALL.into_iter().map(move |f| (f, self.get(f)))
    }
}
