//! Feature extraction: transcript in, fixed-schema vector out.
//!
//! [`compute_features`] is the pure assembler. [`FeatureExtractor`] wraps it with the
//! capability calls, each bounded by the configured timeout. A capability that is
//! missing, fails or times out is recorded in [`Extraction::degraded`] and the features
//! it feeds fall back to 0 instead of failing the whole vector.

use serde::Serialize;
use std::time::Duration;

use crate::capability::{bounded, Capabilities, CapabilityError, CapabilityKind};
use crate::config::FeatureConfig;
use crate::features::{FeatureVector, FEATURE_SCHEMA_VERSION};
use crate::lexical::LexicalStats;
use crate::semantic::semantic_drift;
use crate::syntax::{ParsedDocument, SyntacticStats};
use crate::timing::TimingStats;
use crate::transcript::{Segment, Transcript};

/// Merge every statistic for one transcript into a [`FeatureVector`].
pub fn compute_features(
    transcript: &Transcript,
    segments: &[Segment],
    parsed: Option<&ParsedDocument>,
    semantic_similarity_drift: f64,
    config: &FeatureConfig,
) -> FeatureVector {
    let lexical = LexicalStats::compute(&transcript.text, transcript.duration_sec);
    let timing = TimingStats::compute(
        &transcript.text,
        segments,
        transcript.duration_sec,
        config.gap_pause_threshold_sec,
    );
    let syntax = SyntacticStats::compute(parsed);

    FeatureVector {
        speech_speed: lexical.speech_speed,
        pauses: timing.pauses,
        pause_mean: timing.pause_mean,
        pause_var: timing.pause_var,
        vocab_richness: lexical.vocab_richness,
        filler_word_rate: lexical.filler_word_rate,
        lexical_diversity: lexical.lexical_diversity,
        avg_sentence_length: lexical.avg_sentence_length,
        speech_articulation_rate: timing.speech_articulation_rate,
        repetition_rate: lexical.repetition_rate,
        pronoun_noun_ratio: syntax.pronoun_noun_ratio,
        avg_dependency_length: syntax.avg_dependency_length,
        tense_ratio_present: syntax.tense_ratio_present,
        tense_ratio_past: syntax.tense_ratio_past,
        tense_ratio_future: syntax.tense_ratio_future,
        semantic_similarity_drift,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub transcript: Transcript,
    pub features: FeatureVector,
    pub schema_version: u32,
    /// Embedding of this transcript, kept so a first observation can seed the baseline.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub degraded: Vec<CapabilityKind>,
}

#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    capabilities: Capabilities,
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(capabilities: Capabilities, config: FeatureConfig) -> Self {
        Self {
            capabilities,
            config,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Extract features from segments, measuring drift against `baseline_embedding`.
    pub async fn extract(
        &self,
        segments: &[Segment],
        baseline_embedding: Option<&[f32]>,
    ) -> Extraction {
        let transcript = Transcript::from_segments(segments, self.config.stitch_pause_threshold_sec);
        let timeout = Duration::from_millis(self.config.capability_timeout_ms);

        let (parsed, embedding) = tokio::join!(
            self.parse(&transcript, timeout),
            self.embed(&transcript, timeout)
        );

        let mut degraded = Vec::new();
        let parsed = settle(CapabilityKind::Parser, parsed, &mut degraded);
        let embedding = settle(CapabilityKind::Embedder, embedding, &mut degraded);

        let drift = semantic_drift(embedding.as_deref(), baseline_embedding);
        let features = compute_features(&transcript, segments, parsed.as_ref(), drift, &self.config);

        tracing::debug!(
            words = transcript.text.split_whitespace().count(),
            duration_sec = transcript.duration_sec,
            degraded = ?degraded,
            "Extracted feature vector"
        );

        Extraction {
            transcript,
            features,
            schema_version: FEATURE_SCHEMA_VERSION,
            embedding,
            degraded,
        }
    }

    /// Run the transcriber over raw audio. Unlike parse/embed, a failure here fails the call.
    pub async fn transcribe(&self, audio: &[u8]) -> Result<Vec<Segment>, CapabilityError> {
        let transcriber = self
            .capabilities
            .transcriber
            .as_ref()
            .ok_or(CapabilityError::Unavailable {
                capability: CapabilityKind::Transcriber,
            })?;
        bounded(
            CapabilityKind::Transcriber,
            Duration::from_millis(self.config.transcription_timeout_ms),
            transcriber.transcribe(audio),
        )
        .await
    }

    async fn parse(
        &self,
        transcript: &Transcript,
        timeout: Duration,
    ) -> Result<Option<ParsedDocument>, CapabilityError> {
        if transcript.is_blank() {
            return Ok(None);
        }
        let parser = self
            .capabilities
            .parser
            .as_ref()
            .ok_or(CapabilityError::Unavailable {
                capability: CapabilityKind::Parser,
            })?;
        bounded(CapabilityKind::Parser, timeout, parser.parse(&transcript.text))
            .await
            .map(Some)
    }

    async fn embed(
        &self,
        transcript: &Transcript,
        timeout: Duration,
    ) -> Result<Option<Vec<f32>>, CapabilityError> {
        if transcript.is_blank() {
            return Ok(None);
        }
        let embedder = self
            .capabilities
            .embedder
            .as_ref()
            .ok_or(CapabilityError::Unavailable {
                capability: CapabilityKind::Embedder,
            })?;
        bounded(CapabilityKind::Embedder, timeout, embedder.embed(&transcript.text)).await
    }
}

fn settle<T>(
    capability: CapabilityKind,
    result: Result<Option<T>, CapabilityError>,
    degraded: &mut Vec<CapabilityKind>,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(%capability, error = %e, "Capability degraded, dependent features default to 0");
            degraded.push(capability);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::EmbeddingBackend;
    use crate::features::FeatureField;
    use crate::parsing::Parser;
    use crate::syntax::{ParsedToken, PartOfSpeech};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedParser;

    #[async_trait]
    impl Parser for FixedParser {
        async fn parse(&self, _text: &str) -> Result<ParsedDocument, CapabilityError> {
            let tok = |index, head, dep: &str, pos, tag: &str, morph: &str| ParsedToken {
                index,
                head,
                dep: dep.to_string(),
                pos,
                tag: tag.to_string(),
                morph: morph.to_string(),
            };
            Ok(ParsedDocument {
                tokens: vec![
                    tok(0, 1, "nsubj", PartOfSpeech::Pron, "PRP", ""),
                    tok(1, 1, "ROOT", PartOfSpeech::Verb, "VBD", "Tense=Past"),
                    tok(2, 1, "dobj", PartOfSpeech::Noun, "NN", ""),
                ],
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingParser;

    #[async_trait]
    impl Parser for FailingParser {
        async fn parse(&self, _text: &str) -> Result<ParsedDocument, CapabilityError> {
            Err(CapabilityError::InvalidResponse("boom".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct CountingEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingEmbedder {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(Some(self.vector.clone()))
        }

        fn dimensions(&self) -> usize {
            self.vector.len()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn segments() -> Vec<Segment> {
        vec![
            Segment::new(0.0, 2.0, "I saw the dog."),
            Segment::new(2.1, 4.0, "It was, um, big."),
        ]
    }

    fn extractor(parser: Option<Arc<dyn Parser>>, embedder: Option<Arc<dyn EmbeddingBackend>>) -> FeatureExtractor {
        FeatureExtractor::new(
            Capabilities {
                parser,
                embedder,
                transcriber: None,
            },
            FeatureConfig {
                capability_timeout_ms: 50,
                ..FeatureConfig::default()
            },
        )
    }

    // ===== TEST 1: Pure assembler is idempotent =====
    #[test]
    fn test_compute_features_is_bit_identical() {
        let config = FeatureConfig::default();
        let segs = segments();
        let transcript = Transcript::from_segments(&segs, config.stitch_pause_threshold_sec);
        let a = compute_features(&transcript, &segs, None, 0.25, &config);
        let b = compute_features(&transcript, &segs, None, 0.25, &config);
        for ((field, x), (_, y)) in a.iter().zip(b.iter()) {
            assert_eq!(x.to_bits(), y.to_bits(), "{field}");
        }
    }

    // ===== TEST 2: Empty transcript yields all-zero ratios =====
    #[test]
    fn test_empty_transcript_defaults_every_field() {
        let config = FeatureConfig::default();
        let transcript = Transcript::from_segments(&[], config.stitch_pause_threshold_sec);
        let v = compute_features(&transcript, &[], None, 0.0, &config);
        assert_eq!(v, FeatureVector::default());
    }

    // ===== TEST 3: Full extraction with both capabilities =====
    #[tokio::test]
    async fn test_extract_with_capabilities() {
        let embedder = Arc::new(CountingEmbedder::new(vec![1.0, 0.0]));
        let ex = extractor(Some(Arc::new(FixedParser)), Some(embedder.clone()));

        let baseline = [0.0f32, 1.0];
        let out = ex.extract(&segments(), Some(&baseline)).await;

        assert!(out.degraded.is_empty());
        assert_eq!(out.embedding.as_deref(), Some(&[1.0f32, 0.0][..]));
        assert!((out.features.semantic_similarity_drift - 1.0).abs() < 1e-12);
        assert_eq!(out.features.tense_ratio_past, 1.0);
        assert_eq!(out.features.pronoun_noun_ratio, 1.0);
        assert_eq!(out.transcript.duration_sec, 4.0);
        assert!(out.features.speech_speed > 0.0);
        assert_eq!(out.schema_version, FEATURE_SCHEMA_VERSION);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    // ===== TEST 4: First observation still gets an embedding, drift 0 =====
    #[tokio::test]
    async fn test_no_baseline_means_zero_drift_but_embedding_kept() {
        let ex = extractor(None, Some(Arc::new(CountingEmbedder::new(vec![0.5, 0.5]))));
        let out = ex.extract(&segments(), None).await;
        assert_eq!(out.features.semantic_similarity_drift, 0.0);
        assert!(out.embedding.is_some());
        assert_eq!(out.degraded, vec![CapabilityKind::Parser]);
    }

    // ===== TEST 5: Failing parser degrades only syntactic fields =====
    #[tokio::test]
    async fn test_parser_failure_is_isolated() {
        let ex = extractor(Some(Arc::new(FailingParser)), None);
        let out = ex.extract(&segments(), None).await;
        assert_eq!(
            out.degraded,
            vec![CapabilityKind::Parser, CapabilityKind::Embedder]
        );
        assert_eq!(out.features.get(FeatureField::AvgDependencyLength), 0.0);
        assert_eq!(out.features.get(FeatureField::TenseRatioPast), 0.0);
        assert!(out.features.vocab_richness > 0.0);
    }

    // ===== TEST 6: Slow embedder times out and drift defaults =====
    #[tokio::test]
    async fn test_embedder_timeout_degrades_drift() {
        let mut slow = CountingEmbedder::new(vec![1.0, 0.0]);
        slow.delay = Duration::from_secs(5);
        let ex = extractor(Some(Arc::new(FixedParser)), Some(Arc::new(slow)));

        let baseline = [0.0f32, 1.0];
        let out = ex.extract(&segments(), Some(&baseline)).await;
        assert_eq!(out.degraded, vec![CapabilityKind::Embedder]);
        assert_eq!(out.features.semantic_similarity_drift, 0.0);
        assert!(out.embedding.is_none());
        assert_eq!(out.features.tense_ratio_past, 1.0);
    }

    // ===== TEST 7: Blank text skips capabilities without degrading =====
    #[tokio::test]
    async fn test_blank_transcript_skips_capabilities() {
        let embedder = Arc::new(CountingEmbedder::new(vec![1.0]));
        let ex = extractor(None, Some(embedder.clone()));
        let out = ex.extract(&[Segment::new(0.0, 1.0, "   ")], None).await;
        assert!(out.degraded.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(out.features, FeatureVector::default());
    }

    // ===== TEST 8: Transcription without a transcriber =====
    #[tokio::test]
    async fn test_transcribe_unavailable() {
        let ex = extractor(None, None);
        let err = ex.transcribe(b"audio").await.unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::Unavailable {
                capability: CapabilityKind::Transcriber
            }
        ));
    }
}
