pub mod capability;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod estimator;
pub mod extractor;
pub mod features;
pub mod ipc;
pub mod lexical;
pub mod onnx_embedder;
pub mod parsing;
pub mod remote;
pub mod repository;
pub mod semantic;
pub mod syntax;
pub mod text;
pub mod timing;
pub mod tracker;
pub mod transcript;
pub mod transcription;

pub use capability::{Capabilities, CapabilityError, CapabilityKind};
pub use config::NeurolensConfig;
pub use embeddings::{
    create_backend, BackendConfig, EmbeddingBackend, HttpEmbeddingClient, OnnxConfig,
    MINILM_DIMENSIONS,
};
pub use error::NeurolensError;
pub use estimator::{bootstrap_confidence_interval, ConfidenceInterval};
pub use extractor::{compute_features, Extraction, FeatureExtractor};
pub use features::{FeatureField, FeatureVector, FEATURE_SCHEMA_VERSION};
pub use onnx_embedder::OnnxEmbeddingClient;
pub use parsing::{HttpParser, Parser};
pub use repository::{
    Baseline, HistoryRecord, InMemorySubjectRepository, PgSubjectRepository, SubjectRepository,
};
pub use tracker::{DriftReport, LongitudinalTracker, TrendSeries};
pub use transcript::{Segment, Transcript};
pub use transcription::{HttpTranscriber, Transcriber};
