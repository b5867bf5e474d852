//! External model capabilities (parser, embedder, transcriber)
//!
//! The host process builds one [`Capabilities`] bundle at startup and shares it by
//! `Arc` for the life of the process; nothing here is reloaded mid-run. Every call
//! into a capability goes through [`bounded`], so a slow backend surfaces as a
//! `Timeout` error that callers degrade instead of waiting on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::NeurolensConfig;
use crate::embeddings::{self, EmbeddingBackend};
use crate::parsing::{HttpParser, Parser};
use crate::transcription::{HttpTranscriber, Transcriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Parser,
    Embedder,
    Transcriber,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CapabilityKind::Parser => "parser",
            CapabilityKind::Embedder => "embedder",
            CapabilityKind::Transcriber => "transcriber",
        })
    }
}

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Gave up after {retries} retries: {last_error}")]
    RetryExhausted { retries: usize, last_error: String },

    #[error("ONNX model not found at {path}")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("{capability} timed out after {timeout_ms}ms")]
    Timeout {
        capability: CapabilityKind,
        timeout_ms: u64,
    },

    #[error("{capability} is not configured")]
    Unavailable { capability: CapabilityKind },
}

/// Run one capability call under a deadline.
pub async fn bounded<T, F>(
    capability: CapabilityKind,
    timeout: Duration,
    call: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout {
            capability,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Process-wide capability instances. A `None` slot degrades the features it feeds.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub parser: Option<Arc<dyn Parser>>,
    pub embedder: Option<Arc<dyn EmbeddingBackend>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

/// Which capabilities are loaded, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilityStatus {
    pub parser: bool,
    pub embedder: bool,
    pub transcriber: bool,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("parser", &self.parser.as_ref().map(|p| p.name().to_string()))
            .field("embedder", &self.embedder.as_ref().map(|e| e.name().to_string()))
            .field(
                "transcriber",
                &self.transcriber.as_ref().map(|t| t.name().to_string()),
            )
            .finish()
    }
}

impl Capabilities {
    /// Load every configured capability once. Failures are logged and leave the slot empty.
    pub fn load(config: &NeurolensConfig) -> Self {
        let parser: Option<Arc<dyn Parser>> = if config.parser.url.is_empty() {
            tracing::warn!("No parser configured; syntactic features will default to 0");
            None
        } else {
            match HttpParser::new(&config.parser) {
                Ok(p) => Some(Arc::new(p)),
                Err(e) => {
                    tracing::warn!(error = %e, "Parser unavailable");
                    None
                }
            }
        };

        let embedder: Option<Arc<dyn EmbeddingBackend>> =
            match embeddings::backend_config_from(&config.embedding) {
                None => {
                    tracing::warn!("Embedding backend disabled; semantic drift will default to 0");
                    None
                }
                Some(backend_cfg) => match embeddings::create_backend(backend_cfg) {
                    Ok(b) => Some(Arc::from(b)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Embedding backend unavailable");
                        None
                    }
                },
            };

        let transcriber: Option<Arc<dyn Transcriber>> = if config.transcriber.url.is_empty() {
            None
        } else {
            match HttpTranscriber::new(&config.transcriber) {
                Ok(t) => Some(Arc::new(t)),
                Err(e) => {
                    tracing::warn!(error = %e, "Transcriber unavailable");
                    None
                }
            }
        };

        let caps = Self {
            parser,
            embedder,
            transcriber,
        };
        tracing::info!(capabilities = ?caps, "Capabilities loaded");
        caps
    }

    pub fn status(&self) -> CapabilityStatus {
        CapabilityStatus {
            parser: self.parser.is_some(),
            embedder: self.embedder.is_some(),
            transcriber: self.transcriber.is_some(),
        }
    }
}
