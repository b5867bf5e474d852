//! Sentence embeddings for semantic drift
//!
//! Provides an `EmbeddingBackend` trait with implementations for:
//! - **ONNX**: local embeddings via `all-MiniLM-L6-v2` (384-dim)
//! - **HTTP**: a remote model service speaking `POST /embed {"text"} -> {"embedding"}`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capability::{CapabilityError, CapabilityKind};
use crate::config::EmbeddingConfig;
use crate::remote::RemoteEndpoint;

/// all-MiniLM-L6-v2 embedding dimensions
pub const MINILM_DIMENSIONS: usize = 384;

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a transcript. `Ok(None)` means the backend declined (e.g. blank text).
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, CapabilityError>;

    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// ONNX backend configuration
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub url: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

/// Configuration union for the backend factory.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Onnx(OnnxConfig),
    Http(HttpEmbeddingConfig),
}

/// Translate the `[embedding]` config section; `None` when embeddings are disabled.
pub fn backend_config_from(config: &EmbeddingConfig) -> Option<BackendConfig> {
    let dimensions = config.dimensions as usize;
    match config.backend.as_str() {
        "onnx" => {
            let (model_path, tokenizer_path) =
                crate::onnx_embedder::resolve_onnx_paths(&config.onnx_model_path);
            Some(BackendConfig::Onnx(OnnxConfig {
                model_path,
                tokenizer_path,
                dimensions,
            }))
        }
        "http" => Some(BackendConfig::Http(HttpEmbeddingConfig {
            url: config.http_url.clone(),
            dimensions,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })),
        "none" | "" => None,
        other => {
            tracing::warn!(backend = other, "Unknown embedding backend, embeddings disabled");
            None
        }
    }
}

/// Create the appropriate backend from configuration.
pub fn create_backend(config: BackendConfig) -> Result<Box<dyn EmbeddingBackend>, CapabilityError> {
    match config {
        BackendConfig::Onnx(c) => Ok(Box::new(crate::onnx_embedder::OnnxEmbeddingClient::new(c)?)),
        BackendConfig::Http(c) => Ok(Box::new(HttpEmbeddingClient::new(c)?)),
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding client for a remote model service.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    endpoint: RemoteEndpoint,
    dimensions: usize,
}

impl HttpEmbeddingClient {
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            endpoint: RemoteEndpoint::new(
                CapabilityKind::Embedder,
                &config.url,
                config.max_retries,
                config.retry_delay_ms,
            )?,
            dimensions: config.dimensions,
        })
    }

    /// Embed without the blank-text shortcut.
    pub async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let response: EmbedResponse = self
            .endpoint
            .post_json("/embed", &EmbedRequest { text })
            .await?;

        if response.embedding.len() != self.dimensions {
            return Err(CapabilityError::InvalidDimensions {
                expected: self.dimensions,
                actual: response.embedding.len(),
            });
        }
        Ok(response.embedding)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, CapabilityError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        self.embed_raw(text).await.map(Some)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> HttpEmbeddingConfig {
        HttpEmbeddingConfig {
            url: url.to_string(),
            dimensions: MINILM_DIMENSIONS,
            max_retries: 1,
            retry_delay_ms: 10,
        }
    }

    fn mock_embedding_response(dims: usize) -> serde_json::Value {
        let values: Vec<f32> = (0..dims).map(|i| (i as f32) / dims as f32).collect();
        serde_json::json!({ "embedding": values })
    }

    #[tokio::test]
    async fn test_embed_calls_service_and_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .and(body_json(serde_json::json!({"text": "I walked to the shop"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response(384)))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(test_config(&server.uri())).unwrap();
        let embedding = client.embed("I walked to the shop").await.unwrap();
        assert_eq!(embedding.map(|v| v.len()), Some(384));
    }

    #[tokio::test]
    async fn test_blank_text_is_declined_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response(384)))
            .expect(0)
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(test_config(&server.uri())).unwrap();
        assert!(client.embed("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_dimensions_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_embedding_response(3)))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(test_config(&server.uri())).unwrap();
        match client.embed("hello").await {
            Err(CapabilityError::InvalidDimensions { expected, actual }) => {
                assert_eq!(expected, 384);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected InvalidDimensions, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend: Box<dyn EmbeddingBackend> =
            Box::new(HttpEmbeddingClient::new(test_config(&server.uri())).unwrap());
        let result = backend.embed("hello").await;
        assert!(matches!(result, Err(CapabilityError::RetryExhausted { retries: 1, .. })));
        assert_eq!(backend.name(), "http");
        assert_eq!(backend.dimensions(), 384);
    }

    #[test]
    fn test_backend_config_selection() {
        let mut cfg = EmbeddingConfig::default();
        assert!(matches!(backend_config_from(&cfg), Some(BackendConfig::Onnx(_))));

        cfg.backend = "http".to_string();
        cfg.http_url = "http://localhost:9000".to_string();
        match backend_config_from(&cfg) {
            Some(BackendConfig::Http(c)) => {
                assert_eq!(c.url, "http://localhost:9000");
                assert_eq!(c.dimensions, MINILM_DIMENSIONS);
            }
            other => panic!("Expected Http config, got {other:?}"),
        }

        cfg.backend = "none".to_string();
        assert!(backend_config_from(&cfg).is_none());
        cfg.backend = "word2vec".to_string();
        assert!(backend_config_from(&cfg).is_none());
    }

    #[test]
    fn test_http_backend_without_url_fails_to_build() {
        let result = create_backend(BackendConfig::Http(test_config("")));
        assert!(matches!(
            result,
            Err(CapabilityError::Unavailable {
                capability: CapabilityKind::Embedder
            })
        ));
    }
}
