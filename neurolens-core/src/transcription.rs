//! Speech-to-text capability.

use async_trait::async_trait;

use crate::capability::{CapabilityError, CapabilityKind};
use crate::config::RemoteServiceConfig;
use crate::remote::RemoteEndpoint;
use crate::transcript::{segments_from_json, Segment};

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file's bytes into timestamped segments.
    async fn transcribe(&self, audio: &[u8]) -> Result<Vec<Segment>, CapabilityError>;

    fn name(&self) -> &str;
}

/// Transcriber backed by a remote service: `POST /transcribe` with the raw audio,
/// answered by `{"segments": [{"start", "end", "text"}]}`.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    endpoint: RemoteEndpoint,
}

impl HttpTranscriber {
    pub fn new(config: &RemoteServiceConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            endpoint: RemoteEndpoint::new(
                CapabilityKind::Transcriber,
                &config.url,
                config.max_retries,
                config.retry_delay_ms,
            )?,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<Vec<Segment>, CapabilityError> {
        if audio.is_empty() {
            return Err(CapabilityError::InvalidResponse(
                "refusing to transcribe an empty audio payload".to_string(),
            ));
        }
        let body: serde_json::Value = self
            .endpoint
            .post_bytes("/transcribe", "application/octet-stream", audio)
            .await?;
        let segments = segments_from_json(&body);
        tracing::debug!(segments = segments.len(), "Transcription received");
        Ok(segments)
    }

    fn name(&self) -> &str {
        "http"
    }
}
