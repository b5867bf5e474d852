//! Retrying JSON client shared by the HTTP-backed capabilities.

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::capability::{CapabilityError, CapabilityKind};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured { code: Option<u16>, message: String },
    Plain(String),
}

#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    client: Client,
    base_url: String,
    capability: CapabilityKind,
    max_retries: usize,
    retry_delay_ms: u64,
}

impl RemoteEndpoint {
    pub fn new(
        capability: CapabilityKind,
        base_url: &str,
        max_retries: usize,
        retry_delay_ms: u64,
    ) -> Result<Self, CapabilityError> {
        if base_url.is_empty() {
            return Err(CapabilityError::Unavailable { capability });
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            capability,
            max_retries,
            retry_delay_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body to `{base_url}{path}` and decode the JSON reply.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, CapabilityError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        self.with_retries(|| self.send_once(self.client.post(&url).json(body)))
            .await
    }

    /// POST raw bytes (e.g. audio) and decode the JSON reply.
    pub async fn post_bytes<T>(
        &self,
        path: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<T, CapabilityError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        self.with_retries(|| {
            self.send_once(
                self.client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(bytes.to_vec()),
            )
        })
        .await
    }

    async fn with_retries<T, F, Fut>(&self, action: F) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CapabilityError>>,
    {
        let retry_strategy = ExponentialBackoff::from_millis(self.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries);

        match Retry::spawn(retry_strategy, action).await {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!(
                    capability = %self.capability,
                    retries = self.max_retries,
                    error = %e,
                    "All capability retry attempts failed"
                );
                Err(CapabilityError::RetryExhausted {
                    retries: self.max_retries,
                    last_error: e.to_string(),
                })
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, CapabilityError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ErrorBody>(&error_body)
                .ok()
                .and_then(|b| b.error)
            {
                Some(ErrorDetail::Structured { code, message }) => {
                    (code.unwrap_or(status.as_u16()), message)
                }
                Some(ErrorDetail::Plain(message)) => (status.as_u16(), message),
                None => (status.as_u16(), error_body),
            };
            tracing::warn!(capability = %self.capability, code, message = %message, "Capability API error");
            return Err(CapabilityError::Api { code, message });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| CapabilityError::InvalidResponse(e.to_string()))
    }
}
