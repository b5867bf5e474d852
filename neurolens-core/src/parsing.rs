//! Dependency-parsing capability.

use async_trait::async_trait;
use serde::Serialize;

use crate::capability::{CapabilityError, CapabilityKind};
use crate::config::RemoteServiceConfig;
use crate::remote::RemoteEndpoint;
use crate::syntax::ParsedDocument;

#[async_trait]
pub trait Parser: Send + Sync {
    async fn parse(&self, text: &str) -> Result<ParsedDocument, CapabilityError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    text: &'a str,
}

/// Parser backed by a remote service: `POST /parse {"text"} -> {"tokens": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpParser {
    endpoint: RemoteEndpoint,
}

impl HttpParser {
    pub fn new(config: &RemoteServiceConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            endpoint: RemoteEndpoint::new(
                CapabilityKind::Parser,
                &config.url,
                config.max_retries,
                config.retry_delay_ms,
            )?,
        })
    }
}

#[async_trait]
impl Parser for HttpParser {
    async fn parse(&self, text: &str) -> Result<ParsedDocument, CapabilityError> {
        let doc: ParsedDocument = self.endpoint.post_json("/parse", &ParseRequest { text }).await?;
        validate(&doc)?;
        Ok(doc)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Heads must point at a token inside the document.
fn validate(doc: &ParsedDocument) -> Result<(), CapabilityError> {
    let len = doc.tokens.len();
    match doc.tokens.iter().find(|t| t.head >= len || t.index >= len) {
        Some(bad) => Err(CapabilityError::InvalidResponse(format!(
            "token {} has head {} outside a {len}-token parse",
            bad.index, bad.head
        ))),
        None => Ok(()),
    }
}
