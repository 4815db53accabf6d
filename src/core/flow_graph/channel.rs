//! Outbound collaborators: the messaging channel and the media resolver.

use crate::core::flow_graph::context::RunTarget;
use crate::core::flow_graph::model::MediaKind;
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel rejected the message: {0}")]
    Rejected(String),
    #[error("channel unavailable: {0}")]
    Unavailable(String),
    #[error("channel call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("media '{0}' not found")]
    NotFound(String),
    #[error("invalid media reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },
    #[error("media resolution timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Sends messages to a recipient. Implementations own retries and rate limiting.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send_text(&self, target: &RunTarget, text: &str) -> Result<(), ChannelError>;

    async fn send_media(
        &self,
        target: &RunTarget,
        url: &str,
        caption: &str,
        kind: MediaKind,
    ) -> Result<(), ChannelError>;
}

/// Turns a stored media reference into a URL the channel can deliver.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<String, MediaError>;
}

fn absolute_http_url(reference: &str) -> Option<Url> {
    Url::parse(reference)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// Accepts references that are already absolute http(s) URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughMediaResolver;

#[async_trait]
impl MediaResolver for PassthroughMediaResolver {
    async fn resolve(&self, reference: &str) -> Result<String, MediaError> {
        absolute_http_url(reference)
            .map(String::from)
            .ok_or_else(|| MediaError::InvalidReference {
                reference: reference.to_string(),
                reason: "expected an absolute http(s) URL".to_string(),
            })
    }
}

/// Resolves relative references (e.g. uploaded file names) against a public base URL.
#[derive(Debug, Clone)]
pub struct BaseUrlMediaResolver {
    base: Url,
}

impl BaseUrlMediaResolver {
    pub fn new(base: &str) -> Result<Self, MediaError> {
        let mut base = absolute_http_url(base).ok_or_else(|| MediaError::InvalidReference {
            reference: base.to_string(),
            reason: "base must be an absolute http(s) URL".to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }
}

#[async_trait]
impl MediaResolver for BaseUrlMediaResolver {
    async fn resolve(&self, reference: &str) -> Result<String, MediaError> {
        if let Some(url) = absolute_http_url(reference) {
            return Ok(url.into());
        }
        let trimmed = reference.trim().trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(MediaError::NotFound(reference.to_string()));
        }
        self.base
            .join(trimmed)
            .map(String::from)
            .map_err(|err| MediaError::InvalidReference {
                reference: reference.to_string(),
                reason: err.to_string(),
            })
    }
}
