//! Delegated extraction through a hosted reader service.
//!
//! The service receives the target URL appended to its endpoint path and answers with
//! a JSON envelope of already extracted fields, so the result skips the readability stage
//! and goes straight to the remaining processors.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{ClientSlot, DEFAULT_USER_AGENT, Fetcher, FetcherKind, cancellable};
use crate::content::{Content, FetchedContent};
use crate::{GleanerError, Result};

/// Configuration for the reader service client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteReaderConfig {
    /// Service base URL; the target URL is appended to it (default: `https://r.jina.ai/`).
    pub endpoint: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Sent as `Accept-Language` (default: `en-US`).
    pub locale: String,
    /// Requested format of the `content` field, sent as `X-Return-Format` (default: `markdown`).
    pub return_format: String,
    /// Request timeout in seconds (default: 60).
    pub timeout: u64,
}

impl Default for RemoteReaderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://r.jina.ai/".to_string(),
            api_key: None,
            locale: "en-US".to_string(),
            return_format: "markdown".to_string(),
            timeout: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: u16,
    data: Option<ReaderData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ReaderData {
    url: String,
    title: String,
    description: String,
    content: String,
    text: String,
    html: String,
    screenshot_url: String,
    published_time: Option<String>,
}

impl ReaderData {
    fn into_content(self, requested: &str) -> Content {
        let published_time =
            self.published_time.as_deref().and_then(|t| OffsetDateTime::parse(t, &Rfc3339).ok());

        Content {
            url: if self.url.is_empty() { requested.to_string() } else { self.url },
            title: self.title,
            description: self.description,
            markdown: self.content,
            text: self.text,
            html: self.html,
            image: self.screenshot_url,
            published_time,
            ..Default::default()
        }
    }
}

/// Fetches pre-extracted content from a reader service.
pub struct RemoteReaderFetcher {
    client: ClientSlot,
    config: RemoteReaderConfig,
}

impl RemoteReaderFetcher {
    pub fn new(config: RemoteReaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self { client: ClientSlot::new(client), config })
    }

    fn request_url(&self, target: &str) -> String {
        let mut endpoint = self.config.endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        endpoint.push_str(target);
        endpoint
    }

    async fn request(&self, url: &str) -> Result<Content> {
        let client = self.client.get()?;
        let mut request = client
            .get(self.request_url(url))
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, &self.config.locale)
            .header("X-Return-Format", &self.config.return_format);
        if let Some(key) = &self.config.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() { GleanerError::Timeout { timeout: self.config.timeout } } else { GleanerError::Http(e) }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(GleanerError::Status { url: url.to_string(), status });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| GleanerError::ReaderApi(format!("malformed response for {url}: {e}")))?;

        if envelope.code >= 400 {
            return Err(GleanerError::ReaderApi(format!("service reported code {} for {url}", envelope.code)));
        }

        let data = envelope.data.ok_or_else(|| GleanerError::ReaderApi(format!("empty response for {url}")))?;
        Ok(data.into_content(url))
    }
}

#[async_trait]
impl Fetcher for RemoteReaderFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Remote
    }

    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<FetchedContent> {
        Url::parse(url).map_err(|e| GleanerError::InvalidUrl(format!("{url}: {e}")))?;
        let content = cancellable(ctx, self.request(url)).await?;
        tracing::debug!(url, title = %content.title, "reader service responded");
        Ok(FetchedContent { content_type: "application/json".to_string(), ..FetchedContent::from_content(content) })
    }

    async fn close(&self) -> Result<()> {
        self.client.release();
        Ok(())
    }
}
