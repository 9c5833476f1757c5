//! Plain HTTP fetching with retry and redirect policy.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ClientSlot, DEFAULT_USER_AGENT, Fetcher, FetcherKind, cancellable, pause};
use crate::content::{Body, Content, FetchedContent};
use crate::{GleanerError, Result};

/// HTTP client configuration.
///
/// # Example
///
/// ```rust
/// use gleaner_core::HttpFetcherConfig;
///
/// let config = HttpFetcherConfig::builder()
///     .timeout(10)
///     .retry_count(3)
///     .header("Accept-Language", "de-DE")
///     .build();
/// assert_eq!(config.retry_count, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpFetcherConfig {
    /// Request timeout in seconds, covering connect and body (default: 30).
    pub timeout: u64,
    /// Largest accepted body in bytes; 0 disables the check (default: 10 MiB).
    pub max_body_size: usize,
    /// Redirect ceiling when following redirects; 0 uses reqwest's default policy (default: 10).
    pub max_redirects: usize,
    /// Extra attempts after the first failure (default: 2).
    pub retry_count: usize,
    /// Pause between attempts in milliseconds (default: 1000).
    pub retry_delay_ms: u64,
    /// When false, redirects are returned to the caller as ordinary responses (default: true).
    pub follow_redirects: bool,
    pub user_agent: String,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        );
        headers.insert("Accept-Language".to_string(), "en-US,en;q=0.9".to_string());

        Self {
            timeout: 30,
            max_body_size: 10 * 1024 * 1024,
            max_redirects: 10,
            retry_count: 2,
            retry_delay_ms: 1000,
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers,
        }
    }
}

impl HttpFetcherConfig {
    pub fn builder() -> HttpFetcherConfigBuilder {
        HttpFetcherConfigBuilder::new()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Builder for [`HttpFetcherConfig`].
#[derive(Debug, Clone, Default)]
pub struct HttpFetcherConfigBuilder {
    config: HttpFetcherConfig,
}

impl HttpFetcherConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.config.timeout = secs;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    pub fn max_redirects(mut self, value: usize) -> Self {
        self.config.max_redirects = value;
        self
    }

    pub fn retry_count(mut self, value: usize) -> Self {
        self.config.retry_count = value;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn follow_redirects(mut self, value: bool) -> Self {
        self.config.follow_redirects = value;
        self
    }

    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.config.user_agent = value.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> HttpFetcherConfig {
        self.config
    }
}

#[derive(Debug, thiserror::Error)]
#[error("stopped after {0} redirects")]
struct RedirectLimit(usize);

/// Fetches pages over plain HTTP.
///
/// The underlying client, and with it the connection pool, is built once here and
/// dropped by [`Fetcher::close`].
pub struct HttpFetcher {
    client: ClientSlot,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers(&config.headers))
            .redirect(redirect_policy(&config))
            .build()?;

        Ok(Self { client: ClientSlot::new(client), config })
    }

    pub fn config(&self) -> &HttpFetcherConfig {
        &self.config
    }

    /// A single attempt. Responses with status 400 or above are errors.
    async fn do_fetch(&self, client: &Client, url: &Url) -> Result<FetchedContent> {
        let response = client.get(url.clone()).send().await.map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            drop(response);
            return Err(GleanerError::Status { url: url.to_string(), status });
        }

        let limit = self.config.max_body_size;
        if limit > 0
            && let Some(length) = response.content_length()
            && length > limit as u64
        {
            return Err(GleanerError::BodyTooLarge { limit });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let headers = response.headers().clone();
        let content = Content::new(response.url().as_str());

        tracing::debug!(url = %url, status, content_type = %content_type, "response received");

        Ok(FetchedContent { content, body: Some(limit_body(response.bytes_stream(), limit)), status, content_type, headers })
    }

    fn classify(&self, err: reqwest::Error) -> GleanerError {
        if err.is_redirect() {
            GleanerError::TooManyRedirects { max: self.config.max_redirects }
        } else if err.is_timeout() {
            GleanerError::Timeout { timeout: self.config.timeout }
        } else {
            GleanerError::Http(err)
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Http
    }

    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<FetchedContent> {
        let parsed = Url::parse(url).map_err(|e| GleanerError::InvalidUrl(format!("{url}: {e}")))?;
        let client = self.client.get()?;
        let attempts = self.config.retry_count + 1;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match cancellable(ctx, self.do_fetch(&client, &parsed)).await {
                Ok(fetched) => return Ok(fetched),
                Err(GleanerError::Cancelled) => return Err(GleanerError::Cancelled),
                Err(err) => err,
            };

            if attempt >= attempts {
                return Err(GleanerError::RetriesExhausted { url: url.to_string(), attempts, source: Box::new(err) });
            }

            tracing::warn!(url, attempt, attempts, error = %err, "fetch attempt failed, retrying");
            pause(ctx, self.config.retry_delay()).await?;
        }
    }

    async fn close(&self) -> Result<()> {
        self.client.release();
        Ok(())
    }
}

fn redirect_policy(config: &HttpFetcherConfig) -> Policy {
    if !config.follow_redirects {
        return Policy::none();
    }
    if config.max_redirects == 0 {
        return Policy::default();
    }

    let max = config.max_redirects;
    Policy::custom(move |attempt| {
        // `previous` holds the original URL plus every hop followed so far.
        if attempt.previous().len() > max { attempt.error(RedirectLimit(max)) } else { attempt.follow() }
    })
}

fn default_headers(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "skipping invalid header"),
        }
    }
    map
}

/// Adapts a byte stream into a [`Body`], failing once more than `limit` bytes arrive.
fn limit_body<S, B>(stream: S, limit: usize) -> Body
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]>,
{
    let mut received = 0usize;
    stream
        .map(move |chunk| {
            let chunk = chunk?;
            received += chunk.as_ref().len();
            if limit > 0 && received > limit {
                return Err(GleanerError::BodyTooLarge { limit });
            }
            Ok(chunk.as_ref().to_vec())
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpFetcherConfig::default();
        assert_eq!(config.timeout, 30);
        assert_eq!(config.retry_count, 2);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert!(config.follow_redirects);
        assert!(config.user_agent.contains("Gleaner"));
        assert!(config.headers.contains_key("Accept"));
    }

    #[test]
    fn test_config_builder() {
        let config = HttpFetcherConfig::builder()
            .timeout(5)
            .max_body_size(1024)
            .max_redirects(3)
            .retry_count(0)
            .retry_delay(Duration::from_millis(250))
            .follow_redirects(false)
            .user_agent("test-agent")
            .header("X-Test", "1")
            .build();

        assert_eq!(config.timeout, 5);
        assert_eq!(config.max_body_size, 1024);
        assert_eq!(config.max_redirects, 3);
        assert_eq!(config.retry_count, 0);
        assert_eq!(config.retry_delay_ms, 250);
        assert!(!config.follow_redirects);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.headers.get("X-Test").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_config_deserializes_partial() {
        let config: HttpFetcherConfig = serde_json::from_str(r#"{"retry_count": 5}"#).unwrap();
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.timeout, 30);
    }

    #[test]
    fn test_default_headers_skip_invalid() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Good".to_string(), "yes".to_string());
        headers.insert("Bad Header".to_string(), "no".to_string());
        let map = default_headers(&headers);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("x-good"));
    }

    #[tokio::test]
    async fn test_limit_body_rejects_oversized_stream() {
        let chunks: Vec<std::result::Result<Vec<u8>, reqwest::Error>> = vec![Ok(vec![b'a'; 6]), Ok(vec![b'b'; 6])];
        let mut body = limit_body(futures::stream::iter(chunks), 10);

        assert_eq!(body.next().await.unwrap().unwrap().len(), 6);
        assert!(matches!(body.next().await, Some(Err(GleanerError::BodyTooLarge { limit: 10 }))));
    }

    #[tokio::test]
    async fn test_limit_body_zero_disables_check() {
        let chunks: Vec<std::result::Result<Vec<u8>, reqwest::Error>> = vec![Ok(vec![0; 64]), Ok(vec![0; 64])];
        let collected: Vec<_> = limit_body(futures::stream::iter(chunks), 0).collect().await;
        assert!(collected.iter().all(|c| c.is_ok()));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let fetcher = HttpFetcher::new(HttpFetcherConfig::default()).unwrap();
        let result = fetcher.fetch(&CancellationToken::new(), "not-a-url").await;
        assert!(matches!(result, Err(GleanerError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_after_close() {
        let fetcher = HttpFetcher::new(HttpFetcherConfig::default()).unwrap();
        fetcher.close().await.unwrap();
        let result = fetcher.fetch(&CancellationToken::new(), "https://example.com").await;
        assert!(matches!(result, Err(GleanerError::Closed)));
    }
}
