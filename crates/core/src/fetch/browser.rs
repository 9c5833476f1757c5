//! Rendered HTML from a remote Chrome instance.
//!
//! The fetcher talks to an already running browser through its DevTools control
//! endpoint (`ws://…` or `http://host:9222`). Every call to [`Fetcher::fetch`] dials
//! a fresh connection; the connection from the previous call is shut down first, and
//! [`Fetcher::close`] shuts down the last one. Callers that fetch many URLs should still
//! build one fetcher per URL so a stuck page never outlives its fetch.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Fetcher, FetcherKind, cancellable};
use crate::content::{Content, FetchedContent};
use crate::{GleanerError, Result};

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Configuration for the browser fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserFetcherConfig {
    /// Overall budget for connecting, loading, and extracting, in seconds (default: 60).
    pub timeout_secs: u64,
    /// DevTools endpoint of the managed browser.
    pub control_url: String,
    /// User agent override applied before navigation.
    pub user_agent: Option<String>,
    /// Scroll to the bottom after load to trigger lazy content (default: false).
    pub scroll_to_bottom: bool,
    /// Pause after scrolling in milliseconds (default: 2000).
    pub scroll_settle_ms: u64,
}

impl Default for BrowserFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            control_url: String::new(),
            user_agent: None,
            scroll_to_bottom: false,
            scroll_settle_ms: 2000,
        }
    }
}

impl BrowserFetcherConfig {
    pub fn new(control_url: impl Into<String>) -> Self {
        Self { control_url: control_url.into(), ..Default::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }
}

/// One live DevTools connection plus the task driving its event loop.
struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl Session {
    async fn connect(control_url: &str) -> Result<Self> {
        let (browser, mut handler) = Browser::connect(control_url)
            .await
            .map_err(|e| GleanerError::Browser(format!("failed to connect to {control_url}: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "browser close failed");
        }
        self.handler.abort();
    }
}

/// Fetches fully rendered HTML through browser automation.
pub struct BrowserFetcher {
    config: BrowserFetcherConfig,
    session: Mutex<Option<Session>>,
}

impl BrowserFetcher {
    pub fn new(config: BrowserFetcherConfig) -> Result<Self> {
        if config.control_url.trim().is_empty() {
            return Err(GleanerError::Browser("no browser control endpoint configured".to_string()));
        }
        Ok(Self { config, session: Mutex::new(None) })
    }

    async fn render(&self, browser: &Browser, url: &str) -> Result<String> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| GleanerError::Browser(format!("failed to open page: {e}")))?;

        let tab = page.clone();
        with_cleanup(self.load(&page, url), async move {
            if let Err(e) = tab.close().await {
                tracing::debug!(url, error = %e, "failed to close page");
            }
        })
        .await
    }

    async fn load(&self, page: &Page, url: &str) -> Result<String> {
        if let Some(ref ua) = self.config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| GleanerError::Browser(format!("failed to set user agent: {e}")))?;
        }

        page.goto(url)
            .await
            .map_err(|e| GleanerError::Browser(format!("navigation to {url} failed: {e}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| GleanerError::Browser(format!("waiting for {url} to load failed: {e}")))?;

        if self.config.scroll_to_bottom {
            page.evaluate(SCROLL_SCRIPT)
                .await
                .map_err(|e| GleanerError::Browser(format!("scrolling {url} failed: {e}")))?;
            tokio::time::sleep(self.config.scroll_settle()).await;
        }

        page.content()
            .await
            .map_err(|e| GleanerError::Browser(format!("failed to read rendered HTML of {url}: {e}")))
    }
}

/// Awaits `work`, then `cleanup`, whether or not `work` succeeded.
async fn with_cleanup<T>(work: impl Future<Output = Result<T>>, cleanup: impl Future<Output = ()>) -> Result<T> {
    let result = work.await;
    cleanup.await;
    result
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Browser
    }

    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<FetchedContent> {
        Url::parse(url).map_err(|e| GleanerError::InvalidUrl(format!("{url}: {e}")))?;

        let mut slot = self.session.lock().await;
        if let Some(previous) = slot.take() {
            previous.shutdown().await;
        }

        let timeout = self.config.timeout();
        let work = async {
            let session = slot.insert(Session::connect(&self.config.control_url).await?);
            tracing::debug!(url, control_url = %self.config.control_url, "browser connected");
            self.render(&session.browser, url).await
        };
        let html = cancellable(ctx, async {
            tokio::time::timeout(timeout, work)
                .await
                .map_err(|_| GleanerError::Timeout { timeout: self.config.timeout_secs })?
        })
        .await?;

        let content = Content { html, ..Content::new(url) };
        Ok(FetchedContent { content_type: "text/html".to_string(), ..FetchedContent::from_content(content) })
    }

    async fn close(&self) -> Result<()> {
        if let Some(session) = self.session.lock().await.take() {
            session.shutdown().await;
        }
        Ok(())
    }
}
