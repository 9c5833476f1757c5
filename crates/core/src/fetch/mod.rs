//! Content retrieval backends.
//!
//! A [`Fetcher`] turns a URL into a [`FetchedContent`]. Four backends exist:
//!
//! - [`HttpFetcher`]: plain HTTP with retry and redirect policy
//! - [`BrowserFetcher`]: rendered HTML from a remote Chrome over the DevTools protocol
//! - [`RemoteReaderFetcher`]: a third-party reader service that returns extracted JSON
//! - [`ThreadFetcher`]: social media reply threads from the public syndication endpoint
//!
//! Callers must call [`Fetcher::close`] exactly once when they are done with a fetcher.

use std::fmt;
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::content::FetchedContent;
use crate::{GleanerError, Result};

pub mod browser;
pub mod http;
pub mod remote;
pub mod thread;

pub use browser::{BrowserFetcher, BrowserFetcherConfig};
pub use http::{HttpFetcher, HttpFetcherConfig, HttpFetcherConfigBuilder};
pub use remote::{RemoteReaderConfig, RemoteReaderFetcher};
pub use thread::{ThreadFetcher, ThreadFetcherConfig, is_thread_url, thread_token, tweet_id_from_url};

/// Browser-like User-Agent sent by the HTTP based fetchers unless overridden.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; Gleaner/0.1; +https://github.com/gleaner-rs/gleaner)";

/// Identifies a fetcher backend. Used as the cache key discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    Http,
    Browser,
    Remote,
    Thread,
}

impl FetcherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetcherKind::Http => "http",
            FetcherKind::Browser => "browser",
            FetcherKind::Remote => "remote",
            FetcherKind::Thread => "thread",
        }
    }
}

impl fmt::Display for FetcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn kind(&self) -> FetcherKind;

    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<FetchedContent>;

    /// Releases connections held by the fetcher.
    async fn close(&self) -> Result<()>;
}

/// Runs `fut` unless `ctx` is cancelled first.
pub(crate) async fn cancellable<T>(ctx: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    if ctx.is_cancelled() {
        return Err(GleanerError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(GleanerError::Cancelled),
        result = fut => result,
    }
}

/// Sleeps for `delay`, returning early with `Cancelled` if `ctx` fires.
pub(crate) async fn pause(ctx: &CancellationToken, delay: Duration) -> Result<()> {
    cancellable(ctx, async {
        tokio::time::sleep(delay).await;
        Ok(())
    })
    .await
}

/// A reqwest client that can be released by `close`.
///
/// Dropping the client drops its idle connection pool.
pub(crate) struct ClientSlot(RwLock<Option<Client>>);

impl ClientSlot {
    pub(crate) fn new(client: Client) -> Self {
        Self(RwLock::new(Some(client)))
    }

    pub(crate) fn get(&self) -> Result<Client> {
        let guard = self.0.read().map_err(|_| GleanerError::Closed)?;
        guard.clone().ok_or(GleanerError::Closed)
    }

    pub(crate) fn release(&self) {
        if let Ok(mut guard) = self.0.write() {
            guard.take();
        }
    }
}
