//! Memoization of raw fetch results.
//!
//! [`CachedReader`] stores the content a fetcher returned, before any processor ran, as
//! JSON under [`cache_key`]. On a hit the network is skipped but the full processor chain
//! runs again, so extraction and summaries always reflect the current chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::content::Content;
use crate::fetch::FetcherKind;
use crate::reader::{ReadOutcome, Reader};

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for `key`, or `None` if missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached fetch in seconds (default: 86400, one day).
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 24 * 60 * 60 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Key under which the raw fetch of `url` by a `kind` fetcher is stored.
pub fn cache_key(kind: FetcherKind, url: &str) -> String {
    format!("gleaner:fetch:{kind}:{url}")
}

/// In-process [`CacheStore`]. Expired entries are dropped when read and swept on every write.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, expires_at)) if Instant::now() >= *expires_at => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}

/// Builds the [`Reader`] for one read.
pub type ReaderFactory = Box<dyn Fn() -> Result<Reader> + Send + Sync>;

/// Reads whose fetches go through a [`CacheStore`].
///
/// A [`Reader`] closes its fetcher once its fetch is done, so every read builds a fresh
/// one from the factory. Cache failures never fail a read: a broken entry or an
/// unavailable store falls back to fetching.
pub struct CachedReader {
    factory: ReaderFactory,
    cache: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl CachedReader {
    pub fn new<F>(factory: F, cache: Arc<dyn CacheStore>, config: CacheConfig) -> Self
    where
        F: Fn() -> Result<Reader> + Send + Sync + 'static,
    {
        Self { factory: Box::new(factory), cache, config }
    }

    /// Reads `url`, serving the raw content from cache when possible.
    pub async fn read(&self, ctx: &CancellationToken, url: &str) -> Result<ReadOutcome> {
        let reader = (self.factory)()?;
        let key = cache_key(reader.fetcher_kind(), url);

        let (mut content, cached) = match self.lookup(&key).await {
            Some(content) => {
                tracing::debug!(key, "cache hit");
                (content, true)
            }
            None => {
                let content = reader.fetch(ctx, url).await?;
                self.store(&key, &content).await;
                (content, false)
            }
        };

        let report = reader.process(ctx, &mut content).await;
        Ok(ReadOutcome { content, report, cached })
    }

    async fn lookup(&self, key: &str) -> Option<Content> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding malformed cache entry");
                None
            }
        }
    }

    async fn store(&self, key: &str, content: &Content) {
        let raw = match serde_json::to_string(content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize content for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, raw, self.config.ttl()).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::GleanerError;
    use crate::content::FetchedContent;
    use crate::fetch::Fetcher;
    use crate::process::Processor;

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        fn kind(&self) -> FetcherKind {
            FetcherKind::Browser
        }

        async fn fetch(&self, _ctx: &CancellationToken, url: &str) -> Result<FetchedContent> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(GleanerError::Closed);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedContent::from_content(Content { html: "<p>raw</p>".to_string(), ..Content::new(url) }))
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Upper {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Processor for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn process(&self, _ctx: &CancellationToken, content: &mut Content) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            content.html = content.html.to_uppercase();
            Ok(())
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(GleanerError::Cache("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
            Err(GleanerError::Cache("connection refused".to_string()))
        }
    }

    fn cached_reader(cache: Arc<dyn CacheStore>) -> (CachedReader, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));
        let (f, p) = (fetches.clone(), processed.clone());
        let factory = move || {
            Ok(Reader::builder(CountingFetcher { calls: f.clone(), closed: AtomicBool::new(false) })
                .processor(Upper { calls: p.clone() })
                .build())
        };
        (CachedReader::new(factory, cache, CacheConfig::default()), fetches, processed)
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key(FetcherKind::Http, "https://a.example/x"), "gleaner:fetch:http:https://a.example/x");
        assert_eq!(CacheConfig::default().ttl(), Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set("live", "1".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.set("dead", "2".to_string(), Duration::ZERO).await.unwrap();

        assert_eq!(cache.get("live").await.unwrap().as_deref(), Some("1"));
        assert_eq!(cache.get("dead").await.unwrap(), None);
        assert_eq!(cache.get("missing").await.unwrap(), None);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_cache_sweeps_on_write() {
        let cache = MemoryCache::new();
        cache.set("a", "1".to_string(), Duration::ZERO).await.unwrap();
        cache.set("b", "2".to_string(), Duration::ZERO).await.unwrap();
        cache.set("c", "3".to_string(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("c").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_each_miss_gets_an_open_fetcher() {
        let (reader, fetches, _) = cached_reader(Arc::new(MemoryCache::new()));
        let ctx = CancellationToken::new();

        for url in ["https://example.com/a", "https://example.com/b", "https://example.com/c"] {
            let outcome = reader.read(&ctx, url).await.unwrap();
            assert_eq!(outcome.content.url, url);
            assert!(!outcome.cached);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_factory_error_fails_read() {
        let reader = CachedReader::new(
            || Err(GleanerError::InvalidUrl("bad endpoint".to_string())),
            Arc::new(MemoryCache::new()),
            CacheConfig::default(),
        );
        let err = reader.read(&CancellationToken::new(), "https://example.com/a").await.err().unwrap();
        assert!(matches!(err, GleanerError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_hit_skips_fetch_but_reprocesses() {
        let store = Arc::new(MemoryCache::new());
        let (reader, fetches, processed) = cached_reader(store.clone());
        let ctx = CancellationToken::new();

        let first = reader.read(&ctx, "https://example.com/a").await.unwrap();
        let second = reader.read(&ctx, "https://example.com/a").await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(processed.load(Ordering::SeqCst), 2);
        assert_eq!(second.content.html, "<P>RAW</P>");

        let raw = store.get("gleaner:fetch:browser:https://example.com/a").await.unwrap().unwrap();
        let stored: Content = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.html, "<p>raw</p>");
    }

    #[tokio::test]
    async fn test_malformed_entry_refetches() {
        let store = Arc::new(MemoryCache::new());
        store
            .set("gleaner:fetch:browser:https://example.com/a", "{not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let (reader, fetches, _) = cached_reader(store);

        let outcome = reader.read(&CancellationToken::new(), "https://example.com/a").await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broken_store_falls_back_to_fetch() {
        let (reader, fetches, _) = cached_reader(Arc::new(BrokenCache));
        let outcome = reader.read(&CancellationToken::new(), "https://example.com/a").await.unwrap();
        assert_eq!(outcome.content.html, "<P>RAW</P>");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
