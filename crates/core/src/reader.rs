//! Fetch-then-process orchestration.
//!
//! # Example
//!
//! ```rust,no_run
//! use gleaner_core::{HttpFetcher, HttpFetcherConfig, MarkdownProcessor, ReadabilityProcessor, Reader};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> gleaner_core::Result<()> {
//! let reader = Reader::builder(HttpFetcher::new(HttpFetcherConfig::default())?)
//!     .processor(ReadabilityProcessor::default())
//!     .processor(MarkdownProcessor::default())
//!     .build();
//!
//! let outcome = reader.read(&CancellationToken::new(), "https://example.com").await?;
//! println!("{}", outcome.content.markdown);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use encoding_rs::{Encoding, UTF_8};
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use crate::content::{Body, Content};
use crate::fetch::{Fetcher, FetcherKind, cancellable};
use crate::logger::{Logger, NoopLogger};
use crate::process::Processor;
use crate::{GleanerError, Result};

/// Result of one processor run.
#[derive(Debug)]
pub struct StageOutcome {
    pub name: String,
    pub error: Option<GleanerError>,
    pub elapsed: Duration,
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-stage outcomes of a processing run, in execution order.
#[derive(Debug, Default)]
pub struct ProcessReport {
    pub outcomes: Vec<StageOutcome>,
}

impl ProcessReport {
    /// True when every stage succeeded.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(StageOutcome::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    /// Outcome of the stage named `name`, if it ran.
    pub fn outcome(&self, name: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

impl fmt::Display for ProcessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(f, "{} stages, {} failed", self.outcomes.len(), failed)
    }
}

/// Content produced by [`Reader::read`] together with the processing report.
#[derive(Debug)]
pub struct ReadOutcome {
    pub content: Content,
    pub report: ProcessReport,
    /// True when the raw content came from a cache instead of the network.
    pub cached: bool,
}

/// Runs one fetcher followed by an ordered processor chain.
///
/// The fetcher is closed after every fetch, so a reader serves a single URL unless its
/// fetcher tolerates reuse after `close`. Build one reader per URL.
pub struct Reader {
    fetcher: Box<dyn Fetcher>,
    processors: Vec<Box<dyn Processor>>,
    logger: Arc<dyn Logger>,
}

impl Reader {
    pub fn new(fetcher: impl Fetcher + 'static) -> Self {
        Self { fetcher: Box::new(fetcher), processors: Vec::new(), logger: Arc::new(NoopLogger) }
    }

    pub fn builder(fetcher: impl Fetcher + 'static) -> ReaderBuilder {
        ReaderBuilder { reader: Self::new(fetcher) }
    }

    /// Appends a processor to the end of the chain.
    pub fn add_processor(&mut self, processor: impl Processor + 'static) {
        self.processors.push(Box::new(processor));
    }

    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        self.logger = logger;
    }

    pub fn fetcher_kind(&self) -> FetcherKind {
        self.fetcher.kind()
    }

    /// Names of the registered processors in execution order.
    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Fetches `url` and returns the raw content. The fetcher is closed afterwards
    /// whether or not the fetch succeeded; a close failure is logged, not returned.
    pub async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<Content> {
        let started = Instant::now();
        let result = self.fetch_content(ctx, url).await;

        if let Err(e) = self.fetcher.close().await {
            self.logger.error("failed to close fetcher", &[("url", &url), ("error", &e)]);
        }

        match &result {
            Ok(content) => {
                let elapsed_ms = started.elapsed().as_millis();
                self.logger.info(
                    "fetched",
                    &[("url", &url), ("fetcher", &self.fetcher.kind()), ("bytes", &content.html.len()), ("elapsed_ms", &elapsed_ms)],
                );
            }
            Err(e) => self.logger.error("fetch failed", &[("url", &url), ("fetcher", &self.fetcher.kind()), ("error", e)]),
        }
        result
    }

    async fn fetch_content(&self, ctx: &CancellationToken, url: &str) -> Result<Content> {
        let fetched = self.fetcher.fetch(ctx, url).await?;
        let mut content = fetched.content;
        if content.html.is_empty()
            && let Some(body) = fetched.body
        {
            content.html = cancellable(ctx, drain(body, &fetched.content_type)).await?;
        }
        Ok(content)
    }

    /// Runs every processor in registration order. A failing stage is logged and the chain
    /// continues; failures are reported in the returned [`ProcessReport`].
    pub async fn process(&self, ctx: &CancellationToken, content: &mut Content) -> ProcessReport {
        let mut report = ProcessReport { outcomes: Vec::with_capacity(self.processors.len()) };

        for processor in &self.processors {
            let name = processor.name();
            let started = Instant::now();
            let result = processor.process(ctx, content).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(()) => self.logger.info(
                    "processor finished",
                    &[("processor", &name), ("url", &content.url), ("elapsed_ms", &elapsed.as_millis())],
                ),
                Err(e) => {
                    self.logger.error("processor failed", &[("processor", &name), ("url", &content.url), ("error", e)])
                }
            }

            report.outcomes.push(StageOutcome { name: name.to_string(), error: result.err(), elapsed });
        }

        report
    }

    /// Fetches then processes `url`. A fetch error is returned before any processor runs.
    pub async fn read(&self, ctx: &CancellationToken, url: &str) -> Result<ReadOutcome> {
        let mut content = self.fetch(ctx, url).await?;
        let report = self.process(ctx, &mut content).await;
        Ok(ReadOutcome { content, report, cached: false })
    }
}

/// Collects a streamed body into a string, decoded with the charset named in `content_type`.
async fn drain(body: Body, content_type: &str) -> Result<String> {
    let bytes = body
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(decode(&bytes, content_type))
}

/// Decodes `bytes` with the `charset` parameter of a `Content-Type` value. Unknown or
/// missing charsets fall back to UTF-8; malformed sequences become U+FFFD.
fn decode(bytes: &[u8], content_type: &str) -> String {
    let encoding = content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .and_then(|(_, label)| Encoding::for_label(label.trim().trim_matches('"').as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Builder for [`Reader`].
pub struct ReaderBuilder {
    reader: Reader,
}

impl ReaderBuilder {
    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.reader.add_processor(processor);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.reader.set_logger(logger);
        self
    }

    pub fn build(self) -> Reader {
        self.reader
    }
}
