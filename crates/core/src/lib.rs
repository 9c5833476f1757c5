//! Fetch web content and normalize it into clean HTML, text, Markdown, and summaries.
//!
//! A [`Reader`] pairs one [`Fetcher`] with an ordered chain of [`Processor`]s. Fetch
//! failures abort a read; processor failures are recorded in a [`ProcessReport`] and
//! the chain carries on.

pub mod cache;
pub mod content;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod formatters;
pub mod llm;
pub mod logger;
pub mod metadata;
pub mod parse;
pub mod postprocess;
pub mod preprocess;
pub mod process;
pub mod reader;
pub mod scoring;

pub use cache::{CacheConfig, CacheStore, CachedReader, MemoryCache, ReaderFactory, cache_key};
pub use content::{Body, Content, FetchedContent};
pub use error::{GleanerError, Result};
#[doc(hidden)]
pub use extract::{Article, ExtractConfig, extract_article};
pub use fetch::{
    BrowserFetcher, BrowserFetcherConfig, Fetcher, FetcherKind, HttpFetcher, HttpFetcherConfig,
    HttpFetcherConfigBuilder, RemoteReaderConfig, RemoteReaderFetcher, ThreadFetcher, ThreadFetcherConfig,
    is_thread_url, thread_token, tweet_id_from_url,
};
pub use formatters::{DocumentConfig, slugify, to_json, to_markdown_document, to_markdown_document_with_config};
pub use llm::{CompletionOptions, LanguageModel, Message, Part, Role, StreamCallback};
pub use logger::{Logger, NoopLogger, TracingLogger};
pub use metadata::Metadata;
pub use parse::Document;
#[doc(hidden)]
pub use postprocess::{PostProcessConfig, postprocess_html};
#[doc(hidden)]
pub use preprocess::{PreprocessConfig, preprocess_html};
pub use process::{
    ImageSource, ImageSummary, ImageSummaryConfig, ImageSummaryProcessor, MarkdownConfig, MarkdownProcessor,
    Processor, ReadabilityConfig, ReadabilityProcessor, SummaryConfig, SummaryProcessor, encode_image,
    parse_image_summary,
};
pub use reader::{ProcessReport, ReadOutcome, Reader, ReaderBuilder, StageOutcome};
#[doc(hidden)]
pub use scoring::ScoreConfig;
