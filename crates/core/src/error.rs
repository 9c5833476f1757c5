//! Error types for gleaner operations.
//!
//! Every stage of the pipeline reports failures through [`GleanerError`]. Messages carry
//! the operation and the URL involved so a multi-stage failure stays diagnosable from
//! its `Display` output alone.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::GleanerError;
//!
//! let err = GleanerError::Status { url: "https://example.com".into(), status: 503 };
//! assert!(err.to_string().contains("503"));
//! assert!(err.is_transport());
//! ```

use thiserror::Error;

/// Main error type for fetching and processing.
///
/// Transport variants are retried by the HTTP fetcher; processing variants are
/// logged by the reader's best-effort chain and never abort it.
#[derive(Error, Debug)]
pub enum GleanerError {
    /// HTTP request errors from reqwest.
    ///
    /// This variant wraps network errors, DNS failures, connection issues,
    /// and other HTTP-related problems.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a status code of 400 or above.
    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The redirect chain was longer than the configured ceiling.
    #[error("stopped after {max} redirects")]
    TooManyRedirects { max: usize },

    /// The response body grew past the configured limit while streaming.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Every attempt of a retried fetch failed.
    ///
    /// `source` is the error of the final attempt.
    #[error("all fetch attempts failed for {url} ({attempts} attempts): {source}")]
    RetriesExhausted {
        url: String,
        attempts: usize,
        source: Box<GleanerError>,
    },

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// Request timeout.
    ///
    /// Returned when a request exceeds the configured timeout duration.
    #[error("request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// Invalid URL provided.
    ///
    /// Returned when a URL cannot be parsed or does not match what a fetcher expects.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The fetcher was used after `close`.
    #[error("fetcher already closed")]
    Closed,

    /// Browser automation failures (connection, navigation, script evaluation).
    #[error("browser automation failed: {0}")]
    Browser(String),

    /// Remote reader service failures.
    #[error("reader API error: {0}")]
    ReaderApi(String),

    /// Social thread fetch failures.
    #[error("thread fetch failed: {0}")]
    Thread(String),

    /// Readability could not produce an article from the document.
    #[error("failed to extract readable content from {url}: {reason}")]
    Extraction { url: String, reason: String },

    /// HTML to Markdown conversion failures.
    #[error("markdown conversion failed: {0}")]
    Conversion(String),

    /// Summarization failures, including malformed model output.
    #[error("summarization failed: {0}")]
    Summarization(String),

    /// Errors reported by the language model client.
    #[error("LLM request failed: {0}")]
    Llm(String),

    /// Cache store failures.
    #[error("cache error: {0}")]
    Cache(String),

    /// JSON encoding or decoding errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors while reading bodies or image streams.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GleanerError {
    /// Returns true when the error comes from cancellation rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            GleanerError::Cancelled => true,
            GleanerError::RetriesExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Returns true for network-level failures: connection errors, timeouts,
    /// bad status codes, and redirect limits.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GleanerError::Http(_)
                | GleanerError::Status { .. }
                | GleanerError::TooManyRedirects { .. }
                | GleanerError::BodyTooLarge { .. }
                | GleanerError::Timeout { .. }
                | GleanerError::RetriesExhausted { .. }
        )
    }
}

/// Result type alias for GleanerError.
pub type Result<T> = std::result::Result<T, GleanerError>;
