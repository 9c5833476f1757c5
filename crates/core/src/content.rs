//! The document model passed through the pipeline.
//!
//! A fetcher creates a [`Content`] (wrapped in [`FetchedContent`] together with the raw
//! transport details), the reader drains the body into [`Content::html`], and each
//! processor then fills in more fields.

use std::fmt;

use futures::stream::BoxStream;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::Result;

/// A streamed response body.
///
/// Dropping the stream releases the underlying connection, so every path that
/// does not fully drain it still closes it.
pub type Body = BoxStream<'static, Result<Vec<u8>>>;

/// A normalized web document.
///
/// String fields are empty when unknown. Timestamps are `None` when the source does
/// not state them and are omitted from serialized output in that case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    pub url: String,
    pub title: String,
    /// Raw markup after fetching, boilerplate-stripped markup after readability.
    pub html: String,
    pub text: String,
    pub markdown: String,
    pub summary: String,
    pub cover: String,
    pub favicon: String,
    pub image: String,
    pub author: String,
    pub description: String,
    pub site_name: String,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub published_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<OffsetDateTime>,
}

impl Content {
    /// Creates an empty document for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Default::default() }
    }
}

/// The result of a fetch: the document plus transport-level detail.
pub struct FetchedContent {
    pub content: Content,
    /// Unread response body; `None` when the fetcher filled `content` directly.
    pub body: Option<Body>,
    pub status: u16,
    pub content_type: String,
    pub headers: HeaderMap,
}

impl FetchedContent {
    /// Wraps a document that the fetcher already populated itself.
    pub fn from_content(content: Content) -> Self {
        Self { content, body: None, status: 200, content_type: String::new(), headers: HeaderMap::new() }
    }
}

impl fmt::Debug for FetchedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedContent")
            .field("content", &self.content)
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .finish()
    }
}
