//! Content transformation stages.
//!
//! A [`Processor`] mutates a [`Content`] in place. The [`Reader`](crate::Reader) runs its
//! processors strictly in registration order, so a stage may rely on the fields filled by
//! the stages before it (markdown conversion expects readability to have cleaned `html`).
//! Nothing enforces that order at runtime.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::content::Content;
use crate::{GleanerError, Result};

pub mod image;
pub mod markdown;
pub mod readability;
pub mod summary;

pub use image::{ImageSource, ImageSummary, ImageSummaryConfig, ImageSummaryProcessor, encode_image, parse_image_summary};
pub use markdown::{MarkdownConfig, MarkdownProcessor};
pub use readability::{ReadabilityConfig, ReadabilityProcessor};
pub use summary::{SummaryConfig, SummaryProcessor};

#[async_trait]
pub trait Processor: Send + Sync {
    /// Stage name used in logs and process reports.
    fn name(&self) -> &str;

    /// Transforms `content`. Implementations return [`GleanerError::Cancelled`] without
    /// touching `content` when `ctx` is already cancelled.
    async fn process(&self, ctx: &CancellationToken, content: &mut Content) -> Result<()>;
}

/// Fails fast when the caller has given up.
pub(crate) fn ensure_active(ctx: &CancellationToken) -> Result<()> {
    if ctx.is_cancelled() { Err(GleanerError::Cancelled) } else { Ok(()) }
}
