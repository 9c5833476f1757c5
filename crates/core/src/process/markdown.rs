use async_trait::async_trait;
use htmd::HtmlToMarkdown;
use htmd::options::{HeadingStyle, Options};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Processor, ensure_active};
use crate::content::Content;
use crate::postprocess::{PostProcessConfig, postprocess_html};
use crate::{GleanerError, Result};

/// Configuration for markdown conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    /// Rewrite relative links and image sources against `Content::url` before
    /// converting (default: true).
    pub resolve_links: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self { resolve_links: true }
    }
}

/// Renders `Content::html` as Markdown into `Content::markdown`.
///
/// Converts whatever `html` holds; it does not check that readability ran first.
#[derive(Debug, Clone, Default)]
pub struct MarkdownProcessor {
    config: MarkdownConfig,
}

impl MarkdownProcessor {
    pub fn new(config: MarkdownConfig) -> Self {
        Self { config }
    }

    /// Converts `html` to Markdown, resolving links against `base` when configured.
    pub fn convert(&self, html: &str, base: Option<&Url>) -> Result<String> {
        self.render(html, base).map_err(|e| GleanerError::Conversion(e.to_string()))
    }

    fn render(&self, html: &str, base: Option<&Url>) -> std::io::Result<String> {
        let html = match base {
            Some(base) if self.config.resolve_links => postprocess_html(
                html,
                &PostProcessConfig { base_url: Some(base.clone()), keep_classes: true, max_empty_passes: 0 },
            ),
            _ => html.to_string(),
        };

        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec!["script", "style", "noscript"])
            .options(Options { heading_style: HeadingStyle::Atx, ..Default::default() })
            .build();

        Ok(converter.convert(&html)?.trim().to_string())
    }
}

#[async_trait]
impl Processor for MarkdownProcessor {
    fn name(&self) -> &str {
        "markdown"
    }

    async fn process(&self, ctx: &CancellationToken, content: &mut Content) -> Result<()> {
        ensure_active(ctx)?;
        let base = Url::parse(&content.url).ok();
        content.markdown = self
            .render(&content.html, base.as_ref())
            .map_err(|e| GleanerError::Conversion(format!("{}: {e}", content.url)))?;
        tracing::debug!(url = %content.url, chars = content.markdown.len(), "converted to markdown");
        Ok(())
    }
}
