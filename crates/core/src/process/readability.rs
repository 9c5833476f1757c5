use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Processor, ensure_active};
use crate::content::Content;
use crate::extract::{ExtractConfig, extract_article};
use crate::parse::Document;
use crate::preprocess::PreprocessConfig;
use crate::{GleanerError, Result};

/// Configuration for readability extraction.
///
/// # Example
///
/// ```rust
/// use gleaner_core::ReadabilityConfig;
///
/// let config = ReadabilityConfig { keep_classes: true, ..Default::default() };
/// assert!(config.remove_unlikely);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadabilityConfig {
    /// Paragraphs shorter than this are not scored (default: 25).
    pub min_paragraph_chars: usize,
    /// Drop elements whose class or id looks like navigation, ads, or comments (default: true).
    pub remove_unlikely: bool,
    /// Keep `class` and `id` attributes in the cleaned HTML (default: false).
    pub keep_classes: bool,
}

impl Default for ReadabilityConfig {
    fn default() -> Self {
        Self { min_paragraph_chars: 25, remove_unlikely: true, keep_classes: false }
    }
}

impl ReadabilityConfig {
    fn extract_config(&self) -> ExtractConfig {
        let mut config = ExtractConfig {
            preprocess: PreprocessConfig { remove_unlikely: self.remove_unlikely, ..Default::default() },
            ..Default::default()
        };
        config.score.min_paragraph_chars = self.min_paragraph_chars;
        config.postprocess.keep_classes = self.keep_classes;
        config
    }
}

/// Replaces raw page markup with the main article and fills the descriptive fields.
///
/// Metadata comes from the raw page (before cleanup strips `<head>` scripts such as
/// JSON-LD); `html`, `text` and `image` come from the extracted article. Missing fields
/// are left untouched, so values set by the fetcher survive.
#[derive(Debug, Clone, Default)]
pub struct ReadabilityProcessor {
    config: ReadabilityConfig,
}

impl ReadabilityProcessor {
    pub fn new(config: ReadabilityConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Processor for ReadabilityProcessor {
    fn name(&self) -> &str {
        "readability"
    }

    async fn process(&self, ctx: &CancellationToken, content: &mut Content) -> Result<()> {
        ensure_active(ctx)?;

        let base = Url::parse(&content.url).ok();
        if base.is_none() {
            tracing::debug!(url = %content.url, "unparseable document URL, extracting without base");
        }

        let metadata = Document::parse(&content.html, base.clone()).extract_metadata();
        let article = extract_article(&content.html, base.as_ref(), &self.config.extract_config()).ok_or_else(|| {
            GleanerError::Extraction { url: content.url.clone(), reason: "no readable content found".to_string() }
        })?;

        let fields = [
            (&mut content.title, metadata.title),
            (&mut content.author, metadata.author),
            (&mut content.description, metadata.description),
            (&mut content.site_name, metadata.site_name),
            (&mut content.cover, metadata.cover),
            (&mut content.favicon, metadata.favicon),
            (&mut content.image, article.image),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }

        content.published_time = metadata.published_time.or(content.published_time);
        content.modified_time = metadata.modified_time.or(content.modified_time);
        content.html = article.html;
        content.text = article.text;

        tracing::debug!(url = %content.url, score = article.top_score, title = %content.title, "article extracted");
        Ok(())
    }
}
