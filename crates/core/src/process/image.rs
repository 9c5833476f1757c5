//! Image description through a vision-capable language model.
//!
//! Images are not part of the regular chain: [`ImageSummaryProcessor`] registers as a
//! processor but its `process` hook does nothing. Callers describe an image explicitly with
//! [`ImageSummaryProcessor::describe`] or [`ImageSummaryProcessor::describe_streaming`] and
//! apply the result with [`ImageSummary::apply`].

use std::path::Path;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use super::{Processor, ensure_active};
use crate::content::Content;
use crate::fetch::cancellable;
use crate::llm::{CompletionOptions, LanguageModel, Message, Part, StreamCallback};
use crate::{GleanerError, Result};

const SYSTEM_PROMPT: &str = "\
You describe images for a bookmarking service. Answer using exactly these tags:
<title>a short title, at most ten words</title>
<description>two or three sentences describing the image and any visible text</description>
<tags>comma-separated lowercase keywords</tags>";

const INSTRUCTION: &str = "Describe this image.";

static TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<title>(.*?)</title>").expect("valid regex"));
static DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<description>(.*?)</description>").expect("valid regex"));
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<tags>(.*?)</tags>").expect("valid regex"));

/// Configuration for image description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSummaryConfig {
    /// Vision-capable model identifier.
    pub model: String,
}

impl Default for ImageSummaryConfig {
    fn default() -> Self {
        Self { model: "gpt-4o".to_string() }
    }
}

/// Where the model finds the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// A URL the model provider can fetch itself.
    Url(String),
    /// Base64 image data for providers that do not fetch URLs.
    Inline { mime_type: String, data: String },
}

impl ImageSource {
    fn into_part(self) -> Part {
        match self {
            ImageSource::Url(url) => Part::ImageUrl { url },
            ImageSource::Inline { mime_type, data } => Part::InlineImage { mime_type, data },
        }
    }
}

/// Structured description parsed from the model's tagged answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl ImageSummary {
    /// Fills empty `title`/`description` and sets `summary` to the description.
    pub fn apply(&self, content: &mut Content) {
        if content.title.is_empty() {
            content.title = self.title.clone();
        }
        if content.description.is_empty() {
            content.description = self.description.clone();
        }
        if !self.description.is_empty() {
            content.summary = self.description.clone();
        }
    }
}

/// Extracts `<title>`, `<description>` and `<tags>` from a model answer. Missing tags
/// leave the field empty; tags are split on commas, trimmed, and empty entries dropped.
pub fn parse_image_summary(output: &str) -> ImageSummary {
    let capture = |re: &Regex| re.captures(output).map(|c| c[1].trim().to_string()).unwrap_or_default();
    let tags = capture(&*TAGS)
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    ImageSummary { title: capture(&*TITLE), description: capture(&*DESCRIPTION), tags }
}

/// Reads an image and encodes it as an inline [`ImageSource`].
///
/// The MIME type comes from the PNG, JPEG, GIF or WebP signature, then from the
/// extension of `filename`, and finally defaults to `application/octet-stream`.
pub async fn encode_image<R: AsyncRead + Unpin>(mut reader: R, filename: Option<&str>) -> Result<ImageSource> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await?;

    let mime_type = sniff_mime(&bytes)
        .or_else(|| filename.and_then(mime_from_extension))
        .unwrap_or("application/octet-stream");

    Ok(ImageSource::Inline { mime_type: mime_type.to_string(), data: STANDARD.encode(&bytes) })
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

fn mime_from_extension(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

/// Describes images with a vision model.
pub struct ImageSummaryProcessor {
    model: Arc<dyn LanguageModel>,
    config: ImageSummaryConfig,
}

impl ImageSummaryProcessor {
    pub fn new(model: Arc<dyn LanguageModel>, config: ImageSummaryConfig) -> Self {
        Self { model, config }
    }

    fn messages(source: ImageSource) -> Vec<Message> {
        vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(vec![Part::Text { text: INSTRUCTION.to_string() }, source.into_part()]),
        ]
    }

    /// Describes the image in one request. `callback` receives the complete answer once.
    pub async fn describe(
        &self, ctx: &CancellationToken, source: ImageSource, callback: StreamCallback<'_>,
    ) -> Result<ImageSummary> {
        self.generate(ctx, source, callback, false).await
    }

    /// Describes the image with streaming enabled. `callback` receives each chunk as the
    /// model produces it.
    pub async fn describe_streaming(
        &self, ctx: &CancellationToken, source: ImageSource, callback: StreamCallback<'_>,
    ) -> Result<ImageSummary> {
        self.generate(ctx, source, callback, true).await
    }

    async fn generate(
        &self, ctx: &CancellationToken, source: ImageSource, callback: StreamCallback<'_>, streaming: bool,
    ) -> Result<ImageSummary> {
        ensure_active(ctx)?;
        let options = CompletionOptions::model(&self.config.model).streaming(streaming);
        let messages = Self::messages(source);

        let output = cancellable(ctx, self.model.generate_content(ctx, &messages, callback, &options))
            .await
            .map_err(|e| match e {
                GleanerError::Cancelled => e,
                other => GleanerError::Summarization(format!("image description: {other}")),
            })?;

        let summary = parse_image_summary(&output);
        tracing::debug!(model = %self.config.model, streaming, tags = summary.tags.len(), "image described");
        Ok(summary)
    }
}

#[async_trait]
impl Processor for ImageSummaryProcessor {
    fn name(&self) -> &str {
        "image-summary"
    }

    async fn process(&self, ctx: &CancellationToken, _content: &mut Content) -> Result<()> {
        ensure_active(ctx)
    }
}
