use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{Processor, ensure_active};
use crate::content::Content;
use crate::fetch::cancellable;
use crate::llm::{CompletionOptions, LanguageModel};
use crate::{GleanerError, Result};

const PROMPT_TEMPLATE: &str = "\
You are an analyst preparing a briefing. Read the web page below and write a concise summary.

Cover:
- the central claim or purpose of the page
- the key facts, figures, and arguments that support it
- any conclusions, caveats, or open questions

Write plain prose in the language of the page. Do not mention HTML or the page structure.

<page>
{content}
</page>";

/// Configuration for the text summary stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Model identifier passed to the language model client.
    pub model: String,
    /// Inputs shorter than this many characters are not summarized (default: 1000).
    pub min_length: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self { model: "gpt-4o-mini".to_string(), min_length: 1000 }
    }
}

/// Summarizes `Content::html` into `Content::summary` with a language model.
///
/// Short pages are skipped without error.
pub struct SummaryProcessor {
    model: Arc<dyn LanguageModel>,
    config: SummaryConfig,
}

impl SummaryProcessor {
    pub fn new(model: Arc<dyn LanguageModel>, config: SummaryConfig) -> Self {
        Self { model, config }
    }

    /// The prompt sent for `html`.
    pub fn prompt(html: &str) -> String {
        PROMPT_TEMPLATE.replace("{content}", html)
    }
}

#[async_trait]
impl Processor for SummaryProcessor {
    fn name(&self) -> &str {
        "summary"
    }

    async fn process(&self, ctx: &CancellationToken, content: &mut Content) -> Result<()> {
        ensure_active(ctx)?;

        let length = content.html.chars().count();
        if length < self.config.min_length {
            tracing::debug!(url = %content.url, length, min = self.config.min_length, "too short to summarize");
            return Ok(());
        }

        let options = CompletionOptions::model(&self.config.model);
        let prompt = Self::prompt(&content.html);
        let summary = cancellable(ctx, self.model.text_completion(ctx, &prompt, &options))
            .await
            .map_err(|e| match e {
                GleanerError::Cancelled => e,
                other => GleanerError::Summarization(format!("{}: {other}", content.url)),
            })?;

        content.summary = summary.trim().to_string();
        tracing::debug!(url = %content.url, model = %self.config.model, chars = content.summary.len(), "summarized");
        Ok(())
    }
}
