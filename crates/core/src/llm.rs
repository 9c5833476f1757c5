//! Language model contract consumed by the summary processors.
//!
//! gleaner does not ship a model client. Callers plug one in by implementing
//! [`LanguageModel`]; the processors only rely on the two operations below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Model identifier understood by the client.
    pub model: String,
    /// Ask the client to stream partial output through the callback.
    pub streaming: bool,
}

impl CompletionOptions {
    pub fn model(model: impl Into<String>) -> Self {
        Self { model: model.into(), streaming: false }
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One piece of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ImageUrl { url: String },
    InlineImage { mime_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, parts: vec![Part::Text { text: text.into() }] }
    }

    pub fn user(parts: Vec<Part>) -> Self {
        Self { role: Role::User, parts }
    }
}

/// Receives model output as it is produced.
///
/// With streaming enabled the callback sees each chunk; otherwise it is invoked
/// once with the complete response.
pub type StreamCallback<'a> = &'a (dyn Fn(&str) -> Result<()> + Send + Sync);

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Completes a single text prompt.
    async fn text_completion(&self, ctx: &CancellationToken, prompt: &str, options: &CompletionOptions)
    -> Result<String>;

    /// Generates a response to a message list, reporting output through `callback`.
    /// Returns the full response text.
    async fn generate_content(
        &self, ctx: &CancellationToken, messages: &[Message], callback: StreamCallback<'_>,
        options: &CompletionOptions,
    ) -> Result<String>;
}
