//! Output renderings of a finished [`Content`](crate::content::Content).

pub mod json;
pub mod markdown;

pub use json::to_json;
pub use markdown::{DocumentConfig, slugify, to_markdown_document, to_markdown_document_with_config};
