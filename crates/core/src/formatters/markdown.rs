use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::content::Content;

/// Configuration for Markdown document rendering
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Include TOML frontmatter with metadata
    pub include_frontmatter: bool,
    /// Include title as H1 heading at the start of content
    pub include_title_heading: bool,
    /// Append the summary as a section after the body
    pub include_summary: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { include_frontmatter: true, include_title_heading: false, include_summary: false }
    }
}

/// Renders `content` as a Markdown document with TOML frontmatter.
pub fn to_markdown_document(content: &Content) -> String {
    to_markdown_document_with_config(content, &DocumentConfig::default())
}

/// Renders `content` as a Markdown document.
///
/// The body is `Content::markdown`, falling back to `Content::text` when no
/// conversion ran.
pub fn to_markdown_document_with_config(content: &Content, config: &DocumentConfig) -> String {
    let mut output = String::new();

    if config.include_frontmatter {
        output.push_str(&frontmatter(content));
        output.push('\n');
    }

    if config.include_title_heading && !content.title.is_empty() {
        output.push_str(&format!("# {}\n\n", content.title));
    }

    let body = if content.markdown.is_empty() { &content.text } else { &content.markdown };
    output.push_str(body.trim());
    output.push('\n');

    if config.include_summary && !content.summary.is_empty() {
        output.push_str("\n## Summary\n\n");
        output.push_str(content.summary.trim());
        output.push('\n');
    }

    output
}

/// TOML frontmatter block. Empty strings and unknown timestamps are left out.
fn frontmatter(content: &Content) -> String {
    let mut frontmatter = String::from("+++");

    let fields = [
        ("title", &content.title),
        ("author", &content.author),
        ("url", &content.url),
        ("site", &content.site_name),
        ("description", &content.description),
        ("cover", &content.cover),
        ("image", &content.image),
        ("favicon", &content.favicon),
    ];
    for (key, value) in fields {
        if !value.is_empty() {
            frontmatter.push_str(&format!("\n{key} = {}", toml_escape_string(value)));
        }
    }

    for (key, value) in [("published", content.published_time), ("modified", content.modified_time)] {
        if let Some(datetime) = value.and_then(toml_datetime) {
            frontmatter.push_str(&format!("\n{key} = {datetime}"));
        }
    }

    frontmatter.push_str("\n+++\n");
    frontmatter
}

/// TOML offset date-time literal (unquoted RFC 3339).
fn toml_datetime(value: OffsetDateTime) -> Option<String> {
    value.format(&Rfc3339).ok()
}

/// Escape a string for TOML format
fn toml_escape_string(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t");
    format!("\"{escaped}\"")
}

/// Lowercase, dash-separated file name stem for `title`.
///
/// Returns an empty string when `title` has no letters or digits.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug: String = slug.trim_end_matches('-').chars().take(80).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
