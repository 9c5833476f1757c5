//! HTML parsing and DOM queries for the readability stage.
//!
//! [`Document`] wraps a `scraper` tree together with the URL it was fetched from, so
//! metadata and links can be resolved to absolute form.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::parse::Document;
//!
//! let doc = Document::parse("<html><head><title>Test</title></head><body><p>Hi</p></body></html>", None);
//! assert_eq!(doc.title(), Some("Test".to_string()));
//! assert_eq!(doc.select("p").len(), 1);
//! ```

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Tags rendered on their own line in plain text output.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "br",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tr",
    "ul",
];

/// A parsed HTML document.
pub struct Document {
    html: Html,
    base_url: Option<Url>,
}

impl Document {
    /// Parses `html`. Parsing is lenient and never fails; malformed markup is repaired
    /// the way browsers repair it.
    pub fn parse(html: &str, base_url: Option<Url>) -> Self {
        Self { html: Html::parse_document(html), base_url }
    }

    /// Parses an HTML fragment, such as extracted article markup.
    pub fn parse_fragment(html: &str) -> Self {
        Self { html: Html::parse_fragment(html), base_url: None }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// Selects elements matching a CSS selector. An invalid selector matches nothing.
    pub fn select(&self, selector: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(selector) {
            Ok(sel) => self.html.select(&sel).collect(),
            Err(e) => {
                tracing::debug!(selector, error = %e, "invalid selector");
                Vec::new()
            }
        }
    }

    /// First element matching `selector`.
    pub fn first(&self, selector: &str) -> Option<ElementRef<'_>> {
        let sel = Selector::parse(selector).ok()?;
        self.html.select(&sel).next()
    }

    /// Contents of the `<title>` element.
    pub fn title(&self) -> Option<String> {
        self.first("title").map(|el| collapse_whitespace(&el.text().collect::<String>())).filter(|t| !t.is_empty())
    }

    /// Resolves `href` against the document URL. Without a base URL only absolute
    /// URLs are returned.
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        match &self.base_url {
            Some(base) => base.join(href).ok().map(String::from),
            None => Url::parse(href).ok().map(String::from),
        }
    }
}

/// Text of an element with runs of whitespace collapsed to single spaces.
pub fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Renders an element as plain text: one line per block element, blank lines removed.
pub fn plain_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    write_text(el, &mut raw);
    raw.lines().map(collapse_whitespace).filter(|line| !line.is_empty()).collect::<Vec<_>>().join("\n")
}

fn write_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.replace(['\n', '\r'], " ")),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    let name = child_el.value().name();
                    if matches!(name, "script" | "style" | "noscript" | "template") {
                        continue;
                    }
                    let block = BLOCK_TAGS.contains(&name);
                    if block {
                        out.push('\n');
                    }
                    write_text(child_el, out);
                    if block {
                        out.push('\n');
                    }
                }
            }
            _ => {}
        }
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <title>  Test
              Page </title>
        </head>
        <body>
            <h1>Heading</h1>
            <p class="content">Paragraph   1</p>
            <p class="content">Paragraph 2 <a href="/next">next</a></p>
            <script>var x = 1;</script>
        </body>
        </html>
    "#;

    #[test]
    fn test_title_is_collapsed() {
        let doc = Document::parse(SAMPLE_HTML, None);
        assert_eq!(doc.title(), Some("Test Page".to_string()));
    }

    #[test]
    fn test_select_and_text() {
        let doc = Document::parse(SAMPLE_HTML, None);
        let paragraphs = doc.select("p.content");
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(element_text(&paragraphs[0]), "Paragraph 1");
    }

    #[test]
    fn test_invalid_selector_matches_nothing() {
        let doc = Document::parse(SAMPLE_HTML, None);
        assert!(doc.select("[[invalid").is_empty());
        assert!(doc.first("[[invalid").is_none());
    }

    #[test]
    fn test_plain_text_breaks_blocks_and_skips_scripts() {
        let doc = Document::parse(SAMPLE_HTML, None);
        let text = plain_text(doc.first("body").unwrap());
        assert_eq!(text, "Heading\nParagraph 1\nParagraph 2 next");
    }

    #[test]
    fn test_resolve_relative() {
        let doc = Document::parse(SAMPLE_HTML, Url::parse("https://example.com/posts/1").ok());
        assert_eq!(doc.resolve("/next"), Some("https://example.com/next".to_string()));
        assert_eq!(doc.resolve("img.png"), Some("https://example.com/posts/img.png".to_string()));
        assert_eq!(doc.resolve(""), None);
    }

    #[test]
    fn test_resolve_without_base() {
        let doc = Document::parse(SAMPLE_HTML, None);
        assert_eq!(doc.resolve("/next"), None);
        assert_eq!(doc.resolve("https://a.example/x"), Some("https://a.example/x".to_string()));
    }
}
