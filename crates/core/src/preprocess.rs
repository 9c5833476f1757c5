//! Removes page chrome before scoring: non-content tags, comments, hidden nodes, and
//! elements whose class or id marks them as navigation, ads, or comment threads.

use std::sync::LazyLock;

use regex::Regex;

use crate::scoring;

/// Tags dropped together with their subtree.
const REMOVED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "svg", "canvas", "nav", "footer", "aside",
    "button",
];

/// Tags never removed for their class or id.
const PROTECTED_TAGS: &[&str] = &["html", "body", "article", "main", "a"];

static COMMENTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static HIDDEN_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)display\s*:\s*none|visibility\s*:\s*hidden").expect("valid regex"));

/// Which cleanup passes run.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Drop elements whose class/id looks like chrome (default: true).
    pub remove_unlikely: bool,
    /// Drop `hidden`, `aria-hidden="true"`, and `display:none` elements (default: true).
    pub remove_hidden: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self { remove_unlikely: true, remove_hidden: true }
    }
}

/// Cleans `html` in a single rewriting pass. Markup the rewriter rejects is returned
/// with only comments stripped.
pub fn preprocess_html(html: &str, config: &PreprocessConfig) -> String {
    let html = COMMENTS.replace_all(html, "");
    let remove_unlikely = config.remove_unlikely;
    let remove_hidden = config.remove_hidden;

    let mut handlers: Vec<_> = REMOVED_TAGS
        .iter()
        .map(|tag| {
            lol_html::element!(*tag, |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();

    handlers.push(lol_html::element!("*", move |el| {
        let tag = el.tag_name();
        if PROTECTED_TAGS.contains(&tag.as_str()) {
            return Ok(());
        }

        if remove_hidden
            && (el.has_attribute("hidden")
                || el.get_attribute("aria-hidden").is_some_and(|v| v == "true")
                || el.get_attribute("style").is_some_and(|s| HIDDEN_STYLE.is_match(&s)))
        {
            el.remove();
            return Ok(());
        }

        if remove_unlikely {
            let hints = format!(
                "{} {}",
                el.get_attribute("class").unwrap_or_default(),
                el.get_attribute("id").unwrap_or_default()
            );
            if !hints.trim().is_empty() && scoring::is_unlikely(&hints) {
                el.remove();
            }
        }
        Ok(())
    }));

    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings { element_content_handlers: handlers, ..Default::default() },
        |c: &[u8]| output.extend_from_slice(c),
    );

    let result = rewriter.write(html.as_bytes()).and_then(|_| rewriter.end());
    if let Err(e) = result {
        tracing::debug!(error = %e, "preprocessing failed, keeping raw markup");
        return html.into_owned();
    }

    String::from_utf8_lossy(&output).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(html: &str) -> String {
        preprocess_html(html, &PreprocessConfig::default())
    }

    #[test]
    fn test_removes_non_content_tags() {
        let out = clean(
            "<body><script>x()</script><style>p{}</style><nav>menu</nav><p>keep</p><footer>boilerplate</footer></body>",
        );
        assert!(out.contains("<p>keep</p>"));
        assert!(!out.contains("x()"));
        assert!(!out.contains("menu"));
        assert!(!out.contains("boilerplate"));
    }

    #[test]
    fn test_removes_comments() {
        let out = clean("<p>a<!-- hidden\nnote -->b</p>");
        assert_eq!(out, "<p>ab</p>");
    }

    #[test]
    fn test_removes_unlikely_but_rescues_maybe() {
        let out = clean(
            r#"<div class="sidebar">ads</div><div class="main-sidebar">story</div><article class="comment">kept</article>"#,
        );
        assert!(!out.contains("ads"));
        assert!(out.contains("story"));
        assert!(out.contains("kept"));
    }

    #[test]
    fn test_removes_hidden() {
        let out = clean(
            r#"<p hidden>a</p><p aria-hidden="true">b</p><p style="display: none">c</p><p style="color:red">d</p>"#,
        );
        assert!(!out.contains(">a<"));
        assert!(!out.contains(">b<"));
        assert!(!out.contains(">c<"));
        assert!(out.contains(">d<"));
    }

    #[test]
    fn test_passes_can_be_disabled() {
        let config = PreprocessConfig { remove_unlikely: false, remove_hidden: false };
        let out = preprocess_html(r#"<div class="sidebar">ads</div><p hidden>x</p>"#, &config);
        assert!(out.contains("ads"));
        assert!(out.contains(">x<"));
    }

    #[test]
    fn test_multibyte_text_survives() {
        let out = clean("<p>naïve café 日本語</p>");
        assert_eq!(out, "<p>naïve café 日本語</p>");
    }
}
