//! Final cleanup of extracted article markup.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Attributes kept on article elements; everything else is presentation or tracking.
const KEPT_ATTRIBUTES: &[&str] =
    &["href", "src", "srcset", "alt", "title", "colspan", "rowspan", "datetime", "lang", "start", "type"];

static EMPTY_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(p|div|span|section|li|h[1-6])>(?:\s|&nbsp;|<br\s*/?>)*</(p|div|span|section|li|h[1-6])>")
        .expect("valid regex")
});

/// Cleanup options for extracted markup.
#[derive(Debug, Clone)]
pub struct PostProcessConfig {
    /// Rewrite `a[href]` and `img[src]` to absolute URLs against this base.
    pub base_url: Option<Url>,
    /// Keep `class` and `id` attributes (default: false).
    pub keep_classes: bool,
    /// Passes of empty block removal; each pass can expose a new empty parent (default: 5).
    pub max_empty_passes: usize,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self { base_url: None, keep_classes: false, max_empty_passes: 5 }
    }
}

/// Normalizes extracted markup: absolute links, lean attributes, no empty blocks.
pub fn postprocess_html(html: &str, config: &PostProcessConfig) -> String {
    let rewritten = rewrite_elements(html, config);
    remove_empty_blocks(&rewritten, config.max_empty_passes)
}

fn rewrite_elements(html: &str, config: &PostProcessConfig) -> String {
    let base = config.base_url.as_ref();
    let keep_classes = config.keep_classes;

    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![
                lol_html::element!("*", move |el| {
                    let names: Vec<String> = el.attributes().iter().map(|a| a.name()).collect();
                    for name in names {
                        let keep = KEPT_ATTRIBUTES.contains(&name.as_str())
                            || (keep_classes && (name == "class" || name == "id"));
                        if !keep {
                            el.remove_attribute(&name);
                        }
                    }
                    Ok(())
                }),
                lol_html::element!("a[href]", move |el| {
                    if let Some(href) = el.get_attribute("href") {
                        if href.trim_start().to_ascii_lowercase().starts_with("javascript:") {
                            el.remove_and_keep_content();
                        } else if let Some(absolute) = absolutize(base, &href) {
                            el.set_attribute("href", &absolute)?;
                        }
                    }
                    Ok(())
                }),
                lol_html::element!("img[src]", move |el| {
                    if let Some(src) = el.get_attribute("src")
                        && let Some(absolute) = absolutize(base, &src)
                    {
                        el.set_attribute("src", &absolute)?;
                    }
                    Ok(())
                }),
            ],
            ..Default::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    let result = rewriter.write(html.as_bytes()).and_then(|_| rewriter.end());
    if let Err(e) = result {
        tracing::debug!(error = %e, "postprocessing failed, keeping extracted markup");
        return html.to_string();
    }

    String::from_utf8_lossy(&output).into_owned()
}

fn absolutize(base: Option<&Url>, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() || link.starts_with('#') || link.starts_with("data:") {
        return None;
    }
    base?.join(link).ok().map(String::from)
}

fn remove_empty_blocks(html: &str, max_passes: usize) -> String {
    let mut current = html.to_string();
    for _ in 0..max_passes {
        let next = EMPTY_BLOCK
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                if caps[1] == caps[2] { String::new() } else { caps[0].to_string() }
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}
