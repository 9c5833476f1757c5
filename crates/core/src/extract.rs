//! Main-content extraction.
//!
//! 1. Chrome is stripped by [`preprocess_html`].
//! 2. Every `<p>`, `<pre>` and `<td>` with enough text scores its parent fully and its
//!    grandparent by half; containers start from their tag and class/id weights.
//! 3. Container scores are scaled by `1 - link_density` and the best one wins.
//! 4. Siblings of the winner that scored well, or read like prose, are appended.
//!
//! Pages with no scoring paragraphs fall back to `<article>`, `<main>`, `[role=main]`,
//! then `<body>`.

use scraper::ElementRef;
use url::Url;

use crate::parse::{Document, element_text, plain_text};
use crate::postprocess::{PostProcessConfig, postprocess_html};
use crate::preprocess::{PreprocessConfig, preprocess_html};
use crate::scoring::{ScoreConfig, base_tag_score, class_weight, link_density, paragraph_score};

const FALLBACK_CONTAINERS: &[&str] = &["article", "main", "[role=\"main\"]", "body"];

/// Minimum sibling score regardless of how low the top score is.
const MIN_SIBLING_SCORE: f64 = 10.0;

/// Knobs for every extraction stage.
#[derive(Debug, Clone, Default)]
pub struct ExtractConfig {
    pub preprocess: PreprocessConfig,
    pub score: ScoreConfig,
    /// `base_url` here is overridden by the URL passed to [`extract_article`].
    pub postprocess: PostProcessConfig,
}

/// The extracted main content of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    /// Cleaned article markup with absolute links.
    pub html: String,
    /// Plain text, one line per block.
    pub text: String,
    /// First image inside the article.
    pub image: Option<String>,
    /// Score of the winning container; zero when a fallback container was used.
    pub top_score: f64,
}

/// Extracts the main content of `html`. Returns `None` when nothing with text is found.
pub fn extract_article(html: &str, base_url: Option<&Url>, config: &ExtractConfig) -> Option<Article> {
    let cleaned = preprocess_html(html, &config.preprocess);
    let doc = Document::parse(&cleaned, base_url.cloned());

    let (markup, top_score) = match top_candidate(&doc, &config.score) {
        Some(scored) => {
            tracing::debug!(
                tag = scored.top.value().name(),
                score = scored.top_score,
                candidates = scored.finals.len(),
                "selected content container"
            );
            (scored.assemble(&config.score), scored.top_score)
        }
        None => {
            let fallback = FALLBACK_CONTAINERS
                .iter()
                .find_map(|sel| doc.select(sel).into_iter().find(|el| !element_text(el).is_empty()))?;
            tracing::debug!(tag = fallback.value().name(), "no scored paragraphs, using fallback container");
            (fallback.html(), 0.0)
        }
    };

    let post = PostProcessConfig { base_url: base_url.cloned(), ..config.postprocess.clone() };
    let html = postprocess_html(&markup, &post);

    let fragment = Document::parse_fragment(&html);
    let text = plain_text(fragment.root());
    if text.is_empty() {
        return None;
    }
    let image = fragment.first("img[src]").and_then(|img| img.value().attr("src")).map(str::to_string);

    Some(Article { html, text, image, top_score })
}

struct Scored<'a> {
    top: ElementRef<'a>,
    top_score: f64,
    /// Every scored container with its link-density adjusted score.
    finals: Vec<(ElementRef<'a>, f64)>,
}

impl Scored<'_> {
    fn score_of(&self, el: &ElementRef<'_>) -> Option<f64> {
        self.finals.iter().find(|(candidate, _)| candidate.id() == el.id()).map(|(_, score)| *score)
    }

    /// Markup of the top candidate plus qualifying siblings, in document order.
    fn assemble(&self, config: &ScoreConfig) -> String {
        let Some(parent) = self.top.parent().and_then(ElementRef::wrap) else {
            return self.top.html();
        };

        let threshold = (self.top_score * config.sibling_score_ratio).max(MIN_SIBLING_SCORE);
        let top_class = self.top.value().attr("class").unwrap_or_default();

        let parts: Vec<String> = parent
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|sibling| {
                if sibling.id() == self.top.id() {
                    return true;
                }
                let mut bonus = 0.0;
                if !top_class.is_empty() && sibling.value().attr("class") == Some(top_class) {
                    bonus = self.top_score * config.sibling_score_ratio;
                }
                if self.score_of(sibling).is_some_and(|score| score + bonus >= threshold) {
                    return true;
                }
                sibling.value().name() == "p" && reads_like_prose(sibling)
            })
            .map(|el| el.html())
            .collect();

        if parts.len() == 1 { parts.concat() } else { format!("<div>{}</div>", parts.concat()) }
    }
}

/// Unscored paragraphs worth keeping: long with few links, or a short complete sentence
/// with none.
fn reads_like_prose(el: &ElementRef<'_>) -> bool {
    let text = element_text(el);
    let len = text.chars().count();
    let density = link_density(el);
    (len > 80 && density < 0.25) || (len > 0 && len <= 80 && density == 0.0 && text.ends_with('.'))
}

fn top_candidate<'a>(doc: &'a Document, config: &ScoreConfig) -> Option<Scored<'a>> {
    let mut raw: Vec<(ElementRef<'a>, f64)> = Vec::new();

    for paragraph in doc.select("p, pre, td") {
        let text = element_text(&paragraph);
        if text.chars().count() < config.min_paragraph_chars {
            continue;
        }
        let points = paragraph_score(&text, config);

        for (level, ancestor) in paragraph.ancestors().filter_map(ElementRef::wrap).take(2).enumerate() {
            let share = if level == 0 { points } else { points / 2.0 };
            match raw.iter_mut().find(|(el, _)| el.id() == ancestor.id()) {
                Some((_, score)) => *score += share,
                None => {
                    let initial = base_tag_score(ancestor.value().name()) + class_weight(&ancestor, config);
                    raw.push((ancestor, initial + share));
                }
            }
        }
    }

    let finals: Vec<(ElementRef<'a>, f64)> =
        raw.into_iter().map(|(el, score)| (el, score * (1.0 - link_density(&el)))).collect();

    let (top, top_score) = finals.iter().copied().max_by(|a, b| a.1.total_cmp(&b.1))?;
    Some(Scored { top, top_score, finals })
}
