//! Content scoring primitives.
//!
//! Paragraph-like nodes earn points for length and commas; their ancestors inherit the
//! points, adjusted by tag type, class/id hints, and link density.

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

use crate::parse::element_text;

/// Class/id fragments that mark likely content containers.
static POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)article|body|content|entry|hentry|h-entry|main|page|pagination|post|text|blog|story")
        .expect("valid regex")
});

/// Class/id fragments that mark chrome around the content.
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)-ad-|hidden|^hid$| hid$| hid |^hid |banner|combx|comment|com-|contact|footer|gdpr|masthead|media|meta|outbrain|promo|related|scroll|share|shoutbox|sidebar|skyscraper|sponsor|shopping|tags|widget",
    )
    .expect("valid regex")
});

/// Class/id fragments of nodes removed before scoring unless they also look positive.
pub static UNLIKELY_CANDIDATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)-ad-|ai2html|banner|breadcrumbs|combx|comment|community|cover-wrap|disqus|extra|footer|gdpr|header|legends|menu|related|remark|replies|rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|pager|popup|yom-remote",
    )
    .expect("valid regex")
});

/// Rescues an unlikely-looking node that is still plausibly content.
pub static MAYBE_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)and|article|body|column|content|main|mathjax|shadow").expect("valid regex"));

/// Tuning knobs for candidate selection.
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// Paragraphs shorter than this many characters are not scored (default: 25).
    pub min_paragraph_chars: usize,
    /// Bonus or penalty applied for class/id hints (default: 25).
    pub class_weight: f64,
    /// Characters per length point (default: 100).
    pub chars_per_point: usize,
    /// Cap on length points (default: 3).
    pub max_length_points: f64,
    /// A sibling joins the article when its score reaches this fraction of the top score (default: 0.2).
    pub sibling_score_ratio: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            min_paragraph_chars: 25,
            class_weight: 25.0,
            chars_per_point: 100,
            max_length_points: 3.0,
            sibling_score_ratio: 0.2,
        }
    }
}

/// Starting score of a candidate container by tag name.
pub fn base_tag_score(tag: &str) -> f64 {
    match tag {
        "article" => 10.0,
        "section" => 8.0,
        "div" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" | "header" | "footer" | "nav" => -5.0,
        _ => 0.0,
    }
}

/// Class and id hints. Each attribute contributes independently, so an element can
/// earn or lose the weight twice.
pub fn class_weight(el: &ElementRef<'_>, config: &ScoreConfig) -> f64 {
    let mut weight = 0.0;
    for value in [el.value().attr("class"), el.value().attr("id")].into_iter().flatten() {
        if NEGATIVE.is_match(value) {
            weight -= config.class_weight;
        }
        if POSITIVE.is_match(value) {
            weight += config.class_weight;
        }
    }
    weight
}

/// Points earned by one paragraph: one for existing, one per comma, and one per
/// `chars_per_point` characters up to `max_length_points`.
pub fn paragraph_score(text: &str, config: &ScoreConfig) -> f64 {
    let commas = text.matches([',', '，']).count() as f64;
    let length = (text.chars().count() / config.chars_per_point.max(1)) as f64;
    1.0 + commas + length.min(config.max_length_points)
}

/// Share of an element's text that sits inside links, in `0.0..=1.0`.
pub fn link_density(el: &ElementRef<'_>) -> f64 {
    let total = element_text(el).chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|d| d.value().name() == "a")
        .map(|a| element_text(&a).chars().count())
        .sum();
    (linked as f64 / total as f64).min(1.0)
}

/// True when an unlikely class/id should drop the node before scoring.
pub fn is_unlikely(class_and_id: &str) -> bool {
    UNLIKELY_CANDIDATES.is_match(class_and_id) && !MAYBE_CANDIDATE.is_match(class_and_id)
}
