use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::{format_description, time};
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::parse::{Document, element_text};

/// Descriptive fields found in a page's head and structured data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    /// Absolute URL of the social preview image.
    pub cover: Option<String>,
    /// Absolute URL of the site icon.
    pub favicon: Option<String>,
    pub published_time: Option<OffsetDateTime>,
    pub modified_time: Option<OffsetDateTime>,
}

impl Document {
    /// Extracts every metadata field at once. JSON-LD is parsed a single time and
    /// shared by all lookups.
    pub fn extract_metadata(&self) -> Metadata {
        let ld = self.json_ld();
        Metadata {
            title: self.extract_title(&ld),
            author: self.extract_author(&ld),
            description: self.extract_description(&ld),
            site_name: self.extract_site_name(&ld),
            cover: self.extract_cover(&ld),
            favicon: self.extract_favicon(),
            published_time: self.extract_time(&ld, "datePublished", "article:published_time", true),
            modified_time: self.extract_time(&ld, "dateModified", "article:modified_time", false),
        }
    }

    /// Title with priority fallback:
    /// 1. JSON-LD `headline`
    /// 2. `og:title`, `twitter:title`, meta `title` / `DC.title`
    /// 3. `<title>` element
    /// 4. First `<h1>`
    fn extract_title(&self, ld: &[Value]) -> Option<String> {
        ld_str(ld, "headline")
            .or_else(|| self.meta_any(&["og:title", "twitter:title", "title", "DC.title"]))
            .or_else(|| self.title())
            .or_else(|| self.first_text("h1"))
    }

    /// Author with priority fallback:
    /// 1. JSON-LD `author` (string, object, or first of an array)
    /// 2. Meta `author` / `article:author` / `DC.creator`
    /// 3. `[rel="author"]`, then `[itemprop="author"]` text
    fn extract_author(&self, ld: &[Value]) -> Option<String> {
        ld.iter()
            .find_map(|v| v.get("author").and_then(author_name))
            .or_else(|| self.meta_any(&["author", "article:author", "DC.creator"]))
            .or_else(|| self.first_text("[rel=\"author\"]"))
            .or_else(|| self.first_text("[itemprop=\"author\"]"))
            .filter(|a| a.chars().count() < 100)
    }

    fn extract_description(&self, ld: &[Value]) -> Option<String> {
        ld_str(ld, "description").or_else(|| self.meta_any(&["og:description", "twitter:description", "description"]))
    }

    fn extract_site_name(&self, ld: &[Value]) -> Option<String> {
        ld.iter()
            .find_map(|v| v.get("publisher").and_then(|p| p.get("name")).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| self.meta_any(&["og:site_name", "application-name"]))
    }

    fn extract_cover(&self, ld: &[Value]) -> Option<String> {
        self.meta_any(&["og:image", "og:image:url", "twitter:image", "twitter:image:src"])
            .or_else(|| ld.iter().find_map(|v| v.get("image").and_then(image_url)))
            .and_then(|src| self.resolve(&src))
    }

    /// Icon link, falling back to `/favicon.ico` on the page's origin.
    fn extract_favicon(&self) -> Option<String> {
        let linked = self
            .select("link[rel][href]")
            .into_iter()
            .find(|el| {
                el.attr("rel")
                    .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("icon")))
            })
            .and_then(|el| el.attr("href"))
            .and_then(|href| self.resolve(href));

        linked.or_else(|| {
            let base = self.base_url()?;
            if matches!(base.scheme(), "http" | "https") { base.join("/favicon.ico").ok().map(String::from) } else { None }
        })
    }

    /// Publication or modification time from JSON-LD, the OpenGraph article tags, and
    /// optionally the first `<time datetime>` element. Unparseable values are ignored.
    fn extract_time(&self, ld: &[Value], ld_key: &str, meta: &str, use_time_element: bool) -> Option<OffsetDateTime> {
        let mut candidates: Vec<String> = ld.iter().filter_map(|v| v.get(ld_key)?.as_str().map(str::to_string)).collect();
        candidates.extend(self.meta(meta));
        if use_time_element {
            candidates.extend(self.first("time[datetime]").and_then(|el| el.attr("datetime")).map(str::to_string));
        }
        candidates.iter().find_map(|raw| parse_timestamp(raw))
    }

    /// `content` of the first `<meta>` whose `name` or `property` equals `key`.
    fn meta(&self, key: &str) -> Option<String> {
        ["name", "property"].iter().find_map(|attr| {
            self.first(&format!("meta[{attr}=\"{key}\"]"))
                .and_then(|el| el.attr("content"))
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
        })
    }

    fn meta_any(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.meta(key))
    }

    fn first_text(&self, selector: &str) -> Option<String> {
        self.first(selector).map(|el| element_text(&el)).filter(|t| !t.is_empty())
    }

    /// All JSON-LD objects on the page, with top-level arrays and `@graph` lists flattened.
    fn json_ld(&self) -> Vec<Value> {
        let mut out = Vec::new();
        for el in self.select("script[type=\"application/ld+json\"]") {
            let raw = el.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => flatten_ld(value, &mut out),
                Err(e) => tracing::debug!(error = %e, "skipping malformed JSON-LD"),
            }
        }
        out
    }
}

fn flatten_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_ld(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_ld(graph, out);
            }
            out.push(Value::Object(map));
        }
        _ => {}
    }
}

fn ld_str(ld: &[Value], key: &str) -> Option<String> {
    ld.iter()
        .find_map(|v| v.get(key)?.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn author_name(author: &Value) -> Option<String> {
    match author {
        Value::String(name) => Some(name.clone()),
        Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(str::to_string),
        Value::Array(items) => items.first().and_then(author_name),
        _ => None,
    }
}

fn image_url(image: &Value) -> Option<String> {
    match image {
        Value::String(url) => Some(url.clone()),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(str::to_string),
        Value::Array(items) => items.first().and_then(image_url),
        _ => None,
    }
}

/// Parses RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS` (assumed UTC), and bare dates.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(t);
    }
    if let Ok(t) = PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]")) {
        return Some(t.assume_offset(UtcOffset::UTC));
    }
    let date_part = raw.get(..10)?;
    Date::parse(date_part, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.with_time(time!(0:00)).assume_offset(UtcOffset::UTC))
}
