//! Reply threads from the public post syndication endpoint.
//!
//! Given a status URL, the fetcher loads that post, then follows `in_reply_to` links
//! upward one post at a time until it reaches the thread root or `max_depth`. The
//! thread is rendered oldest first into a single Markdown document.

use std::fmt::Write;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{ClientSlot, DEFAULT_USER_AGENT, Fetcher, FetcherKind, cancellable};
use crate::content::{Content, FetchedContent};
use crate::{GleanerError, Result};

static STATUS_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/status(?:es)?/(\d+)").expect("valid regex"));
static ZEROS_OR_DOTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(0+|\.)").expect("valid regex"));

const THREAD_HOSTS: &[&str] = &["twitter.com", "x.com", "mobile.twitter.com", "www.twitter.com", "www.x.com"];
const TITLE_CHARS: usize = 50;

/// Configuration for the thread fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadFetcherConfig {
    /// Syndication endpoint; `id` and `token` query parameters are appended.
    pub endpoint: String,
    /// Most posts loaded for one thread, the requested post included (default: 16).
    pub max_depth: usize,
    /// Request timeout in seconds (default: 30).
    pub timeout: u64,
}

impl Default for ThreadFetcherConfig {
    fn default() -> Self {
        Self { endpoint: "https://cdn.syndication.twimg.com/tweet-result".to_string(), max_depth: 16, timeout: 30 }
    }
}

/// Derives the access token the syndication endpoint expects for `id`.
///
/// The token is not a secret: it is `floor(id / 1e15 * π)` in base 36 with every
/// run of zeros and every dot removed.
pub fn thread_token(id: u64) -> String {
    let value = ((id as f64 / 1e15) * std::f64::consts::PI).floor() as u64;
    ZEROS_OR_DOTS.replace_all(&to_base36(value), "").into_owned()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().map(|&d| d as char).collect()
}

/// Extracts the numeric post id from a status URL.
pub fn tweet_id_from_url(url: &str) -> Result<u64> {
    let parsed = Url::parse(url).map_err(|e| GleanerError::InvalidUrl(format!("{url}: {e}")))?;
    STATUS_PATH
        .captures(parsed.path())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| GleanerError::InvalidUrl(format!("{url}: no status id in path")))
}

/// Returns true when `url` points at a post on a supported host.
pub fn is_thread_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| THREAD_HOSTS.contains(&h)))
        .unwrap_or(false)
        && tweet_id_from_url(url).is_ok()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Post {
    id_str: String,
    text: String,
    created_at: Option<String>,
    user: PostUser,
    entities: Entities,
    #[serde(rename = "mediaDetails")]
    media_details: Vec<MediaDetail>,
    photos: Vec<Photo>,
    in_reply_to_status_id_str: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct PostUser {
    name: String,
    screen_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Entities {
    hashtags: Vec<Hashtag>,
    user_mentions: Vec<Mention>,
    urls: Vec<LinkEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Hashtag {
    text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Mention {
    screen_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LinkEntity {
    url: String,
    expanded_url: String,
    display_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct MediaDetail {
    media_url_https: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Photo {
    url: String,
}

impl Post {
    fn created(&self) -> Option<OffsetDateTime> {
        self.created_at.as_deref().and_then(|t| OffsetDateTime::parse(t, &Rfc3339).ok())
    }

    fn parent_id(&self) -> Option<&str> {
        self.in_reply_to_status_id_str.as_deref().filter(|id| !id.is_empty())
    }

    fn media(&self) -> Vec<&str> {
        let details = self.media_details.iter().map(|m| m.media_url_https.as_str());
        let photos = self.photos.iter().map(|p| p.url.as_str());
        let mut media: Vec<&str> = Vec::new();
        for src in details.chain(photos) {
            if !src.is_empty() && !media.contains(&src) {
                media.push(src);
            }
        }
        media
    }
}

/// Fetches a post and the chain of posts it replies to.
pub struct ThreadFetcher {
    client: ClientSlot,
    config: ThreadFetcherConfig,
}

impl ThreadFetcher {
    pub fn new(config: ThreadFetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self { client: ClientSlot::new(client), config })
    }

    async fn fetch_post(&self, client: &Client, id: &str) -> Result<Post> {
        let numeric: u64 = id.parse().map_err(|_| GleanerError::Thread(format!("invalid post id {id}")))?;
        let token = thread_token(numeric);

        let response = client
            .get(&self.config.endpoint)
            .query(&[("id", id), ("lang", "en"), ("token", token.as_str())])
            .send()
            .await?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(GleanerError::Status { url: format!("{}?id={id}", self.config.endpoint), status });
        }

        response.json().await.map_err(|e| GleanerError::Thread(format!("malformed post {id}: {e}")))
    }

    /// Loads the thread, newest post first.
    async fn walk(&self, ctx: &CancellationToken, leaf_id: u64) -> Result<Vec<Post>> {
        let client = self.client.get()?;
        let leaf = cancellable(ctx, self.fetch_post(&client, &leaf_id.to_string())).await?;

        let mut next = leaf.parent_id().map(str::to_string);
        let mut posts = vec![leaf];
        while let Some(id) = next.take() {
            if posts.len() >= self.config.max_depth {
                tracing::warn!(leaf_id, max_depth = self.config.max_depth, "thread truncated at depth limit");
                break;
            }
            match cancellable(ctx, self.fetch_post(&client, &id)).await {
                Ok(post) => {
                    tracing::debug!(leaf_id, post_id = %post.id_str, "loaded parent post");
                    next = post.parent_id().map(str::to_string);
                    posts.push(post);
                }
                Err(GleanerError::Cancelled) => return Err(GleanerError::Cancelled),
                Err(e) => {
                    tracing::warn!(leaf_id, parent_id = %id, error = %e, "stopping thread walk at unavailable post");
                    break;
                }
            }
        }

        Ok(posts)
    }
}

#[async_trait]
impl Fetcher for ThreadFetcher {
    fn kind(&self) -> FetcherKind {
        FetcherKind::Thread
    }

    async fn fetch(&self, ctx: &CancellationToken, url: &str) -> Result<FetchedContent> {
        let id = tweet_id_from_url(url)?;
        let posts = self.walk(ctx, id).await?;
        tracing::debug!(url, posts = posts.len(), "thread loaded");
        Ok(FetchedContent::from_content(thread_content(url, &posts)))
    }

    async fn close(&self) -> Result<()> {
        self.client.release();
        Ok(())
    }
}

/// Builds the document for a thread given newest-first posts.
fn thread_content(url: &str, posts: &[Post]) -> Content {
    let mut content = Content::new(url);
    let Some(leaf) = posts.first() else {
        return content;
    };

    content.title = leaf.text.chars().take(TITLE_CHARS).collect();
    content.author = leaf.user.name.clone();
    content.description = leaf.text.clone();
    content.published_time = leaf.created();
    content.cover = leaf.media().first().map(|m| m.to_string()).unwrap_or_default();
    content.site_name = "X".to_string();
    content.markdown = render_thread(posts.iter().rev());
    content.text = posts.iter().rev().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n\n");
    content
}

fn render_thread<'a>(posts: impl Iterator<Item = &'a Post>) -> String {
    let mut out = String::new();
    for post in posts {
        render_post(&mut out, post);
    }
    out
}

fn render_post(out: &mut String, post: &Post) {
    let _ = writeln!(out, "**{}** (@{})", post.user.name, post.user.screen_name);
    if let Some(created) = &post.created_at {
        let _ = writeln!(out, "*{created}*");
    }
    let _ = writeln!(out, "\n{}\n", post.text.trim());

    let tags: Vec<String> = post.entities.hashtags.iter().map(|h| format!("#{}", h.text)).collect();
    if !tags.is_empty() {
        let _ = writeln!(out, "Tags: {}\n", tags.join(" "));
    }

    let mentions: Vec<String> = post.entities.user_mentions.iter().map(|m| format!("@{}", m.screen_name)).collect();
    if !mentions.is_empty() {
        let _ = writeln!(out, "Mentions: {}\n", mentions.join(" "));
    }

    if !post.entities.urls.is_empty() {
        out.push_str("Links:\n");
        for link in &post.entities.urls {
            let target = if link.expanded_url.is_empty() { &link.url } else { &link.expanded_url };
            let label = if link.display_url.is_empty() { target } else { &link.display_url };
            let _ = writeln!(out, "- [{label}]({target})");
        }
        out.push('\n');
    }

    let media = post.media();
    if !media.is_empty() {
        for (i, src) in media.iter().enumerate() {
            let _ = writeln!(out, "- ![image {}]({src})", i + 1);
        }
        out.push('\n');
    }

    out.push_str("---\n\n");
}
