//! Library API integration tests against an in-process HTTP server
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use gleaner_core::*;
use rstest::rstest;
use time::macros::datetime;
use tokio_util::sync::CancellationToken;

const PAGE: &str = r#"<html><head><title>T</title><meta name="author" content="A"></head><body><article><h1>H</h1><p>Body</p></article><footer>boilerplate</footer></body></html>"#;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn counted_router(hits: Arc<AtomicUsize>) -> Router {
    let failing = hits.clone();
    Router::new()
        .route("/page", get(|| async { Html(PAGE) }))
        .route(
            "/counted",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Html(PAGE)
                }
            }),
        )
        .route(
            "/broken",
            get(move || {
                let hits = failing.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        )
        .route("/r/{n}", get(redirect_chain))
        .route(
            "/latin1",
            get(|| async { ([(header::CONTENT_TYPE, "text/html; charset=iso-8859-1")], &b"<p>caf\xe9</p>"[..]) }),
        )
}

async fn redirect_chain(Path(n): Path<usize>) -> Response {
    if n == 0 { Html("<p>landed</p>").into_response() } else { Redirect::temporary(&format!("/r/{}", n - 1)).into_response() }
}

fn http_reader(config: HttpFetcherConfig) -> Reader {
    Reader::new(HttpFetcher::new(config).unwrap())
}

fn readability_reader() -> Result<Reader> {
    Ok(Reader::builder(HttpFetcher::new(HttpFetcherConfig::default())?).processor(ReadabilityProcessor::default()).build())
}

struct FailingProcessor;

#[async_trait]
impl Processor for FailingProcessor {
    fn name(&self) -> &str {
        "failing"
    }

    async fn process(&self, _ctx: &CancellationToken, _content: &mut Content) -> Result<()> {
        Err(GleanerError::Summarization("model unavailable".to_string()))
    }
}

#[rstest]
#[case(0, 1)]
#[case(2, 3)]
#[tokio::test]
async fn test_retry_bound(#[case] retry_count: usize, #[case] expected_attempts: usize) {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(counted_router(hits.clone())).await;
    let config = HttpFetcherConfig::builder().retry_count(retry_count).retry_delay(Duration::from_millis(10)).build();

    let err = http_reader(config).fetch(&CancellationToken::new(), &format!("{base}/broken")).await.unwrap_err();

    assert_eq!(hits.load(Ordering::SeqCst), expected_attempts);
    assert!(err.is_transport());
    assert!(err.to_string().contains("all fetch attempts failed"));
    assert!(err.to_string().contains("HTTP 500"));
    match err {
        GleanerError::RetriesExhausted { attempts, source, .. } => {
            assert_eq!(attempts, expected_attempts);
            assert!(matches!(*source, GleanerError::Status { status: 500, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_redirect_ceiling() {
    let base = serve(counted_router(Arc::new(AtomicUsize::new(0)))).await;
    let config = || HttpFetcherConfig::builder().max_redirects(3).retry_count(0).build();
    let ctx = CancellationToken::new();

    let content = http_reader(config()).fetch(&ctx, &format!("{base}/r/3")).await.unwrap();
    assert_eq!(content.html, "<p>landed</p>");
    assert_eq!(content.url, format!("{base}/r/0"));

    let err = http_reader(config()).fetch(&ctx, &format!("{base}/r/4")).await.unwrap_err();
    match err {
        GleanerError::RetriesExhausted { source, .. } => {
            assert!(matches!(*source, GleanerError::TooManyRedirects { max: 3 }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_redirects_returned_when_not_followed() {
    let base = serve(counted_router(Arc::new(AtomicUsize::new(0)))).await;
    let fetcher = HttpFetcher::new(HttpFetcherConfig::builder().follow_redirects(false).retry_count(0).build()).unwrap();

    let fetched = fetcher.fetch(&CancellationToken::new(), &format!("{base}/r/1")).await.unwrap();

    assert_eq!(fetched.status, 307);
    assert_eq!(fetched.content.url, format!("{base}/r/1"));
}

#[tokio::test]
async fn test_body_decoded_with_declared_charset() {
    let base = serve(counted_router(Arc::new(AtomicUsize::new(0)))).await;
    let content = http_reader(HttpFetcherConfig::default())
        .fetch(&CancellationToken::new(), &format!("{base}/latin1"))
        .await
        .unwrap();
    assert!(content.html.contains("café"), "got {:?}", content.html);
}

#[tokio::test]
async fn test_cancellation_during_retry_wait() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(counted_router(hits.clone())).await;
    let config = HttpFetcherConfig::builder().retry_count(5).retry_delay(Duration::from_secs(10)).build();
    let ctx = CancellationToken::new();

    let trigger = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = http_reader(config).fetch(&ctx, &format!("{base}/broken")).await.unwrap_err();

    assert!(matches!(err, GleanerError::Cancelled));
    assert!(err.is_cancelled());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_end_to_end_readability_and_markdown() {
    let base = serve(counted_router(Arc::new(AtomicUsize::new(0)))).await;
    let reader = Reader::builder(HttpFetcher::new(HttpFetcherConfig::default()).unwrap())
        .processor(ReadabilityProcessor::default())
        .processor(MarkdownProcessor::default())
        .build();

    let outcome = reader.read(&CancellationToken::new(), &format!("{base}/page")).await.unwrap();
    let content = outcome.content;

    assert!(outcome.report.is_clean());
    assert!(!outcome.cached);
    assert_eq!(content.title, "T");
    assert_eq!(content.author, "A");
    assert!(!content.html.contains("boilerplate"));
    assert!(content.markdown.contains("# H"));
    assert!(content.markdown.contains("Body"));
    assert_eq!(content.favicon, format!("{base}/favicon.ico"));
}

#[tokio::test]
async fn test_best_effort_chain() {
    let base = serve(counted_router(Arc::new(AtomicUsize::new(0)))).await;
    let reader = Reader::builder(HttpFetcher::new(HttpFetcherConfig::default()).unwrap())
        .processor(ReadabilityProcessor::default())
        .processor(MarkdownProcessor::default())
        .processor(FailingProcessor)
        .build();

    let outcome = reader.read(&CancellationToken::new(), &format!("{base}/page")).await.unwrap();

    assert!(!outcome.content.markdown.is_empty());
    assert!(!outcome.report.is_clean());
    assert_eq!(outcome.report.failures().count(), 1);
    let failed = outcome.report.outcome("failing").unwrap();
    assert!(matches!(failed.error, Some(GleanerError::Summarization(_))));
    assert!(outcome.report.outcome("markdown").unwrap().is_ok());
}

#[tokio::test]
async fn test_markdown_without_readability() {
    let base = serve(counted_router(Arc::new(AtomicUsize::new(0)))).await;
    let reader =
        Reader::builder(HttpFetcher::new(HttpFetcherConfig::default()).unwrap()).processor(MarkdownProcessor::default()).build();

    let outcome = reader.read(&CancellationToken::new(), &format!("{base}/page")).await.unwrap();

    assert!(outcome.report.is_clean());
    assert!(outcome.content.markdown.contains("# H"));
    assert!(outcome.content.markdown.contains("boilerplate"));
    assert!(outcome.content.title.is_empty());
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(counted_router(hits.clone())).await;
    let store = Arc::new(MemoryCache::new());
    let cached = CachedReader::new(readability_reader, store.clone(), CacheConfig::default());
    let url = format!("{base}/counted");
    let ctx = CancellationToken::new();

    let first = cached.read(&ctx, &url).await.unwrap();
    let second = cached.read(&ctx, &url).await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.content.title, "T");
    assert!(!second.content.html.contains("boilerplate"));

    let raw = store.get(&cache_key(FetcherKind::Http, &url)).await.unwrap().unwrap();
    let stored: Content = serde_json::from_str(&raw).unwrap();
    assert!(stored.html.contains("boilerplate"));
    assert!(stored.title.is_empty());
}

#[tokio::test]
async fn test_cached_reader_serves_distinct_urls() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(counted_router(hits.clone())).await;
    let cached = CachedReader::new(readability_reader, Arc::new(MemoryCache::new()), CacheConfig::default());
    let ctx = CancellationToken::new();

    let first = cached.read(&ctx, &format!("{base}/page")).await.unwrap();
    let second = cached.read(&ctx, &format!("{base}/counted")).await.unwrap();
    let again = cached.read(&ctx, &format!("{base}/counted")).await.unwrap();

    assert_eq!(first.content.title, "T");
    assert_eq!(second.content.title, "T");
    assert!(!second.cached);
    assert!(again.cached);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

fn post(id: &str, text: &str, parent: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "id_str": id,
        "text": text,
        "created_at": "2024-01-15T10:30:00.000Z",
        "user": { "name": "Ferris", "screen_name": "ferris" },
        "in_reply_to_status_id_str": parent,
    })
}

async fn thread_server() -> String {
    let posts: Arc<HashMap<String, serde_json::Value>> = Arc::new(HashMap::from([
        ("1".to_string(), post("1", "first", None)),
        ("2".to_string(), post("2", "second", Some("1"))),
        ("3".to_string(), post("3", "third", Some("2"))),
    ]));

    let app = Router::new().route(
        "/tweet-result",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let posts = posts.clone();
            async move {
                let id = query.get("id").cloned().unwrap_or_default();
                let expected = id.parse().map(thread_token).unwrap_or_default();
                if query.get("token") != Some(&expected) {
                    return StatusCode::FORBIDDEN.into_response();
                }
                match posts.get(&id) {
                    Some(post) => axum::Json(post.clone()).into_response(),
                    None => StatusCode::NOT_FOUND.into_response(),
                }
            }
        }),
    );
    serve(app).await
}

#[rstest]
#[case(16, "first\n\nsecond\n\nthird")]
#[case(2, "second\n\nthird")]
#[tokio::test]
async fn test_thread_walk(#[case] max_depth: usize, #[case] expected_text: &str) {
    let base = thread_server().await;
    let config = ThreadFetcherConfig { endpoint: format!("{base}/tweet-result"), max_depth, ..Default::default() };
    let reader = Reader::new(ThreadFetcher::new(config).unwrap());

    let outcome = reader.read(&CancellationToken::new(), "https://x.com/ferris/status/3").await.unwrap();
    let content = outcome.content;

    assert_eq!(content.text, expected_text);
    assert_eq!(content.title, "third");
    assert_eq!(content.author, "Ferris");
    assert_eq!(content.site_name, "X");
    assert_eq!(content.published_time, Some(datetime!(2024-01-15 10:30:00 UTC)));
    let second = content.markdown.find("second").unwrap();
    let third = content.markdown.find("third").unwrap();
    assert!(second < third);
}

async fn reader_api(headers: HeaderMap, uri: Uri) -> Response {
    let authorized = headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer secret");
    let markdown = headers.get("x-return-format").and_then(|v| v.to_str().ok()) == Some("markdown");
    if !authorized || !markdown {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !uri.path().ends_with("example.com/a") {
        return StatusCode::NOT_FOUND.into_response();
    }

    axum::Json(serde_json::json!({
        "code": 200,
        "data": {
            "url": "https://example.com/a",
            "title": "Remote",
            "description": "From the service",
            "content": "# Remote\n\nBody",
            "screenshotUrl": "https://shots.example.com/a.png",
            "publishedTime": "2024-01-15T10:30:00Z"
        }
    }))
    .into_response()
}

#[tokio::test]
async fn test_remote_reader_mapping() {
    let base = serve(Router::new().fallback(reader_api)).await;
    let config = RemoteReaderConfig { endpoint: format!("{base}/"), api_key: Some("secret".to_string()), ..Default::default() };
    let reader = Reader::new(RemoteReaderFetcher::new(config).unwrap());

    let content = reader.read(&CancellationToken::new(), "https://example.com/a").await.unwrap().content;

    assert_eq!(content.url, "https://example.com/a");
    assert_eq!(content.title, "Remote");
    assert_eq!(content.description, "From the service");
    assert_eq!(content.markdown, "# Remote\n\nBody");
    assert_eq!(content.image, "https://shots.example.com/a.png");
    assert_eq!(content.published_time, Some(datetime!(2024-01-15 10:30:00 UTC)));
}

#[tokio::test]
async fn test_remote_reader_rejects_bad_key() {
    let base = serve(Router::new().fallback(reader_api)).await;
    let config = RemoteReaderConfig { endpoint: base, api_key: Some("wrong".to_string()), ..Default::default() };
    let reader = Reader::new(RemoteReaderFetcher::new(config).unwrap());

    let err = reader.read(&CancellationToken::new(), "https://example.com/a").await.unwrap_err();
    assert!(matches!(err, GleanerError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_nil_time_document_round_trip() {
    let base = serve(counted_router(Arc::new(AtomicUsize::new(0)))).await;
    let reader = Reader::builder(HttpFetcher::new(HttpFetcherConfig::default()).unwrap())
        .processor(ReadabilityProcessor::default())
        .processor(MarkdownProcessor::default())
        .build();
    let content = reader.read(&CancellationToken::new(), &format!("{base}/page")).await.unwrap().content;
    assert!(content.published_time.is_none());

    let document = to_markdown_document(&content);
    assert!(document.starts_with("+++\ntitle = \"T\"\nauthor = \"A\"\n"));
    assert!(!document.contains("published"));
    assert!(!document.contains("null"));

    let json = to_json(&content, false).unwrap();
    assert!(!json.contains("published_time"));
    let back: Content = serde_json::from_str(&json).unwrap();
    assert_eq!(back, content);
}
