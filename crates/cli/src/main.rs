use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use clap::Parser;
use gleaner_core::{
    BrowserFetcher, BrowserFetcherConfig, Content, HttpFetcher, HttpFetcherConfig, MarkdownProcessor,
    ReadabilityProcessor, Reader, RemoteReaderConfig, RemoteReaderFetcher, ThreadFetcher, ThreadFetcherConfig,
    TracingLogger, is_thread_url, slugify, to_markdown_document,
};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

mod echo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ceiling for the whole fetch-and-process run.
const READ_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Fetch a web page and save it as clean Markdown
#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(author = "Gleaner Contributors")]
#[command(version)]
#[command(about = "Fetch a web page and save it as clean Markdown", long_about = None)]
struct Args {
    /// http(s) URL of the page to fetch
    #[arg(value_name = "URL", value_parser = parse_target)]
    url: Url,

    /// Render the page in a remote headless browser
    #[arg(short, long)]
    browser: bool,

    /// DevTools endpoint of the browser used with --browser
    #[arg(long, env = "BROWSER_CONTROL_URL", value_name = "URL")]
    browser_url: Option<String>,

    /// Delegate extraction to the hosted reader service
    #[arg(short, long, conflicts_with = "browser")]
    remote: bool,

    /// API key for the reader service
    #[arg(long, env = "READER_API_KEY", hide_env_values = true, value_name = "KEY")]
    api_key: Option<String>,

    /// Endpoint of the reader service
    #[arg(long, env = "READER_API_ENDPOINT", value_name = "URL")]
    reader_endpoint: Option<String>,

    /// Directory the Markdown file is written to
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    output_dir: PathBuf,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    timeout: u64,

    /// Enable debug logging and per-stage timings
    #[arg(short, long)]
    verbose: bool,
}

/// A failed run, classified by the exit code it maps to.
#[derive(Debug)]
enum Failure {
    /// Fetching or processing failed.
    Read(anyhow::Error),
    /// Flags were valid individually but not together.
    Usage(anyhow::Error),
    /// The output could not be written.
    Filesystem(anyhow::Error),
}

impl Failure {
    fn exit_code(&self) -> ExitCode {
        match self {
            Failure::Read(_) => ExitCode::from(1),
            Failure::Usage(_) => ExitCode::from(2),
            Failure::Filesystem(_) => ExitCode::from(3),
        }
    }

    fn error(&self) -> &anyhow::Error {
        match self {
            Failure::Read(e) | Failure::Usage(e) | Failure::Filesystem(e) => e,
        }
    }
}

fn parse_target(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {:?}, expected http or https", url.scheme()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("URL has no host".to_string());
    }
    Ok(url)
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

/// Picks the fetcher for `args` and the processors that go with it.
///
/// Thread and reader-service fetchers return finished Markdown, so they run no processors.
fn build_reader(args: &Args) -> Result<Reader, Failure> {
    let url = args.url.as_str();

    let mut reader = if is_thread_url(url) {
        let fetcher = ThreadFetcher::new(ThreadFetcherConfig::default()).map_err(|e| Failure::Read(e.into()))?;
        Reader::new(fetcher)
    } else if args.remote {
        let mut config = RemoteReaderConfig { api_key: args.api_key.clone(), ..Default::default() };
        if let Some(endpoint) = &args.reader_endpoint {
            config.endpoint = endpoint.clone();
        }
        Reader::new(RemoteReaderFetcher::new(config).map_err(|e| Failure::Read(e.into()))?)
    } else if args.browser {
        let control_url = args
            .browser_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Failure::Usage(anyhow!("--browser needs --browser-url or BROWSER_CONTROL_URL")))?;
        let fetcher = BrowserFetcher::new(BrowserFetcherConfig::new(control_url)).map_err(|e| Failure::Read(e.into()))?;
        Reader::builder(fetcher).processor(ReadabilityProcessor::default()).processor(MarkdownProcessor::default()).build()
    } else {
        let config = HttpFetcherConfig::builder().timeout(args.timeout).build();
        Reader::builder(HttpFetcher::new(config).map_err(|e| Failure::Read(e.into()))?)
            .processor(ReadabilityProcessor::default())
            .processor(MarkdownProcessor::default())
            .build()
    };

    reader.set_logger(Arc::new(TracingLogger));
    Ok(reader)
}

/// File name for the document: the title slug, falling back to the host.
fn output_file_name(content: &Content, url: &Url) -> String {
    let mut stem = slugify(&content.title);
    if stem.is_empty() {
        stem = url.host_str().map(slugify).unwrap_or_default();
    }
    if stem.is_empty() {
        stem = "page".to_string();
    }
    format!("{stem}.md")
}

fn write_document(dir: &Path, name: &str, document: &str) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, document).with_context(|| format!("Failed to write to file: {}", path.display()))?;
    Ok(path)
}

async fn run(args: Args) -> Result<(), Failure> {
    let started = Instant::now();

    if args.verbose {
        echo::print_banner();
        echo::print_info("Debug logging enabled");
        eprintln!();
    }

    let reader = build_reader(&args)?;
    tracing::debug!(
        fetcher = %reader.fetcher_kind(),
        processors = ?reader.processor_names(),
        output_dir = %args.output_dir.display(),
        timeout_secs = args.timeout,
        "reader configured"
    );

    if args.verbose {
        echo::print_step(1, 3, &format!("Fetching {}", args.url.as_str().bright_white().underline()));
        echo::print_field("Fetcher", reader.fetcher_kind().as_str());
        echo::print_field("Processors", &reader.processor_names().join(", "));
        eprintln!();
    }

    let ctx = CancellationToken::new();
    let deadline = ctx.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(READ_TIMEOUT).await;
        deadline.cancel();
    });
    let result = reader.read(&ctx, args.url.as_str()).await;
    timer.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => {
            return Err(Failure::Read(anyhow!("timed out after {}s reading {}", READ_TIMEOUT.as_secs(), args.url)));
        }
        Err(e) => return Err(Failure::Read(anyhow::Error::new(e).context(format!("Failed to read {}", args.url)))),
    };

    if args.verbose {
        echo::print_step(2, 3, "Processing");
        echo::print_report(&outcome.report);
        echo::print_content_details(&outcome.content);
    } else {
        for failed in outcome.report.failures() {
            if let Some(error) = &failed.error {
                echo::print_warning(&format!("{} skipped: {error}", failed.name));
            }
        }
    }

    let document = to_markdown_document(&outcome.content);
    let name = output_file_name(&outcome.content, &args.url);

    if args.verbose {
        echo::print_step(3, 3, "Writing output");
        echo::print_field("Size", &echo::format_size(document.len()));
        eprintln!();
    }

    let path = write_document(&args.output_dir, &name, &document).map_err(Failure::Filesystem)?;
    echo::print_success(&format!("Saved {}", path.display().bright_white()));

    if args.verbose {
        echo::print_timing("Total", started.elapsed());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            echo::print_error(&format!("{:#}", failure.error()));
            failure.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert!(parse_target("https://example.com/a").is_ok());
        assert!(parse_target("http://example.com").is_ok());
        assert!(parse_target("ftp://example.com").unwrap_err().contains("unsupported scheme"));
        assert!(parse_target("not a url").unwrap_err().contains("invalid URL"));
        assert!(parse_target("file:///tmp/page.html").is_err());
    }

    #[test]
    fn test_output_file_name() {
        let url = Url::parse("https://www.example.com/post").unwrap();
        let titled = Content { title: "Hello, World!".to_string(), ..Content::new(url.as_str()) };
        assert_eq!(output_file_name(&titled, &url), "hello-world.md");
        assert_eq!(output_file_name(&Content::new(url.as_str()), &url), "www-example-com.md");
    }

    #[test]
    fn test_browser_requires_control_url() {
        let args = Args::try_parse_from(["gleaner", "--browser", "https://example.com"]).unwrap();
        let args = Args { browser_url: None, ..args };
        assert!(matches!(build_reader(&args), Err(Failure::Usage(_))));
    }

    #[test]
    fn test_thread_urls_select_thread_fetcher() {
        let args = Args::try_parse_from(["gleaner", "https://x.com/ferris/status/20"]).unwrap();
        let reader = build_reader(&args).unwrap();
        assert_eq!(reader.fetcher_kind().as_str(), "thread");
        assert!(reader.processor_names().is_empty());
    }
}
