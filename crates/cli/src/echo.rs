use std::time::Duration;

use gleaner_core::{Content, ProcessReport};
use owo_colors::OwoColorize;

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!("\n{} {} {}", "Gleaner".bold().bright_blue(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", "Fetch a web page and save it as clean Markdown\n".dimmed());
}

/// Print a styled step message
pub fn print_step(step: usize, total: usize, message: &str) {
    eprintln!("{} {}", format!("[{step}/{total}]").dimmed(), message.bright_cyan());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print a labelled value, indented under the current step
pub fn print_field(label: &str, value: &str) {
    eprintln!("  {} {}", format!("{label}:").dimmed(), value.bright_white());
}

/// Print timing information with color coding
pub fn print_timing(label: &str, duration: Duration) {
    let ms = duration.as_secs_f64() * 1000.0;
    let label = format!("{label}:");
    if ms < 50.0 {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "fast".dimmed());
    } else if ms < 500.0 {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "moderate".bright_yellow());
    } else {
        eprintln!("  {} {:>8.2}ms ({})", label.dimmed(), ms, "slow".bright_red());
    }
}

/// Print per-stage timings and failures of a processor run
pub fn print_report(report: &ProcessReport) {
    for outcome in &report.outcomes {
        print_timing(&outcome.name, outcome.elapsed);
        if let Some(error) = &outcome.error {
            eprintln!("    {} {}", "↳".yellow(), error.to_string().bright_yellow());
        }
    }
}

/// Print the fields the pipeline filled in
pub fn print_content_details(content: &Content) {
    eprintln!("\n{}", "═".repeat(60).dimmed());
    eprintln!("{}", "Content Details".bold().cyan());
    eprintln!("{}", "═".repeat(60).dimmed());
    for (label, value) in [
        ("Title", &content.title),
        ("Author", &content.author),
        ("Site", &content.site_name),
        ("Image", &content.image),
    ] {
        if !value.is_empty() {
            print_field(label, value);
        }
    }
    if let Some(published) = content.published_time {
        print_field("Published", &published.date().to_string());
    }
    print_field("Markdown", &format_size(content.markdown.len()));
    eprintln!();
}

/// Format file size for display
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
