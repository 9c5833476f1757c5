use std::{env, fs, path::PathBuf};

use clap::ArgAction;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("gleaner")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gleaner Contributors")
        .about("Fetch a web page and save it as clean Markdown")
        .arg(clap::arg!(<URL> "http(s) URL of the page to fetch"))
        .arg(clap::arg!(-b --browser "Render the page in a remote headless browser").action(ArgAction::SetTrue))
        .arg(
            clap::arg!(--"browser-url" <URL> "DevTools endpoint of the browser used with --browser")
                .env("BROWSER_CONTROL_URL"),
        )
        .arg(clap::arg!(-r --remote "Delegate extraction to the hosted reader service").action(ArgAction::SetTrue))
        .arg(clap::arg!(--"api-key" <KEY> "API key for the reader service").env("READER_API_KEY"))
        .arg(clap::arg!(--"reader-endpoint" <URL> "Endpoint of the reader service").env("READER_API_ENDPOINT"))
        .arg(
            clap::arg!(-o --"output-dir" <DIR> "Directory the Markdown file is written to")
                .default_value(".")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--timeout <SECS> "HTTP timeout in seconds").default_value("30"))
        .arg(clap::arg!(-v --verbose "Enable debug logging and per-stage timings").action(ArgAction::SetTrue));

    for shell in [
        clap_complete::Shell::Bash,
        clap_complete::Shell::Zsh,
        clap_complete::Shell::Fish,
        clap_complete::Shell::PowerShell,
    ] {
        clap_complete::generate_to(shell, &mut cmd, "gleaner", &completions_dir).unwrap();
    }

    println!("cargo:warning=Shell completions generated in: {}", completions_dir.display());
}
