//! Command-line definitions for `webscrape`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use scrape_core::ScrapeMode;

/// Scrape structured data from web pages, one URL or many.
///
/// ```sh
/// webscrape scrape https://example.com -s title=h1 -s links="a.nav"
/// webscrape scrape https://example.com --full
/// webscrape bulk --file urls.txt -s title=h1 --concurrency 4
/// ```
#[derive(Parser, Debug)]
#[command(name = "webscrape", author, version, about)]
pub struct Cli {
    /// Optional RON settings file; CLI flags take precedence.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Where log output goes.
    #[arg(long, value_enum, default_value_t = LogTarget::Terminal, global = true)]
    pub log: LogTarget,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape a single URL and print the result as JSON.
    Scrape(ScrapeArgs),
    /// Run a bulk job over many URLs and print the finished job as JSON.
    Bulk(BulkArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Field selector as `name=css`; repeatable.
    #[arg(short = 's', long = "select", value_parser = parse_selector)]
    pub selectors: Vec<(String, String)>,

    /// static, dynamic or auto.
    #[arg(short, long)]
    pub mode: Option<ScrapeMode>,

    /// Per-page timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    pub url: String,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Wait for this selector after rendering (dynamic fetch).
    #[arg(long)]
    pub wait_for: Option<String>,

    /// Proxy URL for both fetch strategies.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Use full-page extraction. Implied when no selectors are given.
    #[arg(long)]
    pub full: bool,
}

#[derive(Args, Debug)]
pub struct BulkArgs {
    pub urls: Vec<String>,

    /// File with one URL per line; `#` starts a comment.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Pause before each URL after the first, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,
}

fn parse_selector(raw: &str) -> Result<(String, String), String> {
    let (name, css) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=selector, got `{raw}`"))?;
    let name = name.trim();
    let css = css.trim();
    if name.is_empty() || css.is_empty() {
        return Err(format!("expected name=selector, got `{raw}`"));
    }
    Ok((name.to_string(), css.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scrape_parses_selectors_and_mode() {
        let cli = Cli::parse_from([
            "webscrape",
            "scrape",
            "https://example.com",
            "-s",
            "title=h1",
            "--select",
            "price = .price span",
            "--mode",
            "Dynamic",
            "--timeout-ms",
            "5000",
        ]);

        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape subcommand");
        };
        assert_eq!(args.url, "https://example.com");
        assert_eq!(
            args.selection.selectors,
            vec![
                ("title".to_string(), "h1".to_string()),
                ("price".to_string(), ".price span".to_string()),
            ]
        );
        assert_eq!(args.selection.mode, Some(ScrapeMode::Dynamic));
        assert_eq!(args.selection.timeout_ms, Some(5000));
        assert!(!args.full);
        assert_eq!(cli.log, LogTarget::Terminal);
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::parse_from([
            "webscrape",
            "bulk",
            "https://a.test",
            "https://b.test",
            "--concurrency",
            "4",
            "--log",
            "both",
            "-v",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.log, LogTarget::Both);
        let Command::Bulk(args) = cli.command else {
            panic!("expected bulk subcommand");
        };
        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.concurrency, Some(4));
    }

    #[test]
    fn malformed_selector_is_rejected() {
        let parsed = Cli::try_parse_from(["webscrape", "scrape", "https://x.test", "-s", "title"]);
        assert!(parsed.is_err());
        assert!(parse_selector("=h1").is_err());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let parsed =
            Cli::try_parse_from(["webscrape", "scrape", "https://x.test", "--mode", "turbo"]);
        assert!(parsed.is_err());
    }
}
