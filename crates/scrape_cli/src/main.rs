mod cli;
mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use scrape_engine::ScrapeEngine;
use scrape_logging::{scrape_debug, LogDestination, DEFAULT_LOG_FILE};

use crate::cli::{Cli, Command, LogTarget};
use crate::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let settings = match &cli.config {
        Some(path) => settings::load(path)
            .with_context(|| format!("could not load settings from {path:?}"))?,
        None => Settings::default(),
    };
    scrape_debug!("Effective settings: {:?}", settings);

    let engine = ScrapeEngine::new(settings.engine.clone());
    let output = match cli.command {
        Command::Scrape(args) => commands::scrape(&engine, &settings, args).await?,
        Command::Bulk(args) => commands::bulk(&engine, &settings, args).await?,
    };
    println!("{output}");
    Ok(())
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match cli.log {
        LogTarget::Terminal => LogDestination::Terminal,
        LogTarget::File => LogDestination::File(PathBuf::from(DEFAULT_LOG_FILE)),
        LogTarget::Both => LogDestination::Both(PathBuf::from(DEFAULT_LOG_FILE)),
    };
    if !scrape_logging::initialize(&destination, level) {
        eprintln!("Warning: logging could not be initialized");
    }
}
