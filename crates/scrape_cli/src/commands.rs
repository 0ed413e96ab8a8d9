use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use scrape_core::{FieldSelectors, Job, JobId, QueueConfig, ScrapeConfig, ScrapeResult};
use scrape_engine::ScrapeEngine;
use scrape_logging::{scrape_info, scrape_warn};

use crate::cli::{BulkArgs, ScrapeArgs, SelectionArgs};
use crate::settings::Settings;

const PROGRESS_POLL: Duration = Duration::from_millis(500);

pub async fn scrape(
    engine: &ScrapeEngine,
    settings: &Settings,
    args: ScrapeArgs,
) -> Result<String> {
    let full = args.full || args.selection.selectors.is_empty();
    let config = scrape_config(settings, args);

    let result: ScrapeResult = if full {
        engine.scrape_with_full_extraction(&config).await
    } else {
        engine.scrape(&config).await
    };
    if let Some(err) = &result.error {
        scrape_warn!("{} failed: {}", result.url, err);
    }
    serde_json::to_string_pretty(&result).context("failed to serialize scrape result")
}

pub async fn bulk(engine: &ScrapeEngine, settings: &Settings, args: BulkArgs) -> Result<String> {
    let mut urls = args.urls;
    if let Some(path) = &args.file {
        urls.extend(read_url_list(path)?);
    }
    if urls.is_empty() {
        bail!("no URLs given; pass them as arguments or with --file");
    }

    let queue = queue_config(settings.queue, &args.selection, args.concurrency, args.delay_ms);
    let selectors = field_selectors(&args.selection);
    let mode = args.selection.mode.unwrap_or(settings.mode);

    let id = engine
        .submit_job(urls, selectors, mode, queue)
        .context("failed to submit job")?;

    let job = follow_job(engine, &id).await?;
    serde_json::to_string_pretty(&job).context("failed to serialize job")
}

async fn follow_job(engine: &ScrapeEngine, id: &JobId) -> Result<Job> {
    let mut last_completed = None;
    loop {
        let job = engine
            .get_job(id)
            .context("failed to read job state")?
            .with_context(|| format!("job {id} disappeared"))?;
        if last_completed != Some(job.completed_urls) {
            scrape_info!(
                "job {}: {}/{} ({:.0}%)",
                id,
                job.completed_urls,
                job.total_urls,
                job.progress() * 100.0
            );
            last_completed = Some(job.completed_urls);
        }
        if job.is_terminal() {
            return Ok(job);
        }
        tokio::time::sleep(PROGRESS_POLL).await;
    }
}

fn scrape_config(settings: &Settings, args: ScrapeArgs) -> ScrapeConfig {
    let timeout_ms = args.selection.timeout_ms.unwrap_or(settings.timeout_ms);
    let mut config = ScrapeConfig::new(args.url)
        .with_selectors(field_selectors(&args.selection))
        .with_mode(args.selection.mode.unwrap_or(settings.mode))
        .with_timeout(Duration::from_millis(timeout_ms));
    if let Some(selector) = args.wait_for {
        config = config.with_wait_for_selector(selector);
    }
    if let Some(proxy) = args.proxy {
        config = config.with_proxy(proxy);
    }
    config
}

fn queue_config(
    base: QueueConfig,
    selection: &SelectionArgs,
    concurrency: Option<usize>,
    delay_ms: Option<u64>,
) -> QueueConfig {
    QueueConfig {
        concurrency: concurrency.unwrap_or(base.concurrency),
        delay_ms: delay_ms.unwrap_or(base.delay_ms),
        timeout_ms: selection.timeout_ms.unwrap_or(base.timeout_ms),
    }
}

fn field_selectors(selection: &SelectionArgs) -> FieldSelectors {
    selection.selectors.iter().cloned().collect::<BTreeMap<_, _>>()
}

fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read URL list {path:?}"))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
