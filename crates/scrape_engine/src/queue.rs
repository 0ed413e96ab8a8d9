//! Bulk jobs: bounded-concurrency processing with pacing and progress.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use scrape_core::{FieldSelectors, Job, JobId, QueueConfig, ScrapeConfig, ScrapeMode};
use scrape_logging::{scrape_debug, scrape_error, scrape_info};

use crate::scrape::Scraper;
use crate::store::{JobStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("job submission requires a running tokio runtime")]
    NoRuntime,
    #[error("job {0} not found")]
    UnknownJob(JobId),
    #[error("job {0} did not finish in time")]
    WaitTimedOut(JobId),
}

/// What a submitted job scrapes and how.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub urls: Vec<String>,
    pub field_selectors: FieldSelectors,
    pub mode: ScrapeMode,
    pub queue: QueueConfig,
}

impl JobSpec {
    fn unit_config(&self, url: String) -> ScrapeConfig {
        ScrapeConfig::new(url)
            .with_selectors(self.field_selectors.clone())
            .with_mode(self.mode)
            .with_timeout(self.queue.timeout())
    }
}

/// Submits jobs and drives them on the ambient tokio runtime.
#[derive(Clone)]
pub struct JobQueue {
    scraper: Scraper,
    store: Arc<dyn JobStore>,
}

impl JobQueue {
    pub fn new(scraper: Scraper, store: Arc<dyn JobStore>) -> Self {
        Self { scraper, store }
    }

    /// Register a `Pending` job and start processing it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, spec: JobSpec) -> Result<JobId, QueueError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        let id = JobId::generate();
        self.store.insert(Job::new(id.clone(), spec.urls.len()))?;
        scrape_info!(
            "job {} submitted: {} urls, mode {}, concurrency {}, delay {}ms",
            id,
            spec.urls.len(),
            spec.mode,
            spec.queue.effective_concurrency(),
            spec.queue.delay_ms
        );

        let scraper = self.scraper.clone();
        let store = self.store.clone();
        let job_id = id.clone();
        runtime.spawn(async move {
            supervise(scraper, store, job_id, spec).await;
        });

        Ok(id)
    }
}

/// Runs the job on its own task so a panic there is observed here and the
/// job still reaches a terminal status.
async fn supervise(scraper: Scraper, store: Arc<dyn JobStore>, id: JobId, spec: JobSpec) {
    let worker = tokio::spawn(process(scraper, store.clone(), id.clone(), spec));

    let fault = match worker.await {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err.to_string(),
        Err(join) if join.is_panic() => "processing task panicked".to_string(),
        Err(join) => join.to_string(),
    };

    scrape_error!("job {} failed: {}", id, fault);
    if let Err(err) = store.update(&id, &mut |job| {
        job.fail();
    }) {
        scrape_error!("job {} could not be marked failed: {}", id, err);
    }
}

async fn process(
    scraper: Scraper,
    store: Arc<dyn JobStore>,
    id: JobId,
    spec: JobSpec,
) -> Result<(), StoreError> {
    let exists = store.update(&id, &mut |job| {
        job.start();
    })?;
    if !exists {
        scrape_debug!("job {} removed before start", id);
        return Ok(());
    }

    let concurrency = spec.queue.effective_concurrency();
    let delay = spec.queue.delay();
    scrape_info!("job {} running", id);

    let scraper = &scraper;
    let spec_ref = &spec;
    let mut units = stream::iter(spec.urls.iter().cloned().enumerate())
        .map(move |(index, url)| async move {
            // Global pacing: applies to every unit after the first, whatever its host.
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let config = spec_ref.unit_config(url);
            scraper.scrape(&config).await
        })
        .buffer_unordered(concurrency);

    while let Some(result) = units.next().await {
        scrape_debug!(
            "job {}: {} {}",
            id,
            result.url,
            if result.success { "ok" } else { "failed" }
        );
        let mut pending = Some(result);
        let exists = store.update(&id, &mut |job| {
            if let Some(result) = pending.take() {
                job.record(result);
            }
        })?;
        if !exists {
            scrape_debug!("job {} removed while running; dropping result", id);
        }
    }

    store.update(&id, &mut |job| {
        if job.complete() {
            scrape_info!(
                "job {} completed: {} ok, {} failed",
                job.id,
                job.succeeded_count(),
                job.failed_count()
            );
        }
    })?;
    Ok(())
}
