use std::sync::Arc;
use std::time::Duration;

use scrape_core::{FieldSelectors, Job, JobId, QueueConfig, ScrapeConfig, ScrapeMode, ScrapeResult};
use serde::{Deserialize, Serialize};

use crate::browser::BrowserSettings;
use crate::fetch::FetchSettings;
use crate::queue::{JobQueue, JobSpec, QueueError};
use crate::scrape::Scraper;
use crate::store::{JobStore, MemoryJobStore, StoreError};

const JOB_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fetch: FetchSettings,
    pub browser: BrowserSettings,
}

/// Composition root: one orchestrator, one job store, one queue.
#[derive(Clone)]
pub struct ScrapeEngine {
    scraper: Scraper,
    queue: JobQueue,
    store: Arc<dyn JobStore>,
}

impl ScrapeEngine {
    pub fn new(config: EngineConfig) -> Self {
        let scraper = Scraper::new(config.fetch, config.browser);
        Self::with_parts(scraper, Arc::new(MemoryJobStore::new()))
    }

    pub fn with_parts(scraper: Scraper, store: Arc<dyn JobStore>) -> Self {
        let queue = JobQueue::new(scraper.clone(), store.clone());
        Self {
            scraper,
            queue,
            store,
        }
    }

    pub async fn scrape(&self, config: &ScrapeConfig) -> ScrapeResult {
        self.scraper.scrape(config).await
    }

    pub async fn scrape_with_full_extraction(&self, config: &ScrapeConfig) -> ScrapeResult {
        self.scraper.scrape_with_full_extraction(config).await
    }

    /// Fire-and-forget bulk submission. Requires a tokio runtime.
    pub fn submit_job(
        &self,
        urls: Vec<String>,
        field_selectors: FieldSelectors,
        mode: ScrapeMode,
        queue: QueueConfig,
    ) -> Result<JobId, QueueError> {
        self.queue.submit(JobSpec {
            urls,
            field_selectors,
            mode,
            queue,
        })
    }

    pub fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        self.store.get(id)
    }

    /// Newest first. Ties on `created_at` fall back to the id's numeric
    /// sequence, then to the id text, both descending.
    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = self.store.list()?;
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.sequence().cmp(&a.id.sequence()))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(jobs)
    }

    pub fn delete_job(&self, id: &JobId) -> Result<bool, StoreError> {
        self.store.remove(id)
    }

    /// Remove every `Completed` or `Failed` job.
    pub fn clear_completed_jobs(&self) -> Result<usize, StoreError> {
        self.store.remove_where(&|job| job.is_terminal())
    }

    /// Poll until the job is terminal or `deadline` elapses.
    pub async fn wait_for_job(&self, id: &JobId, deadline: Duration) -> Result<Job, QueueError> {
        tokio::time::timeout(deadline, self.poll_until_terminal(id))
            .await
            .map_err(|_| QueueError::WaitTimedOut(id.clone()))?
    }

    async fn poll_until_terminal(&self, id: &JobId) -> Result<Job, QueueError> {
        loop {
            match self.store.get(id)? {
                Some(job) if job.is_terminal() => return Ok(job),
                Some(_) => tokio::time::sleep(JOB_POLL_INTERVAL).await,
                None => return Err(QueueError::UnknownJob(id.clone())),
            }
        }
    }
}
