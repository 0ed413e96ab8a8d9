use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ScrapeResult;

static NEXT_JOB_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque job identifier, unique within the process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// `job_<unix-millis>_<sequence>`.
    pub fn generate() -> Self {
        let seq = NEXT_JOB_SEQ.fetch_add(1, Ordering::Relaxed);
        JobId(format!("job_{}_{}", Utc::now().timestamp_millis(), seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing numeric sequence of a generated id, if it has one.
    pub fn sequence(&self) -> Option<u64> {
        let (_, seq) = self.0.rsplit_once('_')?;
        seq.parse().ok()
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        JobId(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        JobId(value)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Bulk scrape progress record.
///
/// Invariants kept by the transition methods:
/// - `completed_urls == results.len()`
/// - `completed_urls <= total_urls`
/// - a terminal status is entered at most once and never left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub total_urls: usize,
    pub completed_urls: usize,
    pub results: Vec<ScrapeResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, total_urls: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            total_urls,
            completed_urls: 0,
            results: Vec::with_capacity(total_urls),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_finished(&self) -> bool {
        self.completed_urls >= self.total_urls
    }

    /// Fraction of URLs with a result, in `[0, 1]`. An empty job counts as done.
    pub fn progress(&self) -> f64 {
        if self.total_urls == 0 {
            return 1.0;
        }
        self.completed_urls as f64 / self.total_urls as f64
    }

    /// Pending -> Running. Returns whether the status changed.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.touch();
        true
    }

    /// Append a unit result in completion order.
    ///
    /// Ignored once the job is terminal or already holds `total_urls` results.
    pub fn record(&mut self, result: ScrapeResult) -> bool {
        if self.is_terminal() || self.is_finished() {
            return false;
        }
        self.results.push(result);
        self.completed_urls = self.results.len();
        self.touch();
        true
    }

    /// Enter `Completed`. No-op if already terminal.
    pub fn complete(&mut self) -> bool {
        self.finish(JobStatus::Completed)
    }

    /// Enter `Failed`. No-op if already terminal.
    pub fn fail(&mut self) -> bool {
        self.finish(JobStatus::Failed)
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.succeeded_count()
    }

    fn finish(&mut self, status: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = status;
        self.touch();
        true
    }

    fn touch(&mut self) {
        let now = Utc::now();
        // Clock adjustments must not make updated_at run backwards.
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}
