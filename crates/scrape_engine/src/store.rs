//! Job registry storage.

use std::collections::HashMap;
use std::sync::RwLock;

use scrape_core::{Job, JobId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job store lock poisoned")]
    Poisoned,
    #[error("job {0} already exists")]
    Duplicate(JobId),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage for job records.
///
/// Every method is atomic with respect to a single job. `update` runs the
/// closure while holding exclusive access to the record, so concurrent
/// completions for the same job are serialized.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job) -> StoreResult<()>;

    fn get(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// All jobs, in no particular order.
    fn list(&self) -> StoreResult<Vec<Job>>;

    /// Mutate a job in place. Returns `false` when the job does not exist.
    fn update(&self, id: &JobId, apply: &mut dyn FnMut(&mut Job)) -> StoreResult<bool>;

    fn remove(&self, id: &JobId) -> StoreResult<bool>;

    /// Remove every job matching `predicate`; returns how many were removed.
    fn remove_where(&self, predicate: &dyn Fn(&Job) -> bool) -> StoreResult<usize>;
}

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.jobs.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.len().map(|len| len == 0)
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) -> StoreResult<()> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::Poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(jobs.get(id).cloned())
    }

    fn list(&self) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(jobs.values().cloned().collect())
    }

    fn update(&self, id: &JobId, apply: &mut dyn FnMut(&mut Job)) -> StoreResult<bool> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::Poisoned)?;
        match jobs.get_mut(id) {
            Some(job) => {
                apply(job);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, id: &JobId) -> StoreResult<bool> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::Poisoned)?;
        Ok(jobs.remove(id).is_some())
    }

    fn remove_where(&self, predicate: &dyn Fn(&Job) -> bool) -> StoreResult<usize> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::Poisoned)?;
        let before = jobs.len();
        jobs.retain(|_, job| !predicate(job));
        Ok(before - jobs.len())
    }
}
