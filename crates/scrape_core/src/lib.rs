//! Scrape core: plain data records and the job lifecycle state machine.
mod config;
mod job;
mod mode;
mod result;

pub use config::{FieldSelectors, QueueConfig, ScrapeConfig, DEFAULT_SCRAPE_TIMEOUT_MS};
pub use job::{Job, JobId, JobStatus};
pub use mode::{ParseModeError, ScrapeMode, Strategy};
pub use result::{FieldMap, FieldValue, ScrapeResult};
