//! Scrape engine: fetch strategies, extraction, orchestration and bulk jobs.
mod browser;
mod decode;
mod engine;
mod extract;
mod fetch;
mod queue;
mod scrape;
mod store;
mod types;

pub use browser::{BrowserSettings, ChromiumFetcher, BROWSER_USER_AGENT};
pub use decode::{decode_html, DecodedHtml};
pub use engine::{EngineConfig, ScrapeEngine};
pub use extract::{
    extract_by_selectors, extract_full_page, MAX_IMAGES, MAX_LINKS, MAX_LIST_ITEMS,
    MAX_MAIN_CONTENT_CHARS, MAX_TABLES, MIN_PARAGRAPH_CHARS,
};
pub use fetch::{FetchSettings, FetchedPage, PageFetcher, ReqwestFetcher, DESKTOP_USER_AGENT};
pub use queue::{JobQueue, JobSpec, QueueError};
pub use scrape::{Scraper, MIN_STATIC_MAIN_CONTENT_CHARS};
pub use store::{JobStore, MemoryJobStore, StoreError, StoreResult};
pub use types::{FailureKind, FetchError, FetchRequest};
