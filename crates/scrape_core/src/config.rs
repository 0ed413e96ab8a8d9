use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ScrapeMode;

/// Field name to CSS selector.
pub type FieldSelectors = BTreeMap<String, String>;

pub const DEFAULT_SCRAPE_TIMEOUT_MS: u64 = 300_000;

/// Per-invocation scrape request. Immutable once handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeConfig {
    pub url: String,
    #[serde(default)]
    pub field_selectors: FieldSelectors,
    #[serde(default)]
    pub mode: ScrapeMode,
    #[serde(default = "default_scrape_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

fn default_scrape_timeout_ms() -> u64 {
    DEFAULT_SCRAPE_TIMEOUT_MS
}

impl ScrapeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            field_selectors: FieldSelectors::new(),
            mode: ScrapeMode::Auto,
            timeout_ms: DEFAULT_SCRAPE_TIMEOUT_MS,
            wait_for_selector: None,
            proxy: None,
        }
    }

    pub fn with_selector(mut self, field: impl Into<String>, selector: impl Into<String>) -> Self {
        self.field_selectors.insert(field.into(), selector.into());
        self
    }

    pub fn with_selectors(mut self, selectors: FieldSelectors) -> Self {
        self.field_selectors = selectors;
        self
    }

    pub fn with_mode(mut self, mode: ScrapeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        self
    }

    pub fn with_wait_for_selector(mut self, selector: impl Into<String>) -> Self {
        self.wait_for_selector = Some(selector.into());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Bulk job pacing and bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            delay_ms: 1_000,
            timeout_ms: 30_000,
        }
    }
}

impl QueueConfig {
    /// Concurrency with zero clamped to one slot.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
