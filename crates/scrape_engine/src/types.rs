use std::fmt;
use std::time::Duration;

use scrape_core::ScrapeConfig;

/// What a fetch strategy needs to acquire one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub timeout: Duration,
    pub wait_for_selector: Option<String>,
    pub proxy: Option<String>,
    /// Extra pause after navigation so late scripts can settle (dynamic only).
    pub settle_delay: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            wait_for_selector: None,
            proxy: None,
            settle_delay: None,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }
}

impl From<&ScrapeConfig> for FetchRequest {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            url: config.url.clone(),
            timeout: config.timeout(),
            wait_for_selector: config.wait_for_selector.clone(),
            proxy: config.proxy.clone(),
            settle_delay: None,
        }
    }
}

/// Strategy failure. Displays as its message, which is what ends up in
/// `ScrapeResult::error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn timeout(timeout: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("timed out after {}ms", timeout.as_millis()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
    BrowserLaunch,
    Navigation,
    SelectorTimeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
            FailureKind::BrowserLaunch => write!(f, "browser launch failed"),
            FailureKind::Navigation => write!(f, "navigation failed"),
            FailureKind::SelectorTimeout => write!(f, "selector wait timed out"),
        }
    }
}
