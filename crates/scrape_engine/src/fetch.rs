use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use scrape_core::Strategy;
use scrape_logging::{scrape_debug, scrape_warn};
use serde::{Deserialize, Serialize};

use crate::decode::decode_html;
use crate::{FailureKind, FetchError, FetchRequest};

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const STATIC_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const STATIC_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: DESKTOP_USER_AGENT.to_string(),
        }
    }
}

/// Raw page markup produced by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub final_url: String,
    pub html: String,
}

/// One way of acquiring page markup.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Tag recorded on results produced from this fetcher's markup.
    fn strategy(&self) -> Strategy;

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError>;
}

/// Static strategy: one HTTP GET, no script execution.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn build_client(
        &self,
        proxy: Option<&str>,
        redirect_counter: Arc<AtomicUsize>,
    ) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .user_agent(self.settings.user_agent.clone())
            .redirect(policy);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|err| {
                FetchError::new(FailureKind::InvalidUrl, format!("invalid proxy: {err}"))
            })?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }
}

#[async_trait::async_trait]
impl PageFetcher for ReqwestFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Static
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let parsed = url::Url::parse(&request.url).map_err(|err| {
            FetchError::new(FailureKind::InvalidUrl, format!("invalid url: {err}"))
        })?;
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = self.build_client(request.proxy.as_deref(), redirect_counter.clone())?;

        scrape_debug!("static fetch {} (timeout {:?})", parsed, request.timeout);

        // The request timeout covers connect through the end of the body.
        let response = client
            .get(parsed)
            .header(ACCEPT, STATIC_ACCEPT)
            .header(ACCEPT_LANGUAGE, STATIC_ACCEPT_LANGUAGE)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status_message(status),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, content_len));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| map_reqwest_error(err, request.timeout))?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        let decoded = decode_html(&bytes, content_type.as_deref());
        if decoded.had_replacements {
            scrape_warn!(
                "{} decoded as {} with replacement characters",
                final_url,
                decoded.encoding_label
            );
        }
        scrape_debug!(
            "static fetch {} done: {} bytes, {} redirects",
            final_url,
            bytes.len(),
            redirect_counter.load(Ordering::Relaxed)
        );

        Ok(FetchedPage {
            final_url,
            html: decoded.html,
        })
    }
}

/// `HTTP <status>: <reason>`, matching what browsers report as status text.
fn status_message(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {}: {}", status.as_u16(), reason),
        None => format!("HTTP {}:", status.as_u16()),
    }
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        format!("response too large ({actual} bytes, limit {max_bytes})"),
    )
}

fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        return FetchError::timeout(timeout);
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
