//! Dynamic strategy: render the page in a throwaway headless Chromium.
//!
//! Every fetch launches its own browser with its own profile directory and
//! tears it down before returning, whatever the outcome. A hung or crashed
//! instance therefore cannot leak into a sibling fetch.

use std::collections::HashSet;
use std::hash::Hash;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, Headers, RequestId,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures_util::StreamExt;
use scrape_core::Strategy;
use scrape_logging::{scrape_debug, scrape_info, scrape_warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};

use crate::fetch::{millis, FetchedPage, PageFetcher};
use crate::{FailureKind, FetchError, FetchRequest};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

const CLOSE_GRACE: Duration = Duration::from_secs(5);

const LAUNCH_ARGS: [&str; 4] = [
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
];

/// Injected before any page script runs.
pub(crate) const STEALTH_SCRIPT: &str = r#"
(() => {
    Object.defineProperty(navigator, 'webdriver', { get: () => false });

    window.chrome = { runtime: {} };

    const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
    if (originalQuery) {
        window.navigator.permissions.query = (parameters) => (
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery.call(window.navigator.permissions, parameters)
        );
    }

    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
})();
"#;

pub(crate) fn browser_headers() -> serde_json::Value {
    serde_json::json!({
        "Accept-Language": "en-US,en;q=0.9",
        "Accept": "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        "Upgrade-Insecure-Requests": "1",
        "Sec-Fetch-Dest": "document",
        "Sec-Fetch-Mode": "navigate",
        "Sec-Fetch-Site": "none",
        "Sec-Fetch-User": "?1",
        "Sec-Ch-Ua": "\"Google Chrome\";v=\"119\", \"Chromium\";v=\"119\", \"Not?A_Brand\";v=\"24\"",
        "Sec-Ch-Ua-Mobile": "?0",
        "Sec-Ch-Ua-Platform": "\"Windows\"",
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit Chrome/Chromium binary; auto-detected when unset.
    pub chrome_executable: Option<PathBuf>,
    pub extra_args: Vec<String>,
    /// Parent directory for per-launch profile directories; system temp dir
    /// when unset.
    pub profile_root: Option<PathBuf>,
    pub user_agent: String,
    /// Quiet period that counts as network idle.
    #[serde(with = "millis")]
    pub idle_window: Duration,
    /// In-flight requests still tolerated while idle.
    pub idle_max_connections: usize,
    /// Pause after navigation for full-page extraction.
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    #[serde(with = "millis")]
    pub selector_poll_interval: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            extra_args: Vec::new(),
            profile_root: None,
            user_agent: BROWSER_USER_AGENT.to_string(),
            idle_window: Duration::from_millis(500),
            idle_max_connections: 2,
            settle_delay: Duration::from_millis(1_000),
            selector_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Headless-browser strategy backed by chromiumoxide.
#[derive(Debug, Clone, Default)]
pub struct ChromiumFetcher {
    settings: BrowserSettings,
}

impl ChromiumFetcher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    async fn render(
        &self,
        session: &BrowserSession,
        request: &FetchRequest,
        deadline: Instant,
    ) -> Result<FetchedPage, FetchError> {
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|err| navigation_error("failed to open page", err))?;
        self.prepare_page(&page).await?;

        // Listeners go up before navigation so no request is missed.
        let mut started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|err| navigation_error("failed to observe network", err))?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|err| navigation_error("failed to observe network", err))?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|err| navigation_error("failed to observe network", err))?;

        page.goto(request.url.as_str())
            .await
            .map_err(|err| navigation_error("navigation failed", err))?;

        wait_for_network_idle(
            &mut started,
            &mut finished,
            &mut failed,
            self.settings.idle_window,
            self.settings.idle_max_connections,
        )
        .await;
        scrape_debug!("dynamic fetch {}: network idle", request.url);

        if let Some(selector) = request.wait_for_selector.as_deref() {
            wait_for_selector(&page, selector, self.settings.selector_poll_interval, deadline)
                .await?;
        }

        if let Some(delay) = request.settle_delay {
            tokio::time::sleep(delay).await;
        }

        let html = page
            .content()
            .await
            .map_err(|err| navigation_error("failed to read page content", err))?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .map(|url| url.to_string())
            .unwrap_or_else(|| request.url.clone());

        Ok(FetchedPage { final_url, html })
    }

    async fn prepare_page(&self, page: &Page) -> Result<(), FetchError> {
        page.execute(SetUserAgentOverrideParams::new(self.settings.user_agent.clone()))
            .await
            .map_err(|err| navigation_error("failed to set user agent", err))?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(browser_headers())))
            .await
            .map_err(|err| navigation_error("failed to set headers", err))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|err| navigation_error("failed to inject stealth script", err))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageFetcher for ChromiumFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Dynamic
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let deadline = Instant::now() + request.timeout;

        let session = match timeout_at(
            deadline,
            BrowserSession::launch(&self.settings, request),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(FetchError::timeout(request.timeout)),
        };

        let outcome = match timeout_at(deadline, self.render(&session, request, deadline)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::timeout(request.timeout)),
        };

        session.close().await;
        outcome
    }
}

/// One launched browser plus its CDP event pump and scratch profile.
///
/// `close` is the normal release path. Dropping without `close` still stops
/// the pump, and chromiumoxide kills the child process on drop.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    _profile: tempfile::TempDir,
}

impl BrowserSession {
    async fn launch(
        settings: &BrowserSettings,
        request: &FetchRequest,
    ) -> Result<Self, FetchError> {
        let mut profile_builder = tempfile::Builder::new();
        profile_builder.prefix("webscrape-profile-");
        let profile = match settings.profile_root.as_deref() {
            Some(root) => profile_builder.tempdir_in(root),
            None => profile_builder.tempdir(),
        }
        .map_err(|err| {
            FetchError::new(
                FailureKind::BrowserLaunch,
                format!("failed to create browser profile: {err}"),
            )
        })?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile.path())
            .request_timeout(request.timeout);
        for arg in LAUNCH_ARGS {
            builder = builder.arg(arg);
        }
        for arg in &settings.extra_args {
            builder = builder.arg(arg.as_str());
        }
        if let Some(proxy) = request.proxy.as_deref() {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        if let Some(path) = settings.chrome_executable.as_ref() {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(|err| {
            FetchError::new(
                FailureKind::BrowserLaunch,
                format!("invalid browser config: {err}"),
            )
        })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|err| {
            FetchError::new(
                FailureKind::BrowserLaunch,
                format!("failed to launch browser: {err}"),
            )
        })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    scrape_debug!("browser handler event error: {}", err);
                }
            }
        });

        scrape_info!("launched headless browser for {}", request.url);
        Ok(Self {
            browser,
            handler,
            _profile: profile,
        })
    }

    async fn close(mut self) {
        match timeout(CLOSE_GRACE, self.browser.close()).await {
            Ok(Ok(_)) => {
                if let Err(err) = self.browser.wait().await {
                    scrape_warn!("browser did not exit cleanly: {}", err);
                }
            }
            Ok(Err(err)) => scrape_warn!("browser close failed: {}", err),
            Err(_) => scrape_warn!("browser close timed out; killing"),
        }
        self.handler.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// In-flight request bookkeeping for the network-idle wait.
///
/// The quiet period starts when the in-flight count drops to `max_in_flight`
/// or below and is reset only when it rises above that again. Requests that
/// come and go without crossing the ceiling do not restart it.
#[derive(Debug)]
pub(crate) struct IdleTracker<K> {
    in_flight: HashSet<K>,
    max_in_flight: usize,
    window: Duration,
    quiet_since: Option<Instant>,
}

impl<K: Eq + Hash> IdleTracker<K> {
    pub(crate) fn new(max_in_flight: usize, window: Duration, now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            max_in_flight,
            window,
            quiet_since: Some(now),
        }
    }

    /// Redirects reuse the request id, so a repeated start is a no-op.
    pub(crate) fn request_started(&mut self, id: K, now: Instant) {
        self.in_flight.insert(id);
        self.refresh(now);
    }

    pub(crate) fn request_ended(&mut self, id: &K, now: Instant) {
        self.in_flight.remove(id);
        self.refresh(now);
    }

    /// When the page counts as idle, if no request pushes the count over the
    /// ceiling before then.
    pub(crate) fn idle_at(&self) -> Option<Instant> {
        self.quiet_since.map(|since| since + self.window)
    }

    pub(crate) fn is_idle(&self, now: Instant) -> bool {
        self.idle_at().is_some_and(|at| now >= at)
    }

    fn refresh(&mut self, now: Instant) {
        if self.in_flight.len() > self.max_in_flight {
            self.quiet_since = None;
        } else if self.quiet_since.is_none() {
            self.quiet_since = Some(now);
        }
    }
}

async fn wait_for_network_idle(
    started: &mut EventStream<EventRequestWillBeSent>,
    finished: &mut EventStream<EventLoadingFinished>,
    failed: &mut EventStream<EventLoadingFailed>,
    window: Duration,
    max_in_flight: usize,
) {
    let mut tracker: IdleTracker<RequestId> =
        IdleTracker::new(max_in_flight, window, Instant::now());
    loop {
        let idle_at = tracker.idle_at();
        tokio::select! {
            Some(event) = started.next() => {
                tracker.request_started(event.request_id.clone(), Instant::now());
            }
            Some(event) = finished.next() => {
                tracker.request_ended(&event.request_id, Instant::now());
            }
            Some(event) = failed.next() => {
                tracker.request_ended(&event.request_id, Instant::now());
            }
            _ = sleep_until(idle_at.unwrap_or_else(Instant::now)), if idle_at.is_some() => return,
            else => return,
        }
    }
}

async fn wait_for_selector(
    page: &Page,
    selector: &str,
    poll_interval: Duration,
    deadline: Instant,
) -> Result<(), FetchError> {
    let poll = async {
        loop {
            if page.find_element(selector).await.is_ok() {
                return;
            }
            tokio::time::sleep(poll_interval).await;
        }
    };
    timeout_at(deadline, poll).await.map_err(|_| {
        FetchError::new(
            FailureKind::SelectorTimeout,
            format!("waiting for selector `{selector}` timed out"),
        )
    })
}

fn navigation_error(context: &str, err: impl std::fmt::Display) -> FetchError {
    FetchError::new(FailureKind::Navigation, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn stealth_script_patches_detection_checks() {
        for check in ["webdriver", "window.chrome", "permissions.query", "plugins", "languages"] {
            assert!(STEALTH_SCRIPT.contains(check), "missing patch for {check}");
        }
    }

    #[test]
    fn short_requests_under_ceiling_do_not_reset_quiet_period() {
        let base = Instant::now();
        let mut tracker = IdleTracker::new(2, Duration::from_millis(500), base);

        // A beacon every 400ms, each finishing within 50ms.
        for (n, start) in [0u64, 400, 800].into_iter().enumerate() {
            tracker.request_started(n, ms(base, start));
            tracker.request_ended(&n, ms(base, start + 50));
        }

        assert_eq!(tracker.idle_at(), Some(ms(base, 500)));
        assert!(!tracker.is_idle(ms(base, 499)));
        assert!(tracker.is_idle(ms(base, 500)));
    }

    #[test]
    fn crossing_the_ceiling_restarts_quiet_period() {
        let base = Instant::now();
        let mut tracker = IdleTracker::new(2, Duration::from_millis(500), base);

        tracker.request_started("a", ms(base, 0));
        tracker.request_started("b", ms(base, 10));
        assert_eq!(tracker.idle_at(), Some(ms(base, 500)));

        tracker.request_started("c", ms(base, 20));
        assert_eq!(tracker.idle_at(), None);
        assert!(!tracker.is_idle(ms(base, 5_000)));

        tracker.request_ended(&"a", ms(base, 300));
        assert_eq!(tracker.idle_at(), Some(ms(base, 800)));

        // Back at the ceiling; more churn below it keeps the clock.
        tracker.request_started("d", ms(base, 400));
        assert_eq!(tracker.idle_at(), None);
        tracker.request_ended(&"d", ms(base, 450));
        tracker.request_ended(&"b", ms(base, 500));
        tracker.request_started("e", ms(base, 600));
        tracker.request_ended(&"e", ms(base, 650));
        assert_eq!(tracker.idle_at(), Some(ms(base, 950)));
    }

    #[test]
    fn repeated_start_for_redirect_counts_once() {
        let base = Instant::now();
        let mut tracker = IdleTracker::new(0, Duration::from_millis(500), base);

        tracker.request_started("doc", ms(base, 0));
        tracker.request_started("doc", ms(base, 30));
        assert_eq!(tracker.idle_at(), None);

        tracker.request_ended(&"doc", ms(base, 100));
        assert_eq!(tracker.idle_at(), Some(ms(base, 600)));
    }

    #[test]
    fn headers_mimic_browser_navigation() {
        let headers = browser_headers();
        for name in [
            "Accept",
            "Accept-Language",
            "Sec-Fetch-Dest",
            "Sec-Fetch-Mode",
            "Sec-Fetch-Site",
            "Sec-Fetch-User",
            "Sec-Ch-Ua",
            "Sec-Ch-Ua-Mobile",
            "Sec-Ch-Ua-Platform",
        ] {
            assert!(headers.get(name).is_some(), "missing header {name}");
        }
    }

    #[test]
    fn default_settings_match_network_idle_policy() {
        let settings = BrowserSettings::default();
        assert_eq!(settings.idle_window, Duration::from_millis(500));
        assert_eq!(settings.idle_max_connections, 2);
        assert_eq!(settings.settle_delay, Duration::from_secs(1));
    }
}
