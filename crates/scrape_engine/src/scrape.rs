//! Strategy dispatch and static-to-dynamic fallback.

use std::sync::Arc;
use std::time::Duration;

use scrape_core::{FieldMap, ScrapeConfig, ScrapeMode, ScrapeResult, Strategy};
use scrape_logging::{scrape_debug, scrape_info, scrape_warn};

use crate::browser::{BrowserSettings, ChromiumFetcher};
use crate::extract::{extract_by_selectors, extract_full_page};
use crate::fetch::{FetchSettings, PageFetcher, ReqwestFetcher};
use crate::FetchRequest;

/// A static full-page result is kept only when `mainContent` exceeds this.
pub const MIN_STATIC_MAIN_CONTENT_CHARS: usize = 100;

/// Which extractor turns fetched markup into fields.
#[derive(Debug, Clone, Copy)]
enum Extraction<'a> {
    Selectors(&'a ScrapeConfig),
    FullPage,
}

impl Extraction<'_> {
    fn apply(self, markup: &str) -> FieldMap {
        match self {
            Extraction::Selectors(config) => extract_by_selectors(markup, &config.field_selectors),
            Extraction::FullPage => extract_full_page(markup),
        }
    }
}

/// Single-URL orchestrator over a static and a dynamic fetcher.
#[derive(Clone)]
pub struct Scraper {
    static_fetcher: Arc<dyn PageFetcher>,
    dynamic_fetcher: Arc<dyn PageFetcher>,
    settle_delay: Duration,
}

impl Scraper {
    pub fn new(fetch: FetchSettings, browser: BrowserSettings) -> Self {
        let settle_delay = browser.settle_delay;
        Self {
            static_fetcher: Arc::new(ReqwestFetcher::new(fetch)),
            dynamic_fetcher: Arc::new(ChromiumFetcher::new(browser)),
            settle_delay,
        }
    }

    /// Build over arbitrary fetchers, e.g. substitutes in tests.
    pub fn with_fetchers(
        static_fetcher: Arc<dyn PageFetcher>,
        dynamic_fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            static_fetcher,
            dynamic_fetcher,
            settle_delay: BrowserSettings::default().settle_delay,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Scrape with the caller's selectors. Never fails; failures are folded
    /// into the returned result.
    pub async fn scrape(&self, config: &ScrapeConfig) -> ScrapeResult {
        let request = FetchRequest::from(config);
        let extraction = Extraction::Selectors(config);
        match config.mode {
            ScrapeMode::Static => {
                self.attempt(self.static_fetcher.as_ref(), &request, extraction)
                    .await
            }
            ScrapeMode::Dynamic => {
                self.attempt(self.dynamic_fetcher.as_ref(), &request, extraction)
                    .await
            }
            ScrapeMode::Auto => {
                let result = self
                    .attempt(self.static_fetcher.as_ref(), &request, extraction)
                    .await;
                if result.success && result.has_data() {
                    return result;
                }
                match &result.error {
                    Some(err) => scrape_info!(
                        "static scrape of {} failed ({}), falling back to dynamic",
                        config.url,
                        err
                    ),
                    None => scrape_info!(
                        "static scrape of {} found no data, falling back to dynamic",
                        config.url
                    ),
                }
                self.attempt(self.dynamic_fetcher.as_ref(), &request, extraction)
                    .await
            }
        }
    }

    /// Heuristic whole-page scrape, static first.
    ///
    /// The static result is kept only when its `mainContent` is longer than
    /// [`MIN_STATIC_MAIN_CONTENT_CHARS`]; anything else, a static failure
    /// included, retries with the browser plus a settle delay.
    pub async fn scrape_with_full_extraction(&self, config: &ScrapeConfig) -> ScrapeResult {
        let request = FetchRequest::from(config);

        match self.static_fetcher.fetch(&request).await {
            Ok(page) => {
                let data = extract_full_page(&page.html);
                let main_chars = data
                    .get("mainContent")
                    .and_then(|value| value.as_text())
                    .map(|text| text.chars().count())
                    .unwrap_or(0);
                if main_chars > MIN_STATIC_MAIN_CONTENT_CHARS {
                    return ScrapeResult::succeeded(&config.url, data, Strategy::Static);
                }
                scrape_info!(
                    "static extraction of {} yielded limited content ({} chars), trying dynamic",
                    config.url,
                    main_chars
                );
            }
            Err(err) => {
                scrape_info!(
                    "static fetch of {} failed ({}), trying dynamic",
                    config.url,
                    err
                );
            }
        }

        let request = request.with_settle_delay(self.settle_delay);
        self.attempt(
            self.dynamic_fetcher.as_ref(),
            &request,
            Extraction::FullPage,
        )
        .await
    }

    async fn attempt(
        &self,
        fetcher: &dyn PageFetcher,
        request: &FetchRequest,
        extraction: Extraction<'_>,
    ) -> ScrapeResult {
        let strategy = fetcher.strategy();
        scrape_debug!("{} scrape of {}", strategy, request.url);
        match fetcher.fetch(request).await {
            Ok(page) => {
                let data = extraction.apply(&page.html);
                ScrapeResult::succeeded(&request.url, data, strategy)
            }
            Err(err) => {
                scrape_warn!(
                    "{} scrape of {} failed ({}): {}",
                    strategy,
                    request.url,
                    err.kind,
                    err
                );
                ScrapeResult::failed(&request.url, err.to_string(), strategy)
            }
        }
    }
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("static", &self.static_fetcher.strategy())
            .field("dynamic", &self.dynamic_fetcher.strategy())
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}
