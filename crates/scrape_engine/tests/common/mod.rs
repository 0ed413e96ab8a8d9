#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use scrape_core::Strategy;
use scrape_engine::{FailureKind, FetchError, FetchRequest, FetchedPage, PageFetcher};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(scrape_logging::initialize_for_tests);
}

/// What a scripted fetcher does for one URL.
#[derive(Debug, Clone)]
pub enum Reply {
    Html(String),
    Fail(String),
    Panic,
    /// Html after an extra pause on top of the fetcher's latency.
    Slow(Duration, String),
}

/// Substitute strategy answering from a per-URL script.
pub struct ScriptedFetcher {
    strategy: Strategy,
    default: Reply,
    replies: Mutex<Vec<(String, Reply)>>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

/// Counts a fetch as in flight until dropped, including on panic.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedFetcher {
    pub fn new(strategy: Strategy, default: Reply) -> Self {
        Self {
            strategy,
            default,
            replies: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn html(strategy: Strategy, html: &str) -> Self {
        Self::new(strategy, Reply::Html(html.to_string()))
    }

    pub fn failing(strategy: Strategy, message: &str) -> Self {
        Self::new(strategy, Reply::Fail(message.to_string()))
    }

    pub fn with_reply(self, url: &str, reply: Reply) -> Self {
        self.replies.lock().unwrap().push((url.to_string(), reply));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PageFetcher for ScriptedFetcher {
    fn strategy(&self) -> Strategy {
        self.strategy
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .iter()
            .find(|(url, _)| *url == request.url)
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default.clone());

        match reply {
            Reply::Html(html) => Ok(FetchedPage {
                final_url: request.url.clone(),
                html,
            }),
            Reply::Fail(message) => Err(FetchError {
                kind: FailureKind::Network,
                message,
            }),
            Reply::Panic => panic!("scripted fetcher panic for {}", request.url),
            Reply::Slow(pause, html) => {
                tokio::time::sleep(pause).await;
                Ok(FetchedPage {
                    final_url: request.url.clone(),
                    html,
                })
            }
        }
    }
}
