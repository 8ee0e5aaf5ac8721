//! Coordinates page lookup, extraction, caching and the summarization call.
//!
//! The orchestrator is the only writer of the session cache and the only
//! caller of the [`Summarizer`]. Every failure is turned into an
//! [`AnalysisOutcome::Failure`] before it reaches the popup.

use crate::agent::{AgentError, Summarizer};
use crate::extractor::has_enough_text;
use crate::protocol::{AnalysisOutcome, Failure, PageRequest, Request, Response};
use crate::scraper::{PageChannel, ScraperError};
use crate::storage::{KeyStore, SessionCache, StorageError};
use crate::summary::SummaryResult;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Pages content cannot be extracted from
pub const RESTRICTED_PREFIXES: [&str; 5] = [
    "chrome://",
    "about:",
    "chrome-extension://",
    "moz-extension://",
    "safari-web-extension://",
];

/// How much of each end of the text goes into the debug log
const LOG_EXCERPT_CHARS: usize = 300;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("No active tab found.")]
    NoActiveTab,
    #[error("Cannot analyze browser internal pages. Navigate to a real article first.")]
    RestrictedPage,
    #[error("Could not access page content. Try refreshing the page.")]
    PageUnreachable(#[source] ScraperError),
    #[error("Not enough text found on this page. It may be a video, image, or login-gated article.")]
    NotEnoughText,
    #[error("API key required. Enter it above to get started.")]
    ApiKeyMissing,
    #[error(transparent)]
    Summarization(#[from] AgentError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<AnalyzeError> for Failure {
    fn from(error: AnalyzeError) -> Self {
        match error {
            AnalyzeError::ApiKeyMissing => Failure::ApiKeyMissing,
            other => Failure::Message(other.to_string()),
        }
    }
}

/// Whether the URL belongs to the browser or an extension
pub fn is_restricted(url: &str) -> bool {
    RESTRICTED_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

pub struct Orchestrator<P, S> {
    page: P,
    summarizer: S,
    keys: KeyStore,
    cache: SessionCache,
    fallback_key: Option<String>,
    /// One lock per URL so concurrent analyses share a single model call
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl<P: PageChannel, S: Summarizer> Orchestrator<P, S> {
    pub fn new(page: P, summarizer: S, keys: KeyStore, cache: SessionCache) -> Self {
        Self {
            page,
            summarizer,
            keys,
            cache,
            fallback_key: None,
            in_flight: DashMap::new(),
        }
    }

    /// Key to use when none has been stored, e.g. from `ANTHROPIC_API_KEY`
    pub fn with_fallback_key(mut self, key: Option<String>) -> Self {
        self.fallback_key = key;
        self
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Answer one popup request
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::AnalyzePage => Response::Analysis(self.analyze_page().await),
            Request::ReanalyzePage => Response::Analysis(self.reanalyze_page().await),
            Request::SetApiKey { payload } => {
                let result = self.keys.set_api_key(payload.trim());
                if let Err(e) = &result {
                    warn!(error = %e, "failed to store API key");
                }
                Response::Ack {
                    success: result.is_ok(),
                }
            }
            Request::GetApiKey => Response::ApiKey {
                api_key: self.stored_key(),
            },
        }
    }

    pub async fn analyze_page(&self) -> AnalysisOutcome {
        Self::outcome(self.analyze(false).await)
    }

    /// Drop the cached result for the active page and analyze it again
    pub async fn reanalyze_page(&self) -> AnalysisOutcome {
        Self::outcome(self.analyze(true).await)
    }

    fn outcome(result: Result<SummaryResult, AnalyzeError>) -> AnalysisOutcome {
        match result {
            Ok(data) => AnalysisOutcome::Success { data },
            Err(e) => {
                warn!(error = %e, "analysis failed");
                AnalysisOutcome::Failure { error: e.into() }
            }
        }
    }

    async fn analyze(&self, refresh: bool) -> Result<SummaryResult, AnalyzeError> {
        let url = self.page.active_url().ok_or(AnalyzeError::NoActiveTab)?;
        if is_restricted(&url) {
            return Err(AnalyzeError::RestrictedPage);
        }

        let lock = self.in_flight.entry(url.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.analyze_locked(&url, refresh).await
        };
        drop(lock);
        // only the map holds it now: nobody is waiting on this URL
        self.in_flight
            .remove_if(&url, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    async fn analyze_locked(
        &self,
        url: &str,
        refresh: bool,
    ) -> Result<SummaryResult, AnalyzeError> {
        if refresh && self.cache.remove(url)? {
            debug!(%url, "cache entry invalidated");
        }
        if let Some(cached) = self.cache.get(url)? {
            debug!(%url, cached_at = %cached.created_at, "session cache hit");
            return Ok(cached.summary);
        }

        let text = self.extract(url).await?;
        if !has_enough_text(&text) {
            return Err(AnalyzeError::NotEnoughText);
        }

        let api_key = self
            .stored_key()
            .or_else(|| self.fallback_key.clone())
            .ok_or(AnalyzeError::ApiKeyMissing)?;

        let chars = text.chars().count();
        info!(%url, chars, tokens = chars / 4, "sending article to the model");
        debug!(
            head = %excerpt_head(&text),
            tail = %excerpt_tail(&text),
            "article excerpt"
        );
        let started = Instant::now();
        let summary = self.summarizer.summarize(&api_key, &text).await?;
        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "model responded"
        );

        self.cache.store(url, &summary)?;
        Ok(summary)
    }

    /// Ask the page for its text, loading it once if it is not ready yet
    async fn extract(&self, url: &str) -> Result<String, AnalyzeError> {
        match self.page.request(url, PageRequest::ExtractText).await {
            Ok(response) => return Ok(response.text),
            Err(e) => debug!(error = %e, "page not ready, loading it"),
        }

        self.page
            .load(url)
            .await
            .map_err(AnalyzeError::PageUnreachable)?;
        self.page
            .request(url, PageRequest::ExtractText)
            .await
            .map(|response| response.text)
            .map_err(AnalyzeError::PageUnreachable)
    }

    fn stored_key(&self) -> Option<String> {
        match self.keys.api_key() {
            Ok(key) => key.filter(|k| !k.is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to read API key");
                None
            }
        }
    }
}

fn excerpt_head(text: &str) -> String {
    text.chars().take(LOG_EXCERPT_CHARS).collect()
}

fn excerpt_tail(text: &str) -> String {
    let skip = text.chars().count().saturating_sub(LOG_EXCERPT_CHARS);
    text.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PageResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const URL: &str = "https://news.example/story";

    struct FakePage {
        url: Option<String>,
        text: String,
        loaded: AtomicBool,
        loadable: bool,
        requests: AtomicUsize,
        loads: AtomicUsize,
    }

    impl FakePage {
        fn new(url: &str, text: &str) -> Self {
            Self {
                url: Some(url.to_string()),
                text: text.to_string(),
                loaded: AtomicBool::new(true),
                loadable: true,
                requests: AtomicUsize::new(0),
                loads: AtomicUsize::new(0),
            }
        }

        fn unloaded(mut self, loadable: bool) -> Self {
            self.loaded = AtomicBool::new(false);
            self.loadable = loadable;
            self
        }
    }

    #[async_trait]
    impl PageChannel for FakePage {
        fn active_url(&self) -> Option<String> {
            self.url.clone()
        }

        async fn request(&self, url: &str, _request: PageRequest) -> Result<PageResponse, ScraperError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.loaded.load(Ordering::SeqCst) {
                Ok(PageResponse {
                    text: self.text.clone(),
                })
            } else {
                Err(ScraperError::NotLoaded(url.to_string()))
            }
        }

        async fn load(&self, _url: &str) -> Result<(), ScraperError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.loadable {
                self.loaded.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(ScraperError::NoContent)
            }
        }
    }

    #[derive(Default)]
    struct FakeSummarizer {
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl Summarizer for FakeSummarizer {
        async fn summarize(&self, api_key: &str, _text: &str) -> Result<SummaryResult, AgentError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(AgentError::MissingField("noveltyScore"));
            }
            Ok(SummaryResult {
                ultra_short: format!("call {call} with {api_key}"),
                short: "short".into(),
                medium: "medium".into(),
                detailed: "detailed".into(),
                fluff_percentage: 20,
                novelty_score: 70,
            })
        }
    }

    fn article() -> String {
        "A sentence long enough to count as article text. ".repeat(5)
    }

    fn orchestrator(page: FakePage, summarizer: FakeSummarizer) -> Orchestrator<FakePage, FakeSummarizer> {
        let keys = KeyStore::temporary().unwrap();
        keys.set_api_key("sk-test").unwrap();
        Orchestrator::new(page, summarizer, keys, SessionCache::new().unwrap())
    }

    fn failure_message(outcome: AnalysisOutcome) -> String {
        match outcome {
            AnalysisOutcome::Failure { error } => error.message().to_string(),
            AnalysisOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn second_analyze_is_served_from_cache() {
        let orch = orchestrator(FakePage::new(URL, &article()), FakeSummarizer::default());

        let first = orch.analyze_page().await;
        let second = orch.analyze_page().await;

        assert!(first.is_success());
        assert_eq!(first, second);
        assert_eq!(orch.summarizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.page.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reanalyze_always_calls_the_model() {
        let orch = orchestrator(FakePage::new(URL, &article()), FakeSummarizer::default());

        orch.analyze_page().await;
        let fresh = orch.reanalyze_page().await;

        assert_eq!(orch.summarizer.calls.load(Ordering::SeqCst), 2);
        match fresh {
            AnalysisOutcome::Success { data } => assert_eq!(data.ultra_short, "call 2 with sk-test"),
            other => panic!("unexpected {other:?}"),
        }
        // the fresh result replaced the old cache entry
        assert!(orch.analyze_page().await.is_success());
        assert_eq!(orch.summarizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_analyses_share_one_call() {
        let summarizer = FakeSummarizer {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let orch = orchestrator(FakePage::new(URL, &article()), summarizer);

        let (a, b) = tokio::join!(orch.analyze_page(), orch.analyze_page());

        assert!(a.is_success());
        assert_eq!(a, b);
        assert_eq!(orch.summarizer.calls.load(Ordering::SeqCst), 1);
        assert!(orch.in_flight.is_empty());
    }

    #[tokio::test]
    async fn url_locks_are_released_after_each_analysis() {
        let orch = orchestrator(FakePage::new(URL, "Too short."), FakeSummarizer::default());

        assert!(!orch.analyze_page().await.is_success());
        assert!(orch.in_flight.is_empty());

        orch.reanalyze_page().await;
        assert!(orch.in_flight.is_empty());
    }

    #[tokio::test]
    async fn short_text_never_reaches_the_model() {
        let orch = orchestrator(FakePage::new(URL, "Too short."), FakeSummarizer::default());

        let message = failure_message(orch.analyze_page().await);

        assert!(message.starts_with("Not enough text found on this page."));
        assert_eq!(orch.summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_key_is_the_sentinel() {
        let orch = Orchestrator::new(
            FakePage::new(URL, &article()),
            FakeSummarizer::default(),
            KeyStore::temporary().unwrap(),
            SessionCache::new().unwrap(),
        );

        let outcome = orch.analyze_page().await;

        assert_eq!(
            outcome,
            AnalysisOutcome::Failure {
                error: Failure::ApiKeyMissing
            }
        );
        assert_eq!(orch.summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_key_is_used_when_none_is_stored() {
        let orch = Orchestrator::new(
            FakePage::new(URL, &article()),
            FakeSummarizer::default(),
            KeyStore::temporary().unwrap(),
            SessionCache::new().unwrap(),
        )
        .with_fallback_key(Some("sk-env".into()));

        match orch.analyze_page().await {
            AnalysisOutcome::Success { data } => assert_eq!(data.ultra_short, "call 1 with sk-env"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn restricted_pages_are_rejected_before_extraction() {
        for url in ["chrome://settings", "about:blank", "moz-extension://abc/popup.html"] {
            let orch = orchestrator(FakePage::new(url, &article()), FakeSummarizer::default());
            let message = failure_message(orch.analyze_page().await);
            assert!(message.starts_with("Cannot analyze browser internal pages"));
            assert_eq!(orch.page.requests.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn no_active_page() {
        let mut page = FakePage::new(URL, &article());
        page.url = None;
        let orch = orchestrator(page, FakeSummarizer::default());
        assert_eq!(failure_message(orch.analyze_page().await), "No active tab found.");
    }

    #[tokio::test]
    async fn unloaded_page_is_loaded_once_then_extracted() {
        let page = FakePage::new(URL, &article()).unloaded(true);
        let orch = orchestrator(page, FakeSummarizer::default());

        assert!(orch.analyze_page().await.is_success());
        assert_eq!(orch.page.loads.load(Ordering::SeqCst), 1);
        assert_eq!(orch.page.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_page_fails_without_retrying() {
        let page = FakePage::new(URL, &article()).unloaded(false);
        let orch = orchestrator(page, FakeSummarizer::default());

        let message = failure_message(orch.analyze_page().await);

        assert_eq!(message, "Could not access page content. Try refreshing the page.");
        assert_eq!(orch.page.loads.load(Ordering::SeqCst), 1);
        assert_eq!(orch.summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_errors_are_wrapped_and_not_cached() {
        let summarizer = FakeSummarizer {
            fail: true,
            ..Default::default()
        };
        let orch = orchestrator(FakePage::new(URL, &article()), summarizer);

        let message = failure_message(orch.analyze_page().await);
        assert_eq!(message, "Missing field \"noveltyScore\" in model response.");

        orch.analyze_page().await;
        assert_eq!(orch.summarizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn api_key_requests() {
        let orch = Orchestrator::new(
            FakePage::new(URL, &article()),
            FakeSummarizer::default(),
            KeyStore::temporary().unwrap(),
            SessionCache::new().unwrap(),
        );

        assert_eq!(
            orch.handle(Request::GetApiKey).await,
            Response::ApiKey { api_key: None }
        );
        assert_eq!(
            orch.handle(Request::SetApiKey {
                payload: "  sk-ant-123 ".into()
            })
            .await,
            Response::Ack { success: true }
        );
        assert_eq!(
            orch.handle(Request::GetApiKey).await,
            Response::ApiKey {
                api_key: Some("sk-ant-123".into())
            }
        );
        assert!(matches!(
            orch.handle(Request::AnalyzePage).await,
            Response::Analysis(AnalysisOutcome::Success { .. })
        ));
    }

    #[test]
    fn restricted_prefixes() {
        assert!(is_restricted("chrome-extension://id/page.html"));
        assert!(is_restricted("safari-web-extension://id/"));
        assert!(!is_restricted("https://example.com/about:blank"));
        assert!(!is_restricted("file:///tmp/page.html"));
    }

    #[test]
    fn excerpts_take_both_ends() {
        let text = format!("{}{}", "a".repeat(400), "b".repeat(400));
        assert_eq!(excerpt_head(&text), "a".repeat(300));
        assert_eq!(excerpt_tail(&text), "b".repeat(300));
        assert_eq!(excerpt_tail("short"), "short");
    }
}
