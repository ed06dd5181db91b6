//! Fan-out/fan-in over the URLs of one request.
//!
//! # Responsibilities
//! - Reject over-limit requests before spawning anything
//! - Spawn one task per URL, each under its own deadline
//! - Join every task, then decide between the result map and cancellation
//!
//! # Design Decisions
//! - Tasks hand their outcome back through the join; the joining loop is the
//!   only writer of the result map
//! - Tasks never look at the cancellation token, so cancellation cannot
//!   truncate an individual fetch
//! - Per-URL failures are logged and dropped, never returned

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::FetchConfig;
use crate::fetch::client::{FetchError, Fetcher};
use crate::fetch::types::{FetchRequest, FetchResults, RequestError};
use crate::observability::metrics;

/// Whole-request failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Rejected before any fetch started.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The request was cancelled before its fetches finished.
    #[error("request cancelled before all fetches completed")]
    Cancelled,
}

/// Runs requests against a shared [`Fetcher`].
pub struct Dispatcher<F> {
    fetcher: Arc<F>,
    timeout: Duration,
    max_urls: usize,
}

impl<F: Fetcher> Dispatcher<F> {
    pub fn new(fetcher: F, config: &FetchConfig) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            timeout: config.timeout(),
            max_urls: config.max_urls,
        }
    }

    /// Decode a request body under this dispatcher's URL limit.
    pub fn parse(&self, body: &[u8]) -> Result<FetchRequest, RequestError> {
        FetchRequest::from_json(body, self.max_urls)
    }

    /// Fetch every URL of `request` concurrently.
    ///
    /// Waits for all fetches to finish (each bounded by the per-URL timeout),
    /// then returns [`DispatchError::Cancelled`] if `cancel` fired meanwhile,
    /// otherwise the URLs that succeeded.
    pub async fn dispatch(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResults, DispatchError> {
        request.check_limit(self.max_urls)?;

        let mut tasks = JoinSet::new();
        for url in request.into_urls() {
            let fetcher = Arc::clone(&self.fetcher);
            let deadline = self.timeout;
            tasks.spawn(async move {
                let start = Instant::now();
                let outcome = match tokio::time::timeout(deadline, fetcher.fetch(&url)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FetchError::Timeout(deadline)),
                };
                let label = match &outcome {
                    Ok(_) => "success",
                    Err(e) => e.kind(),
                };
                metrics::record_fetch(label, start);
                (url, outcome)
            });
        }

        let mut results = FetchResults::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, Ok(status))) => results.insert(url, status),
                Ok((url, Err(e))) => tracing::debug!(url = %url, error = %e, "Fetch failed"),
                Err(e) => tracing::warn!(error = %e, "Fetch task aborted"),
            }
        }

        if cancel.is_cancelled() {
            tracing::warn!(completed = results.len(), "Request cancelled, discarding results");
            return Err(DispatchError::Cancelled);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Script {
        Status(&'static str),
        After(Duration, &'static str),
        Hang,
        Fail,
        Panic,
    }

    #[derive(Default)]
    struct ScriptedFetcher {
        scripts: HashMap<String, Script>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedFetcher {
        fn with(mut self, url: &str, script: Script) -> Self {
            self.scripts.insert(url.to_string(), script);
            self
        }
    }

    impl Fetcher for ScriptedFetcher {
        fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.get(url).cloned().unwrap_or(Script::Fail);
            let url = url.to_string();
            async move {
                match script {
                    Script::Status(status) => Ok(status.to_string()),
                    Script::After(delay, status) => {
                        tokio::time::sleep(delay).await;
                        Ok(status.to_string())
                    }
                    Script::Hang => std::future::pending().await,
                    Script::Fail => Err(FetchError::InvalidUrl(url)),
                    Script::Panic => panic!("fetcher blew up"),
                }
            }
        }
    }

    fn dispatcher(fetcher: ScriptedFetcher) -> Dispatcher<ScriptedFetcher> {
        Dispatcher::new(fetcher, &FetchConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn all_successful_fetches_are_reported() {
        let urls: Vec<String> = (0..20).map(|i| format!("http://{i}.example")).collect();
        let fetcher = urls
            .iter()
            .fold(ScriptedFetcher::default(), |f, url| f.with(url, Script::Status("200 OK")));

        let results = dispatcher(fetcher)
            .dispatch(FetchRequest::new(urls.clone()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 20);
        assert!(urls.iter().all(|url| results.get(url) == Some("200 OK")));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_url_is_omitted() {
        let fetcher = ScriptedFetcher::default()
            .with("http://a.example", Script::Status("200 OK"))
            .with("http://b.example", Script::Hang);
        let request: FetchRequest = ["http://a.example", "http://b.example"].into_iter().collect();

        let start = tokio::time::Instant::now();
        let results = dispatcher(fetcher)
            .dispatch(request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results.get("http://a.example"), Some("200 OK"));
        assert!(!results.contains("http://b.example"));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_and_panicking_fetches_are_silent() {
        let fetcher = ScriptedFetcher::default()
            .with("http://ok.example", Script::Status("204 No Content"))
            .with("http://boom.example", Script::Panic);
        let request: FetchRequest = ["http://ok.example", "not a url", "http://boom.example"]
            .into_iter()
            .collect();

        let results = dispatcher(fetcher)
            .dispatch(request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results.get("http://ok.example"), Some("204 No Content"));
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_run_concurrently() {
        let urls: Vec<String> = (0..20).map(|i| format!("http://{i}.example")).collect();
        let fetcher = urls.iter().fold(ScriptedFetcher::default(), |f, url| {
            f.with(url, Script::After(Duration::from_millis(600), "200 OK"))
        });

        let start = tokio::time::Instant::now();
        let results = dispatcher(fetcher)
            .dispatch(FetchRequest::new(urls), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 20);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn over_limit_request_spawns_nothing() {
        let fetcher = ScriptedFetcher::default();
        let calls = Arc::clone(&fetcher.calls);
        let request: FetchRequest = (0..21).map(|i| format!("http://{i}.example")).collect();

        let err = dispatcher(fetcher)
            .dispatch(request, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Request(RequestError::TooManyUrls { count: 21, limit: 20 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_discards_partial_results() {
        let fetcher = ScriptedFetcher::default()
            .with("http://fast.example", Script::Status("200 OK"))
            .with("http://slow.example", Script::After(Duration::from_millis(500), "200 OK"));
        let request: FetchRequest = ["http://fast.example", "http://slow.example"].into_iter().collect();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = dispatcher(fetcher).dispatch(request, &cancel).await.unwrap_err();

        assert!(matches!(err, DispatchError::Cancelled));
        // The slow fetch still ran to completion before the verdict.
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn empty_request_yields_empty_map() {
        let results = dispatcher(ScriptedFetcher::default())
            .dispatch(FetchRequest::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
