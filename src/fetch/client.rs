//! Outbound fetch capability.
//!
//! # Responsibilities
//! - Define the seam the dispatcher fetches through
//! - Perform `GET url` with reqwest and report the status line
//!
//! # Design Decisions
//! - Response bodies are never read
//! - Deadlines belong to the dispatcher; the client timeout is a backstop

use std::future::Future;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use thiserror::Error;

/// Why a single URL produced no result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FetchError {
    /// Metric label for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Timeout(_) => "timeout",
            FetchError::Transport(_) => "error",
        }
    }
}

/// Performs one fetch and reports its outcome string.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// [`Fetcher`] backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::from_client(client, timeout))
    }

    /// Wrap a prebuilt client whose request timeout is `timeout`.
    pub fn from_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send {
        let request = Url::parse(url)
            .map(|parsed| self.client.get(parsed))
            .map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")));

        let timeout = self.timeout;
        async move {
            let response = request?.send().await.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(timeout)
                } else {
                    FetchError::Transport(e)
                }
            })?;
            Ok(status_line(response.status()))
        }
    }
}

/// `"200 OK"` style status line, or the bare code for unregistered statuses.
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_str().to_string(),
    }
}
