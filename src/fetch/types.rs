//! Request and result types for URL fan-out.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request rejected before any fetch started.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Body is not a JSON array of strings.
    #[error("malformed request body: {0}")]
    Malformed(#[from] serde_json::Error),

    /// More URLs than a single request may carry.
    #[error("request has {count} urls, limit is {limit}")]
    TooManyUrls { count: usize, limit: usize },
}

/// Ordered list of URLs to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchRequest {
    urls: Vec<String>,
}

impl FetchRequest {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    /// Decode a JSON array body and enforce the per-request limit.
    ///
    /// A `null` body is an empty request.
    pub fn from_json(body: &[u8], max_urls: usize) -> Result<Self, RequestError> {
        let urls: Option<Vec<String>> = serde_json::from_slice(body)?;
        let request = Self::new(urls.unwrap_or_default());
        request.check_limit(max_urls)?;
        Ok(request)
    }

    pub fn check_limit(&self, max_urls: usize) -> Result<(), RequestError> {
        if self.urls.len() > max_urls {
            return Err(RequestError::TooManyUrls {
                count: self.urls.len(),
                limit: max_urls,
            });
        }
        Ok(())
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

impl<S: Into<String>> FromIterator<S> for FetchRequest {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// URL → status line for every fetch that succeeded.
///
/// Failed and timed-out URLs have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchResults(HashMap<String, String>);

impl FetchResults {
    pub fn insert(&mut self, url: String, outcome: String) {
        self.0.insert(url, outcome);
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.0.get(url).map(String::as_str)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// JSON body returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(rename = "Url")]
    pub urls: FetchResults,
}

impl From<FetchResults> for FetchResponse {
    fn from(urls: FetchResults) -> Self {
        Self { urls }
    }
}
