//! External web search, consulted only as the fallback tier.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{AdapterError, SourceAdapter, absorb};
use crate::types::{Candidate, SourceKind};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
}

pub struct WebSearchAdapter {
    client: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
}

impl WebSearchAdapter {
    pub fn new(url: Option<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// `WEB_SEARCH_URL` and `WEB_SEARCH_API_KEY`. Unset values leave the
    /// adapter unconfigured, and it then returns nothing.
    pub fn from_env(timeout: Duration) -> Self {
        Self::new(
            std::env::var("WEB_SEARCH_URL").ok(),
            std::env::var("WEB_SEARCH_API_KEY").ok(),
            timeout,
        )
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }

    async fn try_search(&self, question_text: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        let (Some(url), Some(key)) = (&self.url, &self.api_key) else {
            return Err(AdapterError::NotConfigured);
        };
        let count = limit.max(1).to_string();
        let resp = self
            .client
            .get(url)
            .query(&[("q", question_text), ("count", count.as_str())])
            .header("X-Api-Key", key)
            .send()
            .await
            .map_err(|e| AdapterError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AdapterError::Unavailable(format!("http {}", resp.status())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| AdapterError::Unavailable(e.to_string()))?;
        let mut candidates = parse_results(&body)?;
        candidates.truncate(limit.max(1));
        Ok(candidates)
    }
}

/// Turn a search response body into candidates, keeping the engine's order.
fn parse_results(body: &str) -> Result<Vec<Candidate>, AdapterError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| AdapterError::Unavailable(format!("bad response: {e}")))?;
    Ok(parsed
        .results
        .into_iter()
        .filter(|hit| !hit.url.is_empty() || !hit.snippet.is_empty())
        .map(|hit| {
            Candidate::new(
                SourceKind::Web,
                hit.url.clone(),
                hit.title,
                hit.snippet,
                // No score comparable to local sources.
                0.0,
                json!({ "url": hit.url }),
            )
        })
        .collect())
}

#[async_trait]
impl SourceAdapter for WebSearchAdapter {
    fn name(&self) -> &str {
        "web"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    async fn search(&self, question_text: &str, limit: usize) -> Vec<Candidate> {
        if question_text.trim().is_empty() {
            return Vec::new();
        }
        absorb(self.name(), self.try_search(question_text, limit).await)
    }
}
