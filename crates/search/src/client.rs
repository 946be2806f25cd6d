use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use answerbot_core::config::SearchConfig;
use answerbot_core::secrets::{CachedSecret, SearchCredentials, SecretError};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{SummarizerSearchApiResponse, WebSearchApiResponse};

const SUBSCRIPTION_TOKEN_HEADER: &str = "X-Subscription-Token";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchStep {
    WebSearch,
    Summarizer,
}

impl fmt::Display for SearchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WebSearch => "web search",
            Self::Summarizer => "summarizer",
        })
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Credentials(#[from] SecretError),
    #[error("Brave {step} request failed: {source}")]
    Transport {
        step: SearchStep,
        #[source]
        source: reqwest::Error,
    },
    #[error("Brave {step} returned HTTP {status}: {body}")]
    Status { step: SearchStep, status: u16, body: String },
    #[error("Brave {step} response could not be decoded: {reason}")]
    Decode { step: SearchStep, reason: String },
    #[error("Brave Search results empty or no summarizer")]
    NoSummaryAvailable,
    #[error("Brave summarizer returned no answer")]
    EmptySummary,
}

impl SearchError {
    /// Credential failures abort the invocation; everything else is reported
    /// back to the user in chat.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Credentials(_))
    }
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn web_search(&self, query: &str) -> Result<WebSearchApiResponse, SearchError>;

    async fn summary(&self, key: &str) -> Result<SummarizerSearchApiResponse, SearchError>;

    /// Searches, then exchanges the summarizer key for the summary.
    async fn summarize(&self, query: &str) -> Result<SummarizerSearchApiResponse, SearchError> {
        let search = self.web_search(query).await?;
        let Some(key) = search.summarizer_key() else {
            return Err(SearchError::NoSummaryAvailable);
        };
        let summary = self.summary(key).await?;
        if summary.summary.is_empty() {
            return Err(SearchError::EmptySummary);
        }
        Ok(summary)
    }
}

/// Trims the query and collapses internal whitespace runs to single spaces.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct BraveClient {
    http: Client,
    base_url: String,
    credentials: Arc<CachedSecret<SearchCredentials>>,
}

impl BraveClient {
    pub fn from_config(
        config: &SearchConfig,
        credentials: Arc<CachedSecret<SearchCredentials>>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self::with_client(http, config.base_url.clone(), credentials))
    }

    pub fn with_client(
        http: Client,
        base_url: impl Into<String>,
        credentials: Arc<CachedSecret<SearchCredentials>>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, credentials }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        step: SearchStep,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SearchError> {
        let credentials = self.credentials.get().await?;
        let response = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .query(query)
            .header(ACCEPT, "application/json")
            .header(SUBSCRIPTION_TOKEN_HEADER, credentials.api_key())
            .send()
            .await
            .map_err(|source| SearchError::Transport { step, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(event_name = "search.http.error", step = %step, status = status.as_u16());
            return Err(SearchError::Status { step, status: status.as_u16(), body });
        }

        let bytes =
            response.bytes().await.map_err(|source| SearchError::Transport { step, source })?;
        serde_json::from_slice(&bytes)
            .map_err(|error| SearchError::Decode { step, reason: error.to_string() })
    }
}

#[async_trait]
impl SearchApi for BraveClient {
    async fn web_search(&self, query: &str) -> Result<WebSearchApiResponse, SearchError> {
        let query = normalize_query(query);
        debug!(event_name = "search.web.request", query_chars = query.len());
        self.get(SearchStep::WebSearch, "web/search", &[("q", query.as_str()), ("summary", "1")])
            .await
    }

    async fn summary(&self, key: &str) -> Result<SummarizerSearchApiResponse, SearchError> {
        debug!(event_name = "search.summary.request");
        self.get(SearchStep::Summarizer, "summarizer/search", &[("key", key)]).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{normalize_query, SearchApi, SearchError};
    use crate::types::{
        Summarizer, SummarizerSearchApiResponse, SummaryMessage, WebSearchApiResponse,
    };

    struct ScriptedSearch {
        search: WebSearchApiResponse,
        summary: SummarizerSearchApiResponse,
        summary_keys: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        fn new(key: Option<&str>, fragments: &[&str]) -> Self {
            Self {
                search: WebSearchApiResponse {
                    kind: "search".to_owned(),
                    summarizer: key.map(|key| Summarizer {
                        kind: "summarizer".to_owned(),
                        key: Some(key.to_owned()),
                    }),
                },
                summary: SummarizerSearchApiResponse {
                    title: "title".to_owned(),
                    summary: fragments.iter().map(|text| SummaryMessage::token(*text)).collect(),
                    ..SummarizerSearchApiResponse::default()
                },
                summary_keys: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchApi for ScriptedSearch {
        async fn web_search(&self, _query: &str) -> Result<WebSearchApiResponse, SearchError> {
            Ok(self.search.clone())
        }

        async fn summary(&self, key: &str) -> Result<SummarizerSearchApiResponse, SearchError> {
            self.summary_keys.lock().await.push(key.to_owned());
            Ok(self.summary.clone())
        }
    }

    #[tokio::test]
    async fn summarize_exchanges_summarizer_key() {
        let search = ScriptedSearch::new(Some("opaque-key"), &["K2 is tall."]);

        let summary = search.summarize("k2").await.expect("summary");

        assert_eq!(summary.summary.len(), 1);
        assert_eq!(*search.summary_keys.lock().await, vec!["opaque-key".to_owned()]);
    }

    #[tokio::test]
    async fn missing_summarizer_is_no_summary_available() {
        let search = ScriptedSearch::new(None, &["unused"]);

        let error = search.summarize("k2").await.expect_err("no summarizer");

        assert!(matches!(error, SearchError::NoSummaryAvailable));
        assert!(!error.is_fatal());
        assert!(search.summary_keys.lock().await.is_empty());
    }

    #[tokio::test]
    async fn empty_summary_is_reported_as_no_answer() {
        let search = ScriptedSearch::new(Some("key"), &[]);

        let error = search.summarize("k2").await.expect_err("empty summary");
        assert!(matches!(error, SearchError::EmptySummary));
    }

    #[test]
    fn normalize_query_trims_and_collapses_whitespace() {
        assert_eq!(normalize_query("  what   is\n\tK2 "), "what is K2");
        assert_eq!(normalize_query("   "), "");
    }
}
