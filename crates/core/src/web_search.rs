//! Web search provider: turns a query into candidate documents to crawl.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use websearch_qa_common::WebDocument;

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<WebDocument>>;
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default = "default_title")]
    title: String,
    #[serde(default)]
    content: Option<String>,
}

fn default_title() -> String {
    "No Title".to_string()
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

/// Client for the Tavily search API.
#[derive(Debug, Clone)]
pub struct TavilySearchClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl TavilySearchClient {
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: "https://api.tavily.com/search".to_string(),
        })
    }

    /// Points this client at a different endpoint than the public Tavily
    /// API, e.g. a self-hosted mirror or a test double.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearchProvider for TavilySearchClient {
    #[instrument(skip(self), fields(query_len = query.len(), max_results))]
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<WebDocument>> {
        let payload = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": "basic",
            "include_answer": false,
            "include_images": false,
            "include_raw_content": false,
            "max_results": max_results,
        });

        debug!("sending Tavily search request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json::<TavilyResponse>()
            .await?;

        let documents: Vec<WebDocument> = response
            .results
            .into_iter()
            .take(max_results)
            .map(|r| {
                let doc = WebDocument::new(r.url, r.title, query);
                match r.content {
                    Some(content) => doc.with_snippet(content),
                    None => doc,
                }
            })
            .collect();

        info!(count = documents.len(), "Tavily search completed");
        Ok(documents)
    }
}

/// Placeholder for a Google Programmable Search adapter. Never wired up
/// by the default container: `SearchProvider::Google` is a recognised
/// configuration value but this adapter has no working implementation,
/// matching what the system being ported from actually shipped.
#[derive(Debug, Clone)]
pub struct GoogleSearchClient {
    #[allow(dead_code)]
    api_key: String,
    #[allow(dead_code)]
    cx: String,
}

impl GoogleSearchClient {
    pub fn new(api_key: impl Into<String>, cx: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            cx: cx.into(),
        }
    }
}

#[async_trait]
impl WebSearchProvider for GoogleSearchClient {
    async fn search(&self, _query: &str, _max_results: usize) -> anyhow::Result<Vec<WebDocument>> {
        warn!("Google search provider has no implementation, returning empty result set");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn tavily_search_parses_results_and_respects_max_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"url": "https://a.example", "title": "A", "content": "a summary"},
                    {"url": "https://b.example", "title": "B"},
                    {"url": "https://c.example", "title": "C"},
                ]
            })))
            .mount(&server)
            .await;

        let client = TavilySearchClient::new("test-key")
            .unwrap()
            .with_endpoint(format!("{}/search", server.uri()));

        let docs = client.search("rust async", 2).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].url, "https://a.example");
        assert_eq!(docs[0].snippet.as_deref(), Some("a summary"));
        assert!(docs[1].snippet.is_none());
    }

    #[tokio::test]
    async fn google_client_returns_empty_without_erroring() {
        let client = GoogleSearchClient::new("key", "cx");
        let docs = client.search("anything", 5).await.unwrap();
        assert!(docs.is_empty());
    }
}
