//! Multi-query rewriting: expands a user question into up to three
//! differently-angled search queries.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use websearch_qa_common::SearchQuery;

use crate::llm::LlmClient;

const MAX_EXPANSIONS: usize = 3;

pub struct QueryExpander {
    llm: Arc<dyn LlmClient>,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Asks the LLM for up to three differently-angled search queries.
    /// Falls back to the identity expansion (the original query, unchanged)
    /// whenever the LLM fails or returns something unparseable.
    #[instrument(skip(self, user_query), fields(query_len = user_query.len()))]
    pub async fn expand(&self, user_query: &str) -> SearchQuery {
        let prompt = format!(
            "Analyze the following user question and generate {MAX_EXPANSIONS} diverse \
             search queries suitable for web search.\n\
             Original question: {user_query}\n\n\
             Each query should use a different angle or set of keywords.\n\n\
             Respond in the format:\n\
             1. [first search query]\n\
             2. [second search query]\n\
             3. [third search query]"
        );

        match self.llm.complete(&prompt).await {
            Ok(response) => {
                let parsed = parse_numbered_queries(&response);
                if parsed.is_empty() {
                    warn!("query expansion returned no parseable lines, using identity expansion");
                    SearchQuery::new(user_query, vec![user_query.to_string()])
                } else {
                    info!(count = parsed.len(), "query expansion succeeded");
                    let processed_queries = parsed.into_iter().take(MAX_EXPANSIONS).collect();
                    SearchQuery::new(user_query, processed_queries)
                }
            }
            Err(err) => {
                warn!(%err, "query expansion failed, using identity expansion");
                SearchQuery::new(user_query, vec![user_query.to_string()])
            }
        }
    }
}

fn parse_numbered_queries(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            (1..=9)
                .find_map(|n| trimmed.strip_prefix(&format!("{n}.")))
                .map(|rest| rest.trim().to_string())
                .filter(|q| !q.is_empty())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticLlm(String);

    #[async_trait]
    impl LlmClient for StaticLlm {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            unimplemented!()
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("unreachable")
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn parses_well_formed_numbered_response() {
        let llm = StaticLlm("1. rust async runtimes\n2. tokio vs async-std\n3. rust concurrency".to_string());
        let expander = QueryExpander::new(std::sync::Arc::new(llm));
        let query = expander.expand("what is rust async").await;
        assert_eq!(query.original_query, "what is rust async");
        assert_eq!(query.processed_queries.len(), 3);
        assert_eq!(query.processed_queries[0], "rust async runtimes");
        assert_eq!(query.language, "ko");
    }

    #[tokio::test]
    async fn falls_back_to_identity_on_llm_failure() {
        let expander = QueryExpander::new(std::sync::Arc::new(FailingLlm));
        let query = expander.expand("what is rust").await;
        assert_eq!(query.processed_queries.len(), 1);
        assert_eq!(query.processed_queries[0], "what is rust");
    }

    #[tokio::test]
    async fn falls_back_to_identity_on_unparseable_response() {
        let llm = StaticLlm("I cannot help with that.".to_string());
        let expander = QueryExpander::new(std::sync::Arc::new(llm));
        let query = expander.expand("what is rust").await;
        assert_eq!(query.processed_queries.len(), 1);
        assert_eq!(query.processed_queries[0], "what is rust");
    }

    #[tokio::test]
    async fn caps_expansions_at_max() {
        let llm = StaticLlm(
            "1. a\n2. b\n3. c\n4. d\n5. e".to_string(),
        );
        let expander = QueryExpander::new(std::sync::Arc::new(llm));
        let query = expander.expand("q").await;
        assert_eq!(query.processed_queries.len(), 3);
    }
}
