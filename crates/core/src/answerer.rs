//! Assembles a context prompt from the scratchpad's top-K chunks and asks
//! the LLM for a grounded answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};
use websearch_qa_common::SemanticChunk;

use crate::llm::LlmClient;

#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, query: &str, chunks: &[SemanticChunk]) -> String;
}

fn build_context(chunks: &[SemanticChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("[Source: {}]\n{}", chunk.url, chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Degrades to a fixed notice rather than propagating an error: the
/// answerer is the terminal stage and a failure here must still let
/// `process_query` return `success: true`.
const DEGRADED_ANSWER: &str = "Unable to generate an answer from the retrieved context.";

pub struct LlmAnswerer {
    llm: Arc<dyn LlmClient>,
}

impl LlmAnswerer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Answerer for LlmAnswerer {
    #[instrument(skip(self, chunks), fields(query_len = query.len(), chunks = chunks.len()))]
    async fn answer(&self, query: &str, chunks: &[SemanticChunk]) -> String {
        let context = build_context(chunks);
        let prompt = format!(
            "Answer the question using only the context below. If the context \
             does not contain the answer, say so.\n\n\
             Question: {query}\n\nContext:\n{context}\n\nAnswer:"
        );

        match self.llm.complete(&prompt).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(%err, "answer generation failed");
                DEGRADED_ANSWER.to_string()
            }
        }
    }
}
