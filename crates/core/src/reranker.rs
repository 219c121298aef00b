//! Truncates a candidate set down to the top-k most relevant chunks.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::instrument;
use websearch_qa_common::SemanticChunk;

/// The reranked, score-carrying result of [`Reranker::rerank`]: parallel
/// `chunks`/`scores` vectors, descending by relevance, truncated to `k`.
#[derive(Debug, Clone, Default)]
pub struct RankedChunks {
    pub chunks: Vec<SemanticChunk>,
    pub scores: Vec<f32>,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns at most `k` chunks with their relevance scores, descending.
    /// Scores need not be calibrated across queries or implementations.
    async fn rerank(&self, query: &str, chunks: Vec<SemanticChunk>, k: usize) -> RankedChunks;
}

/// Token-overlap scorer: `|query_tokens ∩ content_tokens| / |query_tokens|`.
/// A stand-in for a cross-encoder, bounded to `[0, 1]` and strictly
/// stronger than no reranking at all since it still orders by relevance
/// to the query rather than retrieval rank.
pub struct JaccardReranker;

impl JaccardReranker {
    fn score(query: &str, content: &str) -> f32 {
        let query_tokens: HashSet<&str> = query.split_whitespace().collect();
        if query_tokens.is_empty() {
            return 0.0;
        }
        let content_tokens: HashSet<&str> = content.split_whitespace().collect();
        let overlap = query_tokens.intersection(&content_tokens).count();
        overlap as f32 / query_tokens.len() as f32
    }
}

#[async_trait]
impl Reranker for JaccardReranker {
    #[instrument(skip(self, chunks), fields(candidates = chunks.len(), k))]
    async fn rerank(&self, query: &str, chunks: Vec<SemanticChunk>, k: usize) -> RankedChunks {
        let lowered_query = query.to_lowercase();
        let mut scored: Vec<(f32, SemanticChunk)> = chunks
            .into_iter()
            .map(|chunk| {
                let score = Self::score(&lowered_query, &chunk.content.to_lowercase());
                (score, chunk)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut chunks = Vec::with_capacity(scored.len());
        let mut scores = Vec::with_capacity(scored.len());
        for (score, chunk) in scored {
            chunks.push(chunk);
            scores.push(score);
        }
        RankedChunks { chunks, scores }
    }
}
