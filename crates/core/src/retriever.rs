//! Hybrid retrieval: fuses dense (vector) and sparse (BM25) rankings over
//! the same in-memory index via Reciprocal Rank Fusion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{instrument, warn};
use websearch_qa_common::SemanticChunk;
use websearch_qa_storage::VectorIndex;

use crate::llm::LlmClient;

const RRF_CONSTANT: f32 = 60.0;
const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;
const MIN_TOKEN_LEN: usize = 2;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns the top-`k` chunks in the index by fused dense+sparse rank.
    async fn retrieve(&self, query: &str, index: &VectorIndex, k: usize) -> Vec<SemanticChunk>;
}

/// Dense nearest-neighbour search plus BM25 lexical search, combined by
/// Reciprocal Rank Fusion (`C = 60`).
pub struct HybridRetriever {
    llm: Arc<dyn LlmClient>,
    embedding_dimension: usize,
}

impl HybridRetriever {
    pub fn new(llm: Arc<dyn LlmClient>, embedding_dimension: usize) -> Self {
        Self {
            llm,
            embedding_dimension,
        }
    }

    async fn embed_query(&self, query: &str) -> Vec<f32> {
        match self.llm.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => {
                warn!("embedding call returned no vectors, substituting zero-vector");
                vec![0.0; self.embedding_dimension]
            }
            Err(err) => {
                warn!(%err, "query embedding failed, substituting zero-vector");
                vec![0.0; self.embedding_dimension]
            }
        }
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    #[instrument(skip(self, index), fields(query_len = query.len(), corpus = index.len(), k))]
    async fn retrieve(&self, query: &str, index: &VectorIndex, k: usize) -> Vec<SemanticChunk> {
        if index.is_empty() {
            return Vec::new();
        }

        let query_vector = self.embed_query(query).await;
        let dense_ranked: Vec<String> = index
            .search(&query_vector, k)
            .into_iter()
            .map(|hit| hit.chunk.chunk_id)
            .collect();

        let query_tokens = tokenize(query);
        let sparse_ranked: Vec<String> = bm25_rank(&query_tokens, index.chunks())
            .into_iter()
            .map(|(chunk_id, _)| chunk_id)
            .collect();

        let fused = reciprocal_rank_fusion(&[&dense_ranked, &sparse_ranked]);

        // Unify on chunk_id against a single authoritative source (the index)
        // rather than whichever ranked list happened to carry the chunk last.
        let mut by_id: HashMap<&str, &SemanticChunk> = HashMap::new();
        for chunk in index.chunks() {
            by_id.entry(chunk.chunk_id.as_str()).or_insert(chunk);
        }

        let mut scored: Vec<(f32, SemanticChunk)> = fused
            .into_iter()
            .filter_map(|(id, score)| by_id.get(id.as_str()).map(|chunk| (score, (*chunk).clone())))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored.into_iter().map(|(_, chunk)| chunk).collect()
    }
}

/// Extracts runs of `[A-Za-z0-9가-힣]+`, lower-cases, drops tokens shorter
/// than [`MIN_TOKEN_LEN`].
pub fn tokenize(text: &str) -> Vec<String> {
    let pattern = Regex::new(r"[A-Za-z0-9가-힣]+").expect("static token pattern is always valid");
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|tok| tok.chars().count() >= MIN_TOKEN_LEN)
        .collect()
}

/// Okapi BM25 over `chunks`, scoring only the supplied `query_tokens`.
/// Documents scoring `<= 0` are discarded; the IDF term is allowed to go
/// negative (common terms can suppress a document's score) and is never
/// clamped.
fn bm25_rank(query_tokens: &[String], chunks: &[SemanticChunk]) -> Vec<(String, f32)> {
    let n = chunks.len() as f32;
    if chunks.is_empty() || query_tokens.is_empty() {
        return Vec::new();
    }

    let doc_tokens: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.content)).collect();
    let doc_lens: Vec<f32> = doc_tokens.iter().map(|toks| toks.len() as f32).collect();
    let avg_len = doc_lens.iter().sum::<f32>() / n;

    let unique_terms: HashSet<&String> = query_tokens.iter().collect();
    let idf: HashMap<&str, f32> = unique_terms
        .iter()
        .map(|term| {
            let df = doc_tokens
                .iter()
                .filter(|toks| toks.iter().any(|t| t == *term))
                .count() as f32;
            (term.as_str(), ((n - df + 0.5) / (df + 0.5)).ln())
        })
        .collect();

    let mut scored = Vec::with_capacity(chunks.len());
    for (chunk, (toks, &len)) in chunks.iter().zip(doc_tokens.iter().zip(doc_lens.iter())) {
        let mut score = 0.0f32;
        for term in &unique_terms {
            let tf = toks.iter().filter(|t| *t == *term).count() as f32;
            if tf == 0.0 {
                continue;
            }
            let numerator = tf * (BM25_K1 + 1.0);
            let denominator = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * len / avg_len);
            score += idf[term.as_str()] * numerator / denominator;
        }
        if score > 0.0 {
            scored.push((chunk.chunk_id.clone(), score));
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// `score(d) = sum over lists containing d of 1 / (C + rank + 1)`, ranks
/// 0-indexed. Returns `(chunk_id, score)` sorted descending.
fn reciprocal_rank_fusion(ranked_lists: &[&[String]]) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for list in ranked_lists {
        for (rank, chunk_id) in list.iter().enumerate() {
            *scores.entry(chunk_id.clone()).or_insert(0.0) += 1.0 / (RRF_CONSTANT + rank as f32 + 1.0);
        }
    }
    let mut results: Vec<(String, f32)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}
