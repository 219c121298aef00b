use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user question plus its LLM-generated expansions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub original_query: String,
    /// Ordered 1-3 rewritten queries; first is the primary.
    pub processed_queries: Vec<String>,
    /// ISO language tag.
    pub language: String,
    pub timestamp: DateTime<Utc>,
}

fn default_language() -> String {
    "ko".to_string()
}

impl SearchQuery {
    pub fn new(original_query: impl Into<String>, processed_queries: Vec<String>) -> Self {
        Self {
            original_query: original_query.into(),
            processed_queries,
            language: default_language(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            original_query: String::new(),
            processed_queries: Vec::new(),
            language: default_language(),
            timestamp: Utc::now(),
        }
    }
}

/// Raw markdown content fetched for a single URL, before chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDocumentContent {
    pub url: String,
    pub markdown: String,
    pub crawl_datetime: DateTime<Utc>,
    /// Free-form page metadata captured alongside the body (e.g. provider
    /// fields that don't warrant their own column).
    pub metadata: HashMap<String, serde_json::Value>,
    /// Stable identifier derived from the URL and crawl time; links chunks
    /// back to the document revision they were cut from, so two crawls of
    /// the same URL at different times don't collide.
    pub document_id: String,
}

impl WebDocumentContent {
    pub fn compute_document_id(url: &str, crawl_datetime: DateTime<Utc>) -> String {
        let digest = md5::compute(format!("{url}_{}", crawl_datetime.timestamp_millis()));
        format!("{digest:x}")
    }
}

/// A page returned by a `WebSearchProvider` and subsequently crawled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDocument {
    pub url: String,
    pub title: String,
    /// The search provider's own excerpt, if it returned one (Tavily's
    /// `content` field). Distinct from the crawled page body: this is
    /// provider metadata, never indexed or chunked.
    pub snippet: Option<String>,
    /// The expansion that produced this result, so downstream chunks can
    /// record which query led to them.
    pub search_query: String,
    /// Populated by the crawler stage; `None` until the page has been
    /// fetched.
    pub content: Option<WebDocumentContent>,
}

impl WebDocument {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        search_query: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: None,
            search_query: search_query.into(),
            content: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// Per-chunk provenance and lifecycle metadata.
///
/// Replaces a duck-typed metadata bag with a concrete struct so that
/// every chunking strategy and every storage backend agrees on shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Offset of this chunk's first character within the source document.
    pub position: usize,
    /// The query that produced the search result this chunk descends from.
    pub query: String,
    /// `WebDocumentContent::document_id` of the document this chunk was cut
    /// from — tied to a crawl, not just a URL, so re-crawling the same page
    /// later doesn't collide with chunks from the earlier crawl.
    pub parent_document_id: String,
    pub updated_at: DateTime<Utc>,
    /// The untouched passage text, present only when `content` has been
    /// prefixed with LLM-generated situating context.
    pub original_content: Option<String>,
    /// `Some(true)`/`Some(false)` once the contextual chunker has run;
    /// `None` for chunks produced by the simple chunker.
    pub contextual_retrieval: Option<bool>,
}

impl ChunkMetadata {
    pub fn new(position: usize, query: impl Into<String>, parent_document_id: impl Into<String>) -> Self {
        Self {
            position,
            query: query.into(),
            parent_document_id: parent_document_id.into(),
            updated_at: Utc::now(),
            original_content: None,
            contextual_retrieval: None,
        }
    }
}

/// A passage of text plus its provenance, optionally embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticChunk {
    pub chunk_id: String,
    pub url: String,
    /// Indexed content: for simple chunks this is the raw passage; for
    /// contextual chunks this is `context + "\n\n" + raw`.
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Option<Vec<f32>>,
}

impl SemanticChunk {
    /// `chunk_id = MD5(url + "_" + offset + "_" + first-50-chars-of-raw-passage)`.
    ///
    /// Computed over the raw passage, never over contextualized content, so
    /// the same underlying text always yields the same id regardless of
    /// which chunking strategy produced it.
    pub fn compute_chunk_id(url: &str, offset: usize, raw_passage: &str) -> String {
        let prefix: String = raw_passage.chars().take(50).collect();
        let digest = md5::compute(format!("{url}_{offset}_{prefix}"));
        format!("{digest:x}")
    }
}

/// Accumulates cross-stage pipeline state for a single query: the
/// expanded queries, the documents found, and the chunks retrieved for
/// answering. Named after the pipeline's scratchpad of working state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScratchPad {
    pub original_query: String,
    pub expanded_queries: SearchQuery,
    pub documents: Vec<WebDocument>,
    pub retrieved_chunks: Vec<SemanticChunk>,
    /// Parallel to `retrieved_chunks`: the reranker's relevance score for
    /// the chunk at the same index.
    pub scores: Vec<f32>,
}

impl ScratchPad {
    pub fn new(original_query: impl Into<String>) -> Self {
        Self {
            original_query: original_query.into(),
            ..Default::default()
        }
    }
}

/// The answer returned to the caller on a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QAResponse {
    pub query: String,
    pub answer: String,
    /// Source URLs in retrieval order, not deduplicated.
    pub sources: Vec<String>,
    /// Mean reranker score over the chunks that grounded the answer,
    /// clamped to `[0, 1]`. Not calibrated across queries or reranker
    /// implementations; treat as a rough confidence signal only.
    pub confidence: f32,
}

/// The outer envelope `process_query` always returns. `success` is always
/// present and boolean; `process_query` itself never raises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QAOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<QAResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time: f64,
}

impl QAOutcome {
    pub fn success(response: QAResponse, processing_time: f64) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
            processing_time,
        }
    }

    pub fn failure(error: impl Into<String>, processing_time: f64) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
            processing_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_stable_for_identical_inputs() {
        let a = SemanticChunk::compute_chunk_id("https://example.com", 0, "hello world");
        let b = SemanticChunk::compute_chunk_id("https://example.com", 0, "hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_id_differs_on_offset() {
        let a = SemanticChunk::compute_chunk_id("https://example.com", 0, "hello world");
        let b = SemanticChunk::compute_chunk_id("https://example.com", 800, "hello world");
        assert_ne!(a, b);
    }

    #[test]
    fn chunk_id_only_uses_first_fifty_chars_of_passage() {
        let long_text = "x".repeat(200);
        let a = SemanticChunk::compute_chunk_id("https://example.com", 0, &long_text);
        let mut truncated = "x".repeat(50);
        truncated.push_str("some different tail that should not matter");
        let b = SemanticChunk::compute_chunk_id("https://example.com", 0, &truncated);
        assert_eq!(a, b);
    }

    #[test]
    fn qa_outcome_failure_has_no_response() {
        let outcome = QAOutcome::failure(crate::error::PipelineError::Timeout.to_string(), 10.0);
        assert!(!outcome.success);
        assert!(outcome.response.is_none());
        assert!(outcome.error.as_deref().unwrap().contains("timeout"));
    }

    #[test]
    fn scratchpad_starts_empty_besides_query() {
        let pad = ScratchPad::new("what is rust");
        assert_eq!(pad.original_query, "what is rust");
        assert!(pad.documents.is_empty());
        assert!(pad.retrieved_chunks.is_empty());
    }
}
