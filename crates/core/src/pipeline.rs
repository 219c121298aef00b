//! Orchestrates the seven pipeline stages end to end: query expansion, web
//! search, crawling, chunking, embedding, hybrid retrieval, and answering.
//! Wraps the whole run in a deadline so a slow external collaborator can
//! never hang `process_query` past `max_processing_time`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use websearch_qa_common::{
    ChunkingStrategy, PipelineError, QAOutcome, QAResponse, ScratchPad, SemanticChunk, SystemConfig,
};
use websearch_qa_storage::{SessionStore, VectorIndex};

use crate::answerer::{Answerer, LlmAnswerer};
use crate::chunker::{Chunker, ContextualChunker, SimpleChunker};
use crate::crawler::PageCrawler;
use crate::llm::LlmClient;
use crate::query_expander::QueryExpander;
use crate::reranker::{JaccardReranker, RankedChunks, Reranker};
use crate::retriever::{HybridRetriever, Retriever};
use crate::web_search::WebSearchProvider;

const SEARCH_MAX_RESULTS: usize = 7;
const MAX_CRAWL_URLS: usize = 10;
const RETRIEVE_K: usize = 20;
const RERANK_K: usize = 5;

/// Everything `process_query` needs: the config plus one concrete adapter
/// per capability the pipeline consumes. Wiring these together is the
/// only place that chooses concrete types over trait objects.
pub struct Pipeline {
    config: SystemConfig,
    llm: Arc<dyn LlmClient>,
    query_expander: QueryExpander,
    web_search: Arc<dyn WebSearchProvider>,
    crawler: Arc<dyn PageCrawler>,
    chunker: Arc<dyn Chunker>,
    retriever: Arc<dyn Retriever>,
    reranker: Arc<dyn Reranker>,
    answerer: Arc<dyn Answerer>,
    session_store: Arc<dyn SessionStore>,
    chunk_semaphore: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(
        config: SystemConfig,
        llm: Arc<dyn LlmClient>,
        web_search: Arc<dyn WebSearchProvider>,
        crawler: Arc<dyn PageCrawler>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        let chunker: Arc<dyn Chunker> = match config.chunking_strategy {
            ChunkingStrategy::Simple => {
                Arc::new(SimpleChunker::new(config.chunk_size, config.chunk_overlap))
            }
            ChunkingStrategy::Contextual => Arc::new(ContextualChunker::new(
                llm.clone(),
                config.chunk_size,
                config.chunk_overlap,
            )),
        };

        Self {
            chunk_semaphore: Arc::new(Semaphore::new(config.max_concurrent_chunks)),
            query_expander: QueryExpander::new(llm.clone()),
            retriever: Arc::new(HybridRetriever::new(llm.clone(), config.vector_dimension)),
            reranker: Arc::new(JaccardReranker),
            answerer: Arc::new(LlmAnswerer::new(llm.clone())),
            llm,
            web_search,
            crawler,
            chunker,
            session_store,
            config,
        }
    }

    /// Runs the full pipeline for `query` under `session_id`, never
    /// raising: every failure degrades into the returned [`QAOutcome`].
    #[instrument(skip(self, query), fields(query_len = query.len(), session_id))]
    pub async fn process_query(&self, query: &str, session_id: &str) -> QAOutcome {
        let start = Instant::now();

        match tokio::time::timeout(self.config.max_processing_time(), self.run(query, session_id)).await
        {
            Ok(response) => QAOutcome::success(response, start.elapsed().as_secs_f64()),
            Err(_) => {
                warn!(session_id, "pipeline deadline exceeded");
                QAOutcome::failure(PipelineError::Timeout.to_string(), start.elapsed().as_secs_f64())
            }
        }
    }

    async fn run(&self, query: &str, session_id: &str) -> QAResponse {
        let mut index = VectorIndex::new(self.config.vector_dimension);
        for chunk in self.session_store.load(session_id, 1000).await.unwrap_or_default() {
            let _ = index.add(chunk);
        }

        let mut scratchpad = ScratchPad::new(query);
        scratchpad.expanded_queries = self.query_expander.expand(query).await;

        scratchpad.documents = self.search_stage(&scratchpad.expanded_queries).await;
        let crawled = self.crawl_stage(&scratchpad.documents).await;
        let chunks = self.chunk_stage(&crawled).await;
        self.embed_and_index_stage(chunks, &mut index).await;

        let retrieved = self.retriever.retrieve(query, &index, RETRIEVE_K).await;
        let RankedChunks { chunks, scores } = self.reranker.rerank(query, retrieved, RERANK_K).await;
        scratchpad.retrieved_chunks = chunks;
        scratchpad.scores = scores;

        let answer = self.answerer.answer(query, &scratchpad.retrieved_chunks).await;
        let sources: Vec<String> = scratchpad
            .retrieved_chunks
            .iter()
            .map(|chunk| chunk.url.clone())
            .collect();
        let confidence = if scratchpad.scores.is_empty() {
            0.0
        } else {
            (scratchpad.scores.iter().sum::<f32>() / scratchpad.scores.len() as f32).clamp(0.0, 1.0)
        };

        // The index still holds every chunk loaded from the session plus
        // everything ingested this run, so a save here writes loaded
        // chunks back even when nothing new was added to them this run.
        self.session_store.save(session_id, index.chunks()).await.ok();

        info!(sources = sources.len(), "pipeline run complete");
        QAResponse {
            query: query.to_string(),
            answer,
            sources,
            confidence,
        }
    }

    /// Fans out one search call per processed query (bounded to at most 3
    /// by the query expander), preserving per-query provider order. A
    /// failing expansion contributes nothing rather than aborting the stage.
    async fn search_stage(
        &self,
        expanded: &websearch_qa_common::SearchQuery,
    ) -> Vec<websearch_qa_common::WebDocument> {
        let futures = expanded.processed_queries.iter().map(|q| {
            let search_text = q.clone();
            async move {
                match self.web_search.search(&search_text, SEARCH_MAX_RESULTS).await {
                    Ok(docs) => docs,
                    Err(err) => {
                        warn!(%err, query = search_text, "web search failed, skipping expansion");
                        Vec::new()
                    }
                }
            }
        });

        join_all(futures).await.into_iter().flatten().collect()
    }

    /// Crawls the first [`MAX_CRAWL_URLS`] unique URLs, discarding
    /// duplicates across expansions so a URL returned by multiple
    /// expansions is fetched exactly once.
    async fn crawl_stage(
        &self,
        documents: &[websearch_qa_common::WebDocument],
    ) -> Vec<(websearch_qa_common::WebDocument, websearch_qa_common::WebDocumentContent)> {
        let mut seen = HashSet::new();
        let unique_docs: Vec<&websearch_qa_common::WebDocument> = documents
            .iter()
            .filter(|doc| seen.insert(doc.url.clone()))
            .take(MAX_CRAWL_URLS)
            .collect();

        let futures = unique_docs.into_iter().map(|doc| async move {
            match self.crawler.crawl(&doc.url).await {
                Ok(content) => Some((doc.clone(), content)),
                Err(err) => {
                    warn!(%err, url = doc.url, "crawl failed, skipping");
                    None
                }
            }
        });

        join_all(futures).await.into_iter().flatten().collect()
    }

    /// Chunks every crawled document, bounding simultaneous per-document
    /// chunking to `max_concurrent_chunks` so contextual chunking (which
    /// fans out one LLM call per chunk inside a document) can't saturate
    /// the LLM endpoint across documents at once.
    async fn chunk_stage(
        &self,
        crawled: &[(websearch_qa_common::WebDocument, websearch_qa_common::WebDocumentContent)],
    ) -> Vec<SemanticChunk> {
        let futures = crawled.iter().map(|(doc, content)| async move {
            let _permit = self
                .chunk_semaphore
                .acquire()
                .await
                .expect("semaphore is never closed");
            match self.chunker.chunk_document(content, &doc.url, &doc.search_query).await {
                Ok(chunks) => chunks,
                Err(err) => {
                    warn!(%err, url = doc.url, "chunking failed, skipping document");
                    Vec::new()
                }
            }
        });

        join_all(futures).await.into_iter().flatten().collect()
    }

    /// Embeds each chunk one call at a time (no batch endpoint is
    /// assumed) and adds it to the index, substituting a zero-vector on
    /// embedding failure so the chunk still participates in sparse
    /// retrieval even though its dense contribution will be meaningless.
    async fn embed_and_index_stage(&self, chunks: Vec<SemanticChunk>, index: &mut VectorIndex) {
        for mut chunk in chunks {
            let embedding = match self.embed_one(&chunk.content).await {
                Some(vector) => vector,
                None => vec![0.0; self.config.vector_dimension],
            };
            chunk.embedding = Some(embedding);
            if let Err(err) = index.add(chunk) {
                warn!(%err, "dropping chunk that failed to index");
            }
        }
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        match self.llm.embed(&[text.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => {
                warn!("embedding call returned no vectors");
                None
            }
            Err(err) => {
                warn!(%err, "chunk embedding failed, substituting zero-vector");
                None
            }
        }
    }
}
