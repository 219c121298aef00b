//! Splits crawled documents into indexable passages.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use websearch_qa_common::{ChunkMetadata, SemanticChunk, WebDocumentContent};

use crate::llm::LlmClient;

const MIN_CHUNK_CHARS: usize = 50;

#[async_trait]
pub trait Chunker: Send + Sync {
    async fn chunk_document(
        &self,
        document: &WebDocumentContent,
        url: &str,
        query: &str,
    ) -> anyhow::Result<Vec<SemanticChunk>>;
}

struct RawChunk {
    text: String,
    position: usize,
}

fn sliding_window(content: &str, chunk_size: usize, overlap: usize) -> Vec<RawChunk> {
    let step = chunk_size - overlap;
    let chars: Vec<char> = content.chars().collect();
    let mut raw = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        let end = (i + chunk_size).min(chars.len());
        let text: String = chars[i..end].iter().collect();
        if text.trim().len() >= MIN_CHUNK_CHARS {
            raw.push(RawChunk { text, position: i });
        }
        i += step;
    }
    raw
}

/// Sliding-window chunking with no LLM involvement.
pub struct SimpleChunker {
    chunk_size: usize,
    overlap: usize,
}

impl SimpleChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self { chunk_size, overlap }
    }
}

#[async_trait]
impl Chunker for SimpleChunker {
    #[instrument(skip(self, document), fields(url))]
    async fn chunk_document(
        &self,
        document: &WebDocumentContent,
        url: &str,
        query: &str,
    ) -> anyhow::Result<Vec<SemanticChunk>> {
        let raw_chunks = sliding_window(&document.markdown, self.chunk_size, self.overlap);
        debug!(count = raw_chunks.len(), "simple chunking complete");

        Ok(raw_chunks
            .into_iter()
            .map(|raw| {
                let chunk_id = SemanticChunk::compute_chunk_id(url, raw.position, &raw.text);
                SemanticChunk {
                    chunk_id,
                    url: url.to_string(),
                    content: raw.text,
                    metadata: ChunkMetadata::new(raw.position, query, &document.document_id),
                    embedding: None,
                }
            })
            .collect())
    }
}

/// Contextual Retrieval: each chunk is prefixed with an LLM-generated
/// sentence or two situating it within the whole document, to improve
/// retrieval recall for passages that read ambiguously on their own.
pub struct ContextualChunker {
    llm: std::sync::Arc<dyn LlmClient>,
    chunk_size: usize,
    overlap: usize,
}

impl ContextualChunker {
    pub fn new(llm: std::sync::Arc<dyn LlmClient>, chunk_size: usize, overlap: usize) -> Self {
        Self {
            llm,
            chunk_size,
            overlap,
        }
    }

    fn context_prompt(chunk_text: &str, full_document: &str) -> String {
        format!(
            "<document>\n{full_document}\n</document>\n\n\
             Here is the chunk we want to situate within the whole document:\n\
             <chunk>\n{chunk_text}\n</chunk>\n\n\
             Give a short, succinct 1-2 sentence context to situate this chunk \
             within the overall document, to improve search retrieval."
        )
    }
}

#[async_trait]
impl Chunker for ContextualChunker {
    #[instrument(skip(self, document), fields(url))]
    async fn chunk_document(
        &self,
        document: &WebDocumentContent,
        url: &str,
        query: &str,
    ) -> anyhow::Result<Vec<SemanticChunk>> {
        let raw_chunks = sliding_window(&document.markdown, self.chunk_size, self.overlap);
        if raw_chunks.is_empty() {
            return Ok(Vec::new());
        }

        let context_futures = raw_chunks.iter().map(|raw| {
            let prompt = Self::context_prompt(&raw.text, &document.markdown);
            async move { self.llm.complete(&prompt).await }
        });
        let contexts = futures::future::join_all(context_futures).await;

        let mut chunks = Vec::with_capacity(raw_chunks.len());
        for (raw, context_result) in raw_chunks.into_iter().zip(contexts) {
            let chunk_id = SemanticChunk::compute_chunk_id(url, raw.position, &raw.text);
            let mut metadata = ChunkMetadata::new(raw.position, query, &document.document_id);
            metadata.original_content = Some(raw.text.clone());

            let content = match context_result {
                Ok(context) if !context.trim().is_empty() => {
                    metadata.contextual_retrieval = Some(true);
                    format!("{}\n\n{}", context.trim(), raw.text)
                }
                Ok(_) => {
                    warn!(position = raw.position, "empty context response, using raw chunk");
                    metadata.contextual_retrieval = Some(false);
                    raw.text
                }
                Err(err) => {
                    warn!(%err, position = raw.position, "context generation failed, using raw chunk");
                    metadata.contextual_retrieval = Some(false);
                    raw.text
                }
            };

            chunks.push(SemanticChunk {
                chunk_id,
                url: url.to_string(),
                content,
                metadata,
                embedding: None,
            });
        }

        info!(count = chunks.len(), "contextual chunking complete");
        Ok(chunks)
    }
}
