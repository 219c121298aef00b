use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, ScrollPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use websearch_qa_common::SemanticChunk;

/// Durable storage for a session's accumulated chunks, keyed by session id.
///
/// Persistence failures never fail the pipeline: `load` returns an empty
/// set on error, `save` logs and returns `Ok(())` regardless of whether the
/// write actually landed.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str, limit: u32) -> anyhow::Result<Vec<SemanticChunk>>;
    async fn save(&self, session_id: &str, chunks: &[SemanticChunk]) -> anyhow::Result<()>;
}

/// Qdrant-backed implementation. One collection per session, named
/// `session_<session_id>`, reused across calls rather than recreated.
pub struct QdrantSessionStore {
    client: Qdrant,
    dimension: u64,
}

impl QdrantSessionStore {
    pub fn new(host: &str, port: u16, dimension: usize) -> anyhow::Result<Self> {
        let url = format!("http://{host}:{port}");
        let client = Qdrant::from_url(&url).build()?;
        Ok(Self {
            client,
            dimension: dimension as u64,
        })
    }

    fn collection_name(session_id: &str) -> String {
        format!("session_{session_id}")
    }

    async fn ensure_collection(&self, collection: &str) -> anyhow::Result<()> {
        let existing = self.client.list_collections().await?;
        let exists = existing
            .collections
            .iter()
            .any(|c| c.name == collection);

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(collection)
                        .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)),
                )
                .await?;
            tracing::info!(collection, "created session collection");
        }
        Ok(())
    }
}

/// Builds the point Qdrant stores for one chunk: the chunk's own embedding
/// as the vector, the whole chunk (including its own embedding) as payload
/// so `point_to_chunk` can reconstruct it without a side channel.
fn chunk_to_point(id: u64, chunk: &SemanticChunk) -> anyhow::Result<PointStruct> {
    let vector = chunk
        .embedding
        .clone()
        .ok_or_else(|| anyhow::anyhow!("chunk {} has no embedding", chunk.chunk_id))?;
    let payload = serde_json::to_value(chunk)?;
    Ok(PointStruct::new(id, vector, Payload::try_from(payload)?))
}

/// Reconstructs a chunk from a scrolled point's raw payload map. Pure and
/// network-free so it can be exercised without a live Qdrant instance.
fn point_to_chunk(payload: HashMap<String, QdrantValue>) -> serde_json::Result<SemanticChunk> {
    let value: serde_json::Value = Payload::from(payload).into();
    serde_json::from_value(value)
}

#[async_trait]
impl SessionStore for QdrantSessionStore {
    async fn load(&self, session_id: &str, limit: u32) -> anyhow::Result<Vec<SemanticChunk>> {
        let collection = Self::collection_name(session_id);

        let result = async {
            self.ensure_collection(&collection).await?;
            let response = self
                .client
                .scroll(ScrollPointsBuilder::new(&collection).limit(limit).with_payload(true))
                .await?;

            let mut chunks = Vec::with_capacity(response.result.len());
            for point in response.result {
                match point_to_chunk(point.payload) {
                    Ok(chunk) => chunks.push(chunk),
                    Err(err) => tracing::warn!(%err, "dropping unparseable stored chunk"),
                }
            }
            Ok::<_, anyhow::Error>(chunks)
        }
        .await;

        match result {
            Ok(chunks) => Ok(chunks),
            Err(err) => {
                tracing::warn!(%err, session_id, "session load failed, starting empty");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, session_id: &str, chunks: &[SemanticChunk]) -> anyhow::Result<()> {
        let collection = Self::collection_name(session_id);

        let result = async {
            self.ensure_collection(&collection).await?;

            let points: Vec<PointStruct> = chunks
                .iter()
                .filter(|c| c.embedding.is_some())
                .enumerate()
                .map(|(id, chunk)| chunk_to_point(id as u64, chunk).expect("filtered to chunks with embeddings"))
                .collect();

            if points.is_empty() {
                return Ok(());
            }

            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, points))
                .await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;

        if let Err(err) = result {
            tracing::warn!(%err, session_id, "session save failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use websearch_qa_common::ChunkMetadata;

    fn chunk(id: &str) -> SemanticChunk {
        SemanticChunk {
            chunk_id: id.to_string(),
            url: "https://example.com".to_string(),
            content: "rust is a systems programming language".to_string(),
            metadata: ChunkMetadata::new(0, "what is rust", "doc-1"),
            embedding: Some(vec![0.1, 0.2, 0.3, 0.4]),
        }
    }

    /// The round trip a live scroll/upsert goes through: a chunk becomes a
    /// point's payload, and that payload parses back into the same chunk.
    #[test]
    fn chunk_survives_point_round_trip() {
        let original = chunk("a");
        let point = chunk_to_point(0, &original).unwrap();
        let restored = point_to_chunk(point.payload).unwrap();

        assert_eq!(restored.chunk_id, original.chunk_id);
        assert_eq!(restored.content, original.content);
        assert_eq!(restored.metadata.parent_document_id, original.metadata.parent_document_id);
        assert_eq!(restored.embedding, original.embedding);
    }

    #[test]
    fn chunk_to_point_rejects_missing_embedding() {
        let mut c = chunk("a");
        c.embedding = None;
        assert!(chunk_to_point(0, &c).is_err());
    }

    #[test]
    fn point_to_chunk_rejects_payload_missing_required_fields() {
        let mut payload = HashMap::new();
        payload.insert("chunk_id".to_string(), QdrantValue::from("a"));
        // `url`, `content`, `metadata`, `embedding` are all absent.
        assert!(point_to_chunk(payload).is_err());
    }

    #[test]
    fn collection_name_follows_session_convention() {
        assert_eq!(QdrantSessionStore::collection_name("abc123"), "session_abc123");
    }
}
