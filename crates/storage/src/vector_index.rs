use websearch_qa_common::SemanticChunk;

/// A flat, brute-force L2 vector index held entirely in memory.
///
/// Position `i` in `vectors` always corresponds to `chunks[i]` — the two
/// are parallel arrays and must be mutated together. `search` returns L2
/// distance as the score: lower is better, and callers should treat it as
/// a rank rather than a similarity.
#[derive(Debug, Default)]
pub struct VectorIndex {
    dimension: Option<usize>,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<SemanticChunk>,
}

/// A single hit from [`VectorIndex::search`].
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: SemanticChunk,
    /// L2 distance; lower is better.
    pub score: f32,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            vectors: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[SemanticChunk] {
        &self.chunks
    }

    /// Adds a chunk, provided it has an embedding matching the index's
    /// configured dimension. Chunks without an embedding, or with a
    /// mismatched one, are rejected rather than silently dropped.
    pub fn add(&mut self, chunk: SemanticChunk) -> Result<(), String> {
        let embedding = chunk
            .embedding
            .as_ref()
            .ok_or_else(|| "chunk has no embedding".to_string())?;

        let dimension = *self.dimension.get_or_insert(embedding.len());
        if embedding.len() != dimension {
            return Err(format!(
                "embedding dimension {} does not match index dimension {dimension}",
                embedding.len()
            ));
        }

        self.vectors.push(embedding.clone());
        self.chunks.push(chunk);
        Ok(())
    }

    /// Returns the `k` chunks whose embeddings are closest to `query` by
    /// squared L2 distance, ascending (best first).
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .vectors
            .iter()
            .zip(self.chunks.iter())
            .map(|(vector, chunk)| ScoredChunk {
                chunk: chunk.clone(),
                score: l2_distance(query, vector),
            })
            .collect();

        scored.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.chunks.clear();
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use websearch_qa_common::ChunkMetadata;

    fn chunk(id: &str, embedding: Vec<f32>) -> SemanticChunk {
        SemanticChunk {
            chunk_id: id.to_string(),
            url: "https://example.com".to_string(),
            content: "text".to_string(),
            metadata: ChunkMetadata::new(0, "query", "https://example.com"),
            embedding: Some(embedding),
        }
    }

    #[test]
    fn add_rejects_chunk_without_embedding() {
        let mut index = VectorIndex::new(3);
        let mut c = chunk("a", vec![1.0, 0.0, 0.0]);
        c.embedding = None;
        assert!(index.add(c).is_err());
    }

    #[test]
    fn add_rejects_mismatched_dimension() {
        let mut index = VectorIndex::new(3);
        assert!(index.add(chunk("a", vec![1.0, 0.0])).is_err());
    }

    #[test]
    fn search_returns_closest_first() {
        let mut index = VectorIndex::new(2);
        index.add(chunk("far", vec![10.0, 10.0])).unwrap();
        index.add(chunk("near", vec![1.0, 1.0])).unwrap();

        let results = index.search(&[1.0, 1.0], 2);
        assert_eq!(results[0].chunk.chunk_id, "near");
        assert_eq!(results[1].chunk.chunk_id, "far");
        assert!(results[0].score < results[1].score);
    }

    #[test]
    fn clear_empties_both_parallel_arrays() {
        let mut index = VectorIndex::new(2);
        index.add(chunk("a", vec![1.0, 1.0])).unwrap();
        index.clear();
        assert_eq!(index.len(), 0);
        assert!(index.search(&[1.0, 1.0], 5).is_empty());
    }

    #[test]
    fn index_position_aligns_with_chunk_list() {
        let mut index = VectorIndex::new(2);
        index.add(chunk("a", vec![0.0, 0.0])).unwrap();
        index.add(chunk("b", vec![5.0, 5.0])).unwrap();
        assert_eq!(index.chunks()[0].chunk_id, "a");
        assert_eq!(index.chunks()[1].chunk_id, "b");
    }
}
