use crate::traits::{EmbeddingProvider, ScoredEntry, VectorIndex};
use crate::{IndexError, RetrievedChunk};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
pub const DEFAULT_RETRIEVAL_K: usize = 4;

struct IndexEntry {
    text: String,
    vector: Vec<f32>,
    norm: f32,
}

/// Exact cosine-similarity search over every stored vector.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    dimensions: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), IndexError> {
        match self.dimensions {
            Some(expected) if expected != actual => {
                Err(IndexError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(left: &[f32], left_norm: f32, right: &[f32], right_norm: f32) -> f32 {
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    let dot = left
        .iter()
        .zip(right.iter())
        .map(|(a, b)| a * b)
        .sum::<f32>();
    dot / (left_norm * right_norm)
}

impl VectorIndex for InMemoryVectorIndex {
    fn insert(&mut self, text: String, vector: Vec<f32>) -> Result<(), IndexError> {
        self.check_dimensions(vector.len())?;
        self.dimensions = Some(vector.len());
        let norm = norm(&vector);
        self.entries.push(IndexEntry { text, vector, norm });
        Ok(())
    }

    fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredEntry<'_>>, IndexError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimensions(query_vector.len())?;

        let query_norm = norm(query_vector);
        let mut scored = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| ScoredEntry {
                position,
                text: entry.text.as_str(),
                score: cosine(query_vector, query_norm, &entry.vector, entry.norm),
            })
            .collect::<Vec<_>>();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The session's searchable knowledge: chunk vectors plus the provider that
/// produced them, so queries are embedded in the same space.
pub struct KnowledgeIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: InMemoryVectorIndex,
}

impl KnowledgeIndex {
    /// Embeds every chunk (in batches of `batch_size`) and builds a fresh index.
    pub async fn build(
        chunks: Vec<String>,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let mut vectors = InMemoryVectorIndex::new();
        let batch_size = batch_size.max(1);

        for batch in chunks.chunks(batch_size) {
            let embeddings = embedder.embed_batch(batch).await?;
            if embeddings.len() != batch.len() {
                return Err(IndexError::CountMismatch {
                    chunks: batch.len(),
                    vectors: embeddings.len(),
                });
            }
            for (chunk, embedding) in batch.iter().zip(embeddings) {
                vectors.insert(chunk.clone(), embedding.vector)?;
            }
            debug!(provider = embedder.name(), batch = batch.len(), "indexed batch");
        }

        info!(
            provider = embedder.name(),
            entries = vectors.len(),
            dimensions = vectors.dimensions().unwrap_or_default(),
            "built vector index"
        );
        Ok(Self { embedder, vectors })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The `k` chunks most similar to `query`; never more than the index holds.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let hits = self
            .vectors
            .nearest(&query_vector.vector, k)?
            .into_iter()
            .map(|entry| RetrievedChunk {
                position: entry.position,
                text: entry.text.to_string(),
                score: entry.score,
            })
            .collect::<Vec<_>>();

        debug!(k, hits = hits.len(), "retrieved chunks");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FailingEmbedder;
    use crate::CharacterNgramEmbedder;
    use std::collections::HashSet;

    fn ngram() -> Arc<dyn EmbeddingProvider> {
        Arc::new(CharacterNgramEmbedder::default())
    }

    fn chunks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|text| text.to_string()).collect()
    }

    #[test]
    fn nearest_orders_by_cosine_similarity() {
        let mut index = InMemoryVectorIndex::new();
        index.insert("east".to_string(), vec![1.0, 0.0]).unwrap();
        index.insert("north".to_string(), vec![0.0, 1.0]).unwrap();
        index.insert("north-east".to_string(), vec![1.0, 1.0]).unwrap();

        let hits = index.nearest(&[0.1, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[1].text, "north-east");
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let mut index = InMemoryVectorIndex::new();
        index.insert("a".to_string(), vec![1.0, 0.0]).unwrap();

        assert!(matches!(
            index.insert("b".to_string(), vec![1.0]),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(index.nearest(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[tokio::test]
    async fn empty_chunk_list_builds_empty_index() {
        let index = KnowledgeIndex::build(Vec::new(), ngram(), 8).await.unwrap();
        assert_eq!(index.len(), 0);
        assert!(index.retrieve("anything", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retrieve_returns_at_most_min_k_n_distinct_chunks() {
        let texts = chunks(&[
            "Vacation policy is 15 days per year.",
            "The cafeteria opens at 8am.",
            "Parking permits are issued by facilities.",
        ]);
        let index = KnowledgeIndex::build(texts.clone(), ngram(), 2).await.unwrap();
        assert_eq!(index.len(), 3);

        for k in [1, 2, 3, 10] {
            let hits = index.retrieve("vacation days", k).await.unwrap();
            assert_eq!(hits.len(), k.min(texts.len()));

            let positions = hits.iter().map(|hit| hit.position).collect::<HashSet<_>>();
            assert_eq!(positions.len(), hits.len());
            assert!(hits.iter().all(|hit| texts.contains(&hit.text)));
        }

        let best = index.retrieve("vacation policy", 1).await.unwrap();
        assert_eq!(best[0].text, "Vacation policy is 15 days per year.");
    }

    #[tokio::test]
    async fn provider_failure_fails_the_build() {
        let result = KnowledgeIndex::build(chunks(&["text"]), Arc::new(FailingEmbedder), 4).await;
        assert!(matches!(result, Err(IndexError::Provider(_))));
    }
}
