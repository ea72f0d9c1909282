//! Vector similarity search
//!
//! Semantic retrieval over the embedded chunk corpus.

use crate::{ChunkStore, RetrievalMode, RetrievedChunk};
use docmind_common::errors::{AppError, Result};
use std::sync::Arc;

/// Vector retriever over a chunk store
pub struct VectorRetriever {
    store: Arc<dyn ChunkStore>,
}

impl VectorRetriever {
    /// Create a new vector retriever
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self { store }
    }

    /// Retrieve up to `limit` chunks ordered by similarity descending.
    ///
    /// A limit larger than the corpus returns the whole corpus.
    pub async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>> {
        if embedding.is_empty() {
            return Err(AppError::Validation {
                message: "vector search requires a query embedding".into(),
                field: Some("query_embedding".into()),
            });
        }

        let hits = self.store.nearest(embedding, limit).await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut chunk = RetrievedChunk::from(hit);
                chunk.similarity = chunk.similarity.clamp(0.0, 1.0);
                chunk.mode = RetrievalMode::Vector;
                chunk
            })
            .collect())
    }

    /// Re-fetch specific chunks by id, preserving the input order.
    ///
    /// With `score_against` set, similarities are recomputed against that
    /// embedding and clamped into [0, 1]; otherwise they read 1.0.
    pub async fn fetch_by_ids(
        &self,
        ids: &[i64],
        score_against: Option<&[f32]>,
    ) -> Result<Vec<RetrievedChunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let hits = self.store.by_ids(ids, score_against).await?;
        let mut by_id: std::collections::HashMap<i64, RetrievedChunk> = hits
            .into_iter()
            .map(|h| {
                let mut chunk = RetrievedChunk::from(h);
                chunk.similarity = chunk.similarity.clamp(0.0, 1.0);
                (chunk.chunk_id, chunk)
            })
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryChunkStore, StoredChunk};

    fn chunk(id: i64, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            id,
            document_id: 1,
            chunk_index: id as i32,
            content: format!("chunk {}", id),
            source: "doc.pdf".into(),
            reference: None,
            embedding,
        }
    }

    fn retriever_with(chunks: Vec<StoredChunk>) -> VectorRetriever {
        let store = InMemoryChunkStore::new();
        for c in chunks {
            store.insert(c);
        }
        VectorRetriever::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_limit_larger_than_corpus_returns_everything() {
        let retriever = retriever_with(vec![
            chunk(1, vec![1.0, 0.0]),
            chunk(2, vec![0.0, 1.0]),
        ]);

        let results = retriever.search(&[1.0, 0.0], 50).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_results_ordered_and_clamped() {
        let retriever = retriever_with(vec![
            chunk(1, vec![1.0, 0.0]),
            // Opposite direction, raw cosine is negative
            chunk(2, vec![-1.0, 0.0]),
        ]);

        let results = retriever.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results[0].chunk_id, 1);
        assert!(results[0].similarity > 0.99);
        assert_eq!(results[1].similarity, 0.0);
        assert!(results.iter().all(|c| c.mode == RetrievalMode::Vector));
    }

    #[tokio::test]
    async fn test_empty_embedding_rejected() {
        let retriever = retriever_with(vec![chunk(1, vec![1.0])]);
        assert!(retriever.search(&[], 5).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_by_ids_preserves_order() {
        let retriever = retriever_with(vec![
            chunk(1, vec![1.0]),
            chunk(2, vec![1.0]),
            chunk(3, vec![1.0]),
        ]);

        let results = retriever.fetch_by_ids(&[3, 1], None).await.unwrap();
        let ids: Vec<i64> = results.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![3, 1]);
    }
}
