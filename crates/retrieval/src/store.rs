//! Chunk store abstraction
//!
//! The vector retriever reads chunks through this trait so the pipeline
//! can run against Postgres in production and an in-memory corpus in tests.

use async_trait::async_trait;
use docmind_common::db::{ChunkHit, Repository};
use docmind_common::embeddings::cosine_similarity;
use docmind_common::errors::Result;
use std::cmp::Ordering;
use std::sync::RwLock;

/// Read access to the embedded chunk corpus
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Nearest chunks by embedding similarity, ordered best-first,
    /// ties broken by lower chunk id
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<ChunkHit>>;

    /// Fetch specific chunks by id (missing ids are skipped).
    ///
    /// With `score_against` set, each hit's similarity is its cosine
    /// similarity to that embedding (0.0 when the chunk has none);
    /// otherwise similarity is reported as 1.0.
    async fn by_ids(&self, ids: &[i64], score_against: Option<&[f32]>) -> Result<Vec<ChunkHit>>;

    /// Number of chunks with embeddings
    async fn embedded_count(&self) -> Result<u64>;
}

#[async_trait]
impl ChunkStore for Repository {
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<ChunkHit>> {
        self.nearest_chunks(embedding, limit).await
    }

    async fn by_ids(&self, ids: &[i64], score_against: Option<&[f32]>) -> Result<Vec<ChunkHit>> {
        let chunks = self.chunks_by_ids(ids).await?;
        Ok(chunks
            .into_iter()
            .map(|c| {
                let similarity = match score_against {
                    Some(query) => c
                        .parse_embedding()
                        .map(|e| cosine_similarity(&e, query) as f64)
                        .unwrap_or(0.0),
                    None => 1.0,
                };
                ChunkHit {
                    chunk_id: c.id,
                    document_id: c.document_id,
                    chunk_index: c.chunk_index,
                    content: c.content,
                    source: c.source,
                    reference: c.reference,
                    similarity,
                }
            })
            .collect())
    }

    async fn embedded_count(&self) -> Result<u64> {
        self.count_embedded_chunks().await
    }
}

/// A chunk held by the in-memory store
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i32,
    pub content: String,
    pub source: String,
    pub reference: Option<String>,
    pub embedding: Vec<f32>,
}

/// In-memory chunk corpus for development and tests
#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, chunk: StoredChunk) {
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<ChunkHit>> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());

        let mut hits: Vec<ChunkHit> = chunks
            .iter()
            .map(|c| ChunkHit {
                chunk_id: c.id,
                document_id: c.document_id,
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                source: c.source.clone(),
                reference: c.reference.clone(),
                similarity: cosine_similarity(&c.embedding, embedding) as f64,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn by_ids(&self, ids: &[i64], score_against: Option<&[f32]>) -> Result<Vec<ChunkHit>> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        Ok(chunks
            .iter()
            .filter(|c| ids.contains(&c.id))
            .map(|c| ChunkHit {
                chunk_id: c.id,
                document_id: c.document_id,
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                source: c.source.clone(),
                reference: c.reference.clone(),
                similarity: match score_against {
                    Some(query) => cosine_similarity(&c.embedding, query) as f64,
                    None => 1.0,
                },
            })
            .collect())
    }

    async fn embedded_count(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }
}
