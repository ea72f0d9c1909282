//! Query pipeline request and response shapes
//!
//! The response shape is also the persistence shape: everything a memory
//! entry needs to answer the same query later round-trips through the
//! JSON columns helpers here.

use docmind_common::db::models::MemoryEntry;
use docmind_common::db::NewMemoryEntry;
use docmind_retrieval::{AssembledContext, RetrievedChunk, ScoredCommunity, ScoredEntity};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Incoming query
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,

    /// Chunks to retrieve for the context
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 50))]
    pub max_results: usize,

    /// When false the memory cache is bypassed for this request
    #[serde(default = "default_use_memory")]
    pub use_memory: bool,
}

fn default_max_results() -> usize {
    5
}

fn default_use_memory() -> bool {
    true
}

/// One context chunk as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkView {
    pub id: i64,
    pub text: String,
    pub source: String,
    pub similarity: f32,
}

impl From<&RetrievedChunk> for ChunkView {
    fn from(chunk: &RetrievedChunk) -> Self {
        Self {
            id: chunk.chunk_id,
            text: chunk.content.clone(),
            source: chunk.source.clone(),
            similarity: chunk.similarity,
        }
    }
}

/// Full query answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub chunks: Vec<ChunkView>,
    pub entities: Vec<ScoredEntity>,
    pub communities: Vec<ScoredCommunity>,
    /// Parallel to `chunks`: `references[i]` resolves citation `i + 1`
    pub references: Vec<Option<String>>,
    pub from_memory: bool,
    pub memory_id: Option<i64>,
    pub low_confidence: bool,
}

/// One entry of the stored citation map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CitationRef {
    /// 1-based citation index in context order
    pub index: u32,
    pub chunk_id: i64,
}

/// Encode (index, chunk id) pairs for the citations column
pub fn citations_to_json(pairs: &[(u32, i64)]) -> serde_json::Value {
    let refs: Vec<CitationRef> = pairs
        .iter()
        .map(|&(index, chunk_id)| CitationRef { index, chunk_id })
        .collect();
    serde_json::to_value(refs).unwrap_or_else(|_| serde_json::json!([]))
}

/// Decode a stored citation map; a malformed column reads as empty
pub fn citations_from_json(value: &serde_json::Value) -> Vec<CitationRef> {
    match serde_json::from_value(value.clone()) {
        Ok(refs) => refs,
        Err(err) => {
            tracing::warn!(error = %err, "Malformed citation map in memory entry");
            Vec::new()
        }
    }
}

fn json_or_empty_list<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|_| serde_json::json!([]))
}

fn from_json_or_default<T: serde::de::DeserializeOwned + Default>(
    value: &serde_json::Value,
    column: &str,
) -> T {
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(column, error = %err, "Malformed JSON column in memory entry");
            T::default()
        }
    }
}

impl QueryResponse {
    /// Response for a freshly synthesized answer
    pub fn fresh(
        query: String,
        answer: String,
        low_confidence: bool,
        context: &AssembledContext,
        memory_id: Option<i64>,
    ) -> Self {
        Self {
            query,
            answer,
            chunks: context.chunks.iter().map(ChunkView::from).collect(),
            entities: context.entities.clone(),
            communities: context.communities.clone(),
            references: context.references.clone(),
            from_memory: false,
            memory_id,
            low_confidence,
        }
    }

    /// Reconstruct a response from a remembered entry.
    ///
    /// `chunks` are the re-fetched context chunks in citation order; the
    /// caller supplies them because chunk text is not denormalized into
    /// the memory row.
    pub fn remembered(entry: &MemoryEntry, chunks: Vec<ChunkView>) -> Self {
        Self {
            query: entry.query_text.clone(),
            answer: entry.answer_text.clone(),
            chunks,
            entities: from_json_or_default(&entry.entities, "entities"),
            communities: from_json_or_default(&entry.communities, "communities"),
            references: from_json_or_default(&entry.reference_list, "reference_list"),
            from_memory: true,
            memory_id: Some(entry.id),
            low_confidence: entry.low_confidence,
        }
    }

    /// The row this response persists as
    pub fn to_new_memory_entry(
        &self,
        query_hash: String,
        query_embedding: Vec<f32>,
        context: &AssembledContext,
    ) -> NewMemoryEntry {
        NewMemoryEntry {
            query_text: self.query.clone(),
            query_hash,
            query_embedding,
            answer_text: self.answer.clone(),
            citations: citations_to_json(&context.citation_pairs()),
            reference_list: json_or_empty_list(&self.references),
            entities: json_or_empty_list(&self.entities),
            communities: json_or_empty_list(&self.communities),
            low_confidence: self.low_confidence,
        }
    }
}
