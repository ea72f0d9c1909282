//! Multi-modal retrieval for the docmind query pipeline
//!
//! Provides:
//! - Vector search (semantic similarity via embeddings)
//! - Graph enhancement (entity and community scoring over a knowledge graph)
//! - Context assembly (rank fusion with stable 1-based citation indices)

mod assemble;
mod graph;
mod store;
mod vector;

pub use assemble::{AssembledContext, ContextAssembler};
pub use graph::{GraphEnhancement, GraphIndex, GraphRetriever};
pub use store::{ChunkStore, InMemoryChunkStore, StoredChunk};
pub use vector::VectorRetriever;

use docmind_common::db::ChunkHit;
use serde::{Deserialize, Serialize};

/// Retrieved chunk with relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk ID
    pub chunk_id: i64,

    /// Document this chunk belongs to
    pub document_id: i64,

    /// Chunk index within the document
    pub chunk_index: i32,

    /// Chunk content
    pub content: String,

    /// Source document label
    pub source: String,

    /// Resolvable citation string, when known
    pub reference: Option<String>,

    /// Relevance score (0.0 - 1.0)
    pub similarity: f32,

    /// Retrieval mode that produced this chunk
    pub mode: RetrievalMode,
}

impl RetrievedChunk {
    /// Best available reference string: the citation if present, else the source
    pub fn reference_label(&self) -> Option<String> {
        self.reference
            .clone()
            .or_else(|| Some(self.source.clone()))
            .filter(|s| !s.is_empty())
    }
}

impl From<ChunkHit> for RetrievedChunk {
    fn from(hit: ChunkHit) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            document_id: hit.document_id,
            chunk_index: hit.chunk_index,
            content: hit.content,
            source: hit.source,
            reference: hit.reference,
            similarity: hit.similarity as f32,
            mode: RetrievalMode::Vector,
        }
    }
}

/// Retrieval mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Vector similarity search
    Vector,
    /// Knowledge-graph traversal
    Graph,
    /// Combined ordering after assembly
    Fused,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Vector => "vector",
            RetrievalMode::Graph => "graph",
            RetrievalMode::Fused => "fused",
        }
    }
}

/// Entity scored against a set of retrieved chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    #[serde(rename = "entity")]
    pub name: String,
    pub entity_type: String,
    pub relevance: f32,
}

/// Community summary scored against a set of retrieved chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCommunity {
    pub community_id: i32,
    pub summary: String,
    pub relevance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_label_fallback() {
        let mut chunk = RetrievedChunk {
            chunk_id: 1,
            document_id: 1,
            chunk_index: 0,
            content: "text".into(),
            source: "paper.pdf".into(),
            reference: Some("Smith et al., 2024".into()),
            similarity: 0.9,
            mode: RetrievalMode::Vector,
        };
        assert_eq!(chunk.reference_label().as_deref(), Some("Smith et al., 2024"));

        chunk.reference = None;
        assert_eq!(chunk.reference_label().as_deref(), Some("paper.pdf"));

        chunk.source = String::new();
        assert_eq!(chunk.reference_label(), None);
    }

    #[test]
    fn test_mode_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RetrievalMode::Vector).unwrap(),
            "\"vector\""
        );
        assert_eq!(RetrievalMode::Fused.as_str(), "fused");
    }
}
