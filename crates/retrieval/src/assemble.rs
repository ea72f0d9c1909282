//! Rank fusion and context assembly
//!
//! Merges the vector and graph retrieval signals into one ordered,
//! deduplicated context with stable 1-based citation indices, plus a
//! parallel reference list. Entities and communities ride along as
//! auxiliary context; they are never citable and never shift indices.

use crate::{RetrievalMode, RetrievedChunk, ScoredCommunity, ScoredEntity};
use std::collections::HashSet;

/// The ordered context handed to the synthesizer
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    /// Final chunk order; citation index N refers to `chunks[N-1]`
    pub chunks: Vec<RetrievedChunk>,

    /// `references[i]` resolves citation index `i + 1`; the chunk's
    /// citation string if present, else its source label, else None
    pub references: Vec<Option<String>>,

    /// Auxiliary entity context, never citable
    pub entities: Vec<ScoredEntity>,

    /// Auxiliary community context, never citable
    pub communities: Vec<ScoredCommunity>,
}

impl AssembledContext {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// (citation index, chunk id) pairs in context order
    pub fn citation_pairs(&self) -> Vec<(u32, i64)> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(i, c)| ((i + 1) as u32, c.chunk_id))
            .collect()
    }
}

/// Assembles retrieval signals into an ordered context
pub struct ContextAssembler {
    /// Maximum chunks in the assembled context
    limit: usize,
}

impl ContextAssembler {
    /// Create an assembler with a total context cap
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Merge vector and graph chunks into the final citation order.
    ///
    /// Vector rank is primary; graph chunks append after, in graph order.
    /// Duplicate chunk ids collapse to the earlier (higher-ranked) entry.
    pub fn assemble(
        &self,
        vector_chunks: Vec<RetrievedChunk>,
        graph_chunks: Vec<RetrievedChunk>,
        entities: Vec<ScoredEntity>,
        communities: Vec<ScoredCommunity>,
    ) -> AssembledContext {
        let mut seen: HashSet<i64> = HashSet::new();
        let mut chunks: Vec<RetrievedChunk> = Vec::new();

        for chunk in vector_chunks {
            if seen.insert(chunk.chunk_id) {
                chunks.push(chunk);
            }
        }

        for mut chunk in graph_chunks {
            if seen.insert(chunk.chunk_id) {
                chunk.mode = RetrievalMode::Graph;
                chunks.push(chunk);
            }
        }

        chunks.truncate(self.limit);

        let references: Vec<Option<String>> =
            chunks.iter().map(|c| c.reference_label()).collect();

        AssembledContext {
            chunks,
            references,
            entities,
            communities,
        }
    }
}
