//! Knowledge-graph enhancement
//!
//! Scores graph entities and community summaries against a set of
//! vector-retrieved chunks, and surfaces graph-related chunks the vector
//! pass missed. The graph is consumed read-only through an in-memory
//! snapshot loaded at startup; an empty or unavailable graph degrades to
//! empty results, never an error.

use crate::{RetrievedChunk, ScoredCommunity, ScoredEntity};
use docmind_common::db::models::{CommunitySummary, GraphEdge, GraphEntity};
use docmind_common::db::Repository;
use docmind_common::errors::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct EntityNode {
    id: i64,
    name: String,
    name_lower: String,
    entity_type: String,
}

#[derive(Debug, Clone)]
struct CommunityNode {
    community_id: i32,
    summary: String,
    entity_names_lower: HashSet<String>,
    chunk_ids: Vec<i64>,
}

/// In-memory snapshot of the knowledge graph
pub struct GraphIndex {
    entities: Vec<EntityNode>,
    /// Undirected adjacency between entity ids
    neighbors: HashMap<i64, HashSet<i64>>,
    communities: Vec<CommunityNode>,
}

impl GraphIndex {
    /// Create an empty graph
    pub fn empty() -> Self {
        Self {
            entities: Vec::new(),
            neighbors: HashMap::new(),
            communities: Vec::new(),
        }
    }

    /// Build a snapshot from loaded rows
    pub fn from_parts(
        entities: Vec<GraphEntity>,
        edges: Vec<GraphEdge>,
        communities: Vec<CommunitySummary>,
    ) -> Self {
        let entity_nodes: Vec<EntityNode> = entities
            .into_iter()
            .filter(|e| !e.name.trim().is_empty())
            .map(|e| EntityNode {
                id: e.id,
                name_lower: e.name.to_lowercase(),
                name: e.name,
                entity_type: e.entity_type,
            })
            .collect();

        let known_ids: HashSet<i64> = entity_nodes.iter().map(|e| e.id).collect();
        let mut neighbors: HashMap<i64, HashSet<i64>> = HashMap::new();
        for edge in edges {
            if edge.source_id == edge.target_id {
                continue;
            }
            if !known_ids.contains(&edge.source_id) || !known_ids.contains(&edge.target_id) {
                continue;
            }
            neighbors
                .entry(edge.source_id)
                .or_default()
                .insert(edge.target_id);
            neighbors
                .entry(edge.target_id)
                .or_default()
                .insert(edge.source_id);
        }

        let community_nodes: Vec<CommunityNode> = communities
            .into_iter()
            .map(|c| CommunityNode {
                community_id: c.community_id,
                entity_names_lower: c
                    .entity_names()
                    .into_iter()
                    .map(|n| n.to_lowercase())
                    .collect(),
                chunk_ids: c.chunk_ids(),
                summary: c.summary,
            })
            .collect();

        Self {
            entities: entity_nodes,
            neighbors,
            communities: community_nodes,
        }
    }

    /// Load the snapshot from the database
    pub async fn load(repo: &Repository) -> Result<Self> {
        let entities = repo.load_graph_entities().await?;
        let edges = repo.load_graph_edges().await?;
        let communities = repo.load_community_summaries().await?;

        let index = Self::from_parts(entities, edges, communities);
        tracing::info!(
            entities = index.entity_count(),
            communities = index.community_count(),
            "Knowledge graph snapshot loaded"
        );
        Ok(index)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn community_count(&self) -> usize {
        self.communities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.communities.is_empty()
    }
}

/// Graph-derived context for one query
#[derive(Debug, Clone, Default)]
pub struct GraphEnhancement {
    /// Relevant entities, best-first
    pub entities: Vec<ScoredEntity>,

    /// Relevant community summaries, best-first
    pub communities: Vec<ScoredCommunity>,

    /// Chunk ids related through the selected communities but not
    /// present in the retrieved set, best community first
    pub related_chunk_ids: Vec<i64>,
}

/// Graph retriever scoring entities and communities against retrieved chunks
pub struct GraphRetriever {
    index: Arc<GraphIndex>,
    top_entities: usize,
    top_communities: usize,
    related_chunk_cap: usize,
}

impl GraphRetriever {
    /// Create a new graph retriever over a snapshot
    pub fn new(
        index: Arc<GraphIndex>,
        top_entities: usize,
        top_communities: usize,
        related_chunk_cap: usize,
    ) -> Self {
        Self {
            index,
            top_entities,
            top_communities,
            related_chunk_cap,
        }
    }

    /// Score the graph against the retrieved chunks.
    ///
    /// An entity is relevant when its name occurs in any retrieved chunk's
    /// text (case-insensitive); its relevance is the number of edges to
    /// other relevant entities divided by the retrieved chunk count. A
    /// community is relevant when it overlaps the retrieved chunks or the
    /// relevant entities; its relevance is the combined overlap divided by
    /// (retrieved chunk count + relevant entity count).
    pub fn enhance(&self, chunks: &[RetrievedChunk]) -> GraphEnhancement {
        if chunks.is_empty() || self.index.is_empty() {
            tracing::debug!("Graph enhancement skipped (empty graph or context)");
            return GraphEnhancement::default();
        }

        let chunk_texts: Vec<String> = chunks.iter().map(|c| c.content.to_lowercase()).collect();
        let retrieved_ids: HashSet<i64> = chunks.iter().map(|c| c.chunk_id).collect();
        let chunk_count = chunks.len();

        // Entities whose name occurs in the retrieved text
        let relevant: Vec<&EntityNode> = self
            .index
            .entities
            .iter()
            .filter(|e| chunk_texts.iter().any(|t| t.contains(&e.name_lower)))
            .collect();

        let relevant_ids: HashSet<i64> = relevant.iter().map(|e| e.id).collect();
        let relevant_names: HashSet<&str> =
            relevant.iter().map(|e| e.name_lower.as_str()).collect();

        let mut entities: Vec<(i64, ScoredEntity)> = relevant
            .iter()
            .map(|e| {
                let connections = self
                    .index
                    .neighbors
                    .get(&e.id)
                    .map(|n| n.intersection(&relevant_ids).count())
                    .unwrap_or(0);
                let relevance = connections as f32 / chunk_count as f32;
                (
                    e.id,
                    ScoredEntity {
                        name: e.name.clone(),
                        entity_type: e.entity_type.clone(),
                        relevance,
                    },
                )
            })
            .collect();

        entities.sort_by(|a, b| {
            b.1.relevance
                .partial_cmp(&a.1.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        entities.truncate(self.top_entities);
        let entities: Vec<ScoredEntity> = entities.into_iter().map(|(_, e)| e).collect();

        // Communities overlapping the retrieved chunks or relevant entities
        let denominator = (chunk_count + relevant_ids.len()) as f32;
        let mut scored_communities: Vec<(&CommunityNode, ScoredCommunity)> = self
            .index
            .communities
            .iter()
            .filter_map(|c| {
                let chunk_overlap = c
                    .chunk_ids
                    .iter()
                    .filter(|id| retrieved_ids.contains(id))
                    .count();
                let entity_overlap = c
                    .entity_names_lower
                    .iter()
                    .filter(|n| relevant_names.contains(n.as_str()))
                    .count();

                if chunk_overlap == 0 && entity_overlap == 0 {
                    return None;
                }

                let relevance = (chunk_overlap + entity_overlap) as f32 / denominator;
                Some((
                    c,
                    ScoredCommunity {
                        community_id: c.community_id,
                        summary: c.summary.clone(),
                        relevance,
                    },
                ))
            })
            .collect();

        scored_communities.sort_by(|a, b| {
            b.1.relevance
                .partial_cmp(&a.1.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.community_id.cmp(&b.1.community_id))
        });
        scored_communities.truncate(self.top_communities);

        // Chunks reachable through the selected communities but missed by
        // the vector pass, best community first
        let mut related_chunk_ids = Vec::new();
        let mut seen: HashSet<i64> = retrieved_ids.clone();
        'outer: for (node, _) in &scored_communities {
            for &chunk_id in &node.chunk_ids {
                if seen.insert(chunk_id) {
                    related_chunk_ids.push(chunk_id);
                    if related_chunk_ids.len() >= self.related_chunk_cap {
                        break 'outer;
                    }
                }
            }
        }

        let communities: Vec<ScoredCommunity> =
            scored_communities.into_iter().map(|(_, c)| c).collect();

        tracing::debug!(
            entities = entities.len(),
            communities = communities.len(),
            related_chunks = related_chunk_ids.len(),
            "Graph enhancement computed"
        );

        GraphEnhancement {
            entities,
            communities,
            related_chunk_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetrievalMode;

    fn entity(id: i64, name: &str) -> GraphEntity {
        GraphEntity {
            id,
            name: name.to_string(),
            entity_type: "concept".to_string(),
            source: None,
        }
    }

    fn edge(id: i64, source: i64, target: i64) -> GraphEdge {
        GraphEdge {
            id,
            source_id: source,
            target_id: target,
            weight: 1.0,
        }
    }

    fn community(id: i64, community_id: i32, entities: &[&str], chunks: &[i64]) -> CommunitySummary {
        CommunitySummary {
            id,
            community_id,
            summary: format!("community {}", community_id),
            entities: serde_json::json!(entities),
            related_chunk_ids: serde_json::json!(chunks),
        }
    }

    fn retrieved(id: i64, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id,
            document_id: 1,
            chunk_index: 0,
            content: content.to_string(),
            source: "doc.pdf".into(),
            reference: None,
            similarity: 0.9,
            mode: RetrievalMode::Vector,
        }
    }

    fn retriever(index: GraphIndex) -> GraphRetriever {
        GraphRetriever::new(Arc::new(index), 10, 5, 5)
    }

    #[test]
    fn test_empty_graph_yields_empty_enhancement() {
        let r = retriever(GraphIndex::empty());
        let result = r.enhance(&[retrieved(1, "anything")]);
        assert!(result.entities.is_empty());
        assert!(result.communities.is_empty());
        assert!(result.related_chunk_ids.is_empty());
    }

    #[test]
    fn test_entity_relevance_counts_edges_to_relevant_entities() {
        let index = GraphIndex::from_parts(
            vec![
                entity(1, "Transformer"),
                entity(2, "Attention"),
                entity(3, "Recurrent Network"),
            ],
            vec![edge(1, 1, 2), edge(2, 1, 3)],
            vec![],
        );
        let r = retriever(index);

        let chunks = vec![
            retrieved(10, "The transformer architecture relies on attention."),
            retrieved(11, "Attention weights are computed per head."),
        ];
        let result = r.enhance(&chunks);

        // "Recurrent Network" never occurs in the text
        assert_eq!(result.entities.len(), 2);

        // Transformer and Attention each have one edge to another relevant
        // entity, over two retrieved chunks
        for e in &result.entities {
            assert!((e.relevance - 0.5).abs() < 1e-6, "{}: {}", e.name, e.relevance);
        }
        assert!(result.entities.iter().any(|e| e.name == "Transformer"));
    }

    #[test]
    fn test_entity_matching_is_case_insensitive() {
        let index = GraphIndex::from_parts(vec![entity(1, "BERT")], vec![], vec![]);
        let r = retriever(index);

        let result = r.enhance(&[retrieved(1, "we fine-tuned bert on the corpus")]);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].name, "BERT");
    }

    #[test]
    fn test_top_entities_capped() {
        let entities: Vec<GraphEntity> =
            (1..=15).map(|i| entity(i, &format!("term{}", i))).collect();
        let index = GraphIndex::from_parts(entities, vec![], vec![]);
        let r = retriever(index);

        let text = (1..=15)
            .map(|i| format!("term{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let result = r.enhance(&[retrieved(1, &text)]);
        assert_eq!(result.entities.len(), 10);
    }

    #[test]
    fn test_community_relevance_combines_overlaps() {
        let index = GraphIndex::from_parts(
            vec![entity(1, "transformer"), entity(2, "attention")],
            vec![],
            vec![
                community(1, 7, &["transformer", "attention"], &[1, 99]),
                community(2, 8, &["unrelated topic"], &[500]),
            ],
        );
        let r = retriever(index);

        let chunks = vec![
            retrieved(1, "transformer and attention explained"),
            retrieved(2, "more about attention"),
        ];
        let result = r.enhance(&chunks);

        // Community 8 overlaps nothing
        assert_eq!(result.communities.len(), 1);
        let c = &result.communities[0];
        assert_eq!(c.community_id, 7);
        // chunk overlap 1 ({1}) + entity overlap 2, over 2 chunks + 2 relevant entities
        assert!((c.relevance - 0.75).abs() < 1e-6, "{}", c.relevance);

        // Chunk 99 comes from the community, chunk 1 was already retrieved
        assert_eq!(result.related_chunk_ids, vec![99]);
    }

    #[test]
    fn test_related_chunks_capped_and_deduplicated() {
        let index = GraphIndex::from_parts(
            vec![entity(1, "alpha")],
            vec![],
            vec![
                community(1, 1, &["alpha"], &[10, 11, 12]),
                community(2, 2, &["alpha"], &[11, 13, 14, 15, 16, 17]),
            ],
        );
        let r = GraphRetriever::new(Arc::new(index), 10, 5, 4);

        let result = r.enhance(&[retrieved(1, "alpha")]);
        assert_eq!(result.related_chunk_ids.len(), 4);
        // Best community first, no duplicates
        assert_eq!(&result.related_chunk_ids[..3], &[10, 11, 12]);
        assert!(!result.related_chunk_ids.contains(&1));
    }
}
