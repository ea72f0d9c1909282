//! Query memory
//!
//! Semantic answer cache: a remembered query answers later queries that are
//! textually identical (normalized hash) or semantically close (embedding
//! similarity above a configured threshold). Read and write failures
//! degrade to uncached behavior; they never fail a query.

use async_trait::async_trait;
use chrono::Utc;
use docmind_common::db::models::MemoryEntry;
use docmind_common::db::{MemoryStats, NewMemoryEntry, Repository};
use docmind_common::embeddings::cosine_similarity;
use docmind_common::errors::Result;
use docmind_common::metrics;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Semantic fingerprint of a query: SHA-256 of the lowercased, trimmed text
pub fn query_fingerprint(query: &str) -> String {
    use sha2::{Digest, Sha256};

    let normalized = query.trim().to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Persistence operations behind the query memory
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Entry whose normalized-text hash matches exactly
    async fn find_exact(&self, query_hash: &str) -> Result<Option<MemoryEntry>>;

    /// Nearest stored entry with similarity >= threshold
    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<(MemoryEntry, f32)>>;

    /// Insert a new entry; duplicate hashes keep the first entry.
    /// Returns (entry id, whether this call created it).
    async fn insert(&self, entry: &NewMemoryEntry) -> Result<(i64, bool)>;

    /// Increment hit count and touch last access time
    async fn record_hit(&self, id: i64) -> Result<()>;

    async fn get(&self, id: i64) -> Result<Option<MemoryEntry>>;

    async fn stats(&self) -> Result<MemoryStats>;

    async fn most_accessed(&self, limit: u64) -> Result<Vec<MemoryEntry>>;

    async fn recent(&self, limit: u64) -> Result<Vec<MemoryEntry>>;

    /// Delete every entry, returning how many were removed
    async fn clear(&self) -> Result<u64>;
}

#[async_trait]
impl MemoryStore for Repository {
    async fn find_exact(&self, query_hash: &str) -> Result<Option<MemoryEntry>> {
        self.find_memory_exact(query_hash).await
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<(MemoryEntry, f32)>> {
        self.find_memory_similar(embedding, threshold).await
    }

    async fn insert(&self, entry: &NewMemoryEntry) -> Result<(i64, bool)> {
        self.insert_memory(entry).await
    }

    async fn record_hit(&self, id: i64) -> Result<()> {
        self.record_memory_hit(id).await
    }

    async fn get(&self, id: i64) -> Result<Option<MemoryEntry>> {
        self.get_memory(id).await
    }

    async fn stats(&self) -> Result<MemoryStats> {
        self.memory_stats().await
    }

    async fn most_accessed(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
        self.most_accessed_memory(limit).await
    }

    async fn recent(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
        self.recent_memory(limit).await
    }

    async fn clear(&self) -> Result<u64> {
        self.clear_memory().await
    }
}

/// In-memory store for development and tests
#[derive(Default)]
pub struct InMemoryMemoryStore {
    entries: Mutex<Vec<MemoryEntry>>,
    next_id: AtomicI64,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry_from_new(id: i64, e: &NewMemoryEntry) -> MemoryEntry {
        let now = Utc::now().fixed_offset();
        let embedding_text = format!(
            "[{}]",
            e.query_embedding
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        MemoryEntry {
            id,
            query_text: e.query_text.clone(),
            query_hash: e.query_hash.clone(),
            query_embedding: Some(embedding_text),
            answer_text: e.answer_text.clone(),
            citations: e.citations.clone(),
            reference_list: e.reference_list.clone(),
            entities: e.entities.clone(),
            communities: e.communities.clone(),
            low_confidence: e.low_confidence,
            hit_count: 0,
            created_at: now,
            last_accessed: now,
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn find_exact(&self, query_hash: &str) -> Result<Option<MemoryEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().find(|e| e.query_hash == query_hash).cloned())
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<(MemoryEntry, f32)>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let mut best: Option<(MemoryEntry, f32)> = None;
        for entry in entries.iter() {
            let Some(stored) = entry.parse_embedding() else {
                continue;
            };
            let similarity = cosine_similarity(&stored, embedding);
            if similarity >= threshold
                && best.as_ref().map(|(_, s)| similarity > *s).unwrap_or(true)
            {
                best = Some((entry.clone(), similarity));
            }
        }

        Ok(best)
    }

    async fn insert(&self, entry: &NewMemoryEntry) -> Result<(i64, bool)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = entries.iter().find(|e| e.query_hash == entry.query_hash) {
            return Ok((existing.id, false));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        entries.push(Self::entry_from_new(id, entry));
        Ok((id, true))
    }

    async fn record_hit(&self, id: i64) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.hit_count += 1;
            entry.last_accessed = Utc::now().fixed_offset();
        }
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<MemoryEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn stats(&self) -> Result<MemoryStats> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let total_entries = entries.len() as i64;
        let total_hits: i64 = entries.iter().map(|e| e.hit_count as i64).sum();
        let average_hits = if total_entries > 0 {
            total_hits as f64 / total_entries as f64
        } else {
            0.0
        };

        Ok(MemoryStats {
            total_entries,
            total_hits,
            average_hits,
            max_hits: entries.iter().map(|e| e.hit_count).max().unwrap_or(0),
            oldest_entry: entries.iter().map(|e| e.created_at).min(),
            newest_entry: entries.iter().map(|e| e.created_at).max(),
        })
    }

    async fn most_accessed(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut sorted: Vec<MemoryEntry> = entries.clone();
        sorted.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));
        sorted.truncate(limit as usize);
        Ok(sorted)
    }

    async fn recent(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut sorted: Vec<MemoryEntry> = entries.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted.truncate(limit as usize);
        Ok(sorted)
    }

    async fn clear(&self) -> Result<u64> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }
}

/// How a lookup matched
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookupKind {
    /// Normalized query text was identical
    Exact,
    /// Embedding similarity above the threshold
    Similar(f32),
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Exact => "exact_hit",
            LookupKind::Similar(_) => "similar_hit",
        }
    }
}

/// A memory hit: the stored entry and how it matched
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub entry: MemoryEntry,
    pub kind: LookupKind,
}

/// The query memory service
pub struct QueryMemory {
    store: Arc<dyn MemoryStore>,
    threshold: f32,
}

impl QueryMemory {
    pub fn new(store: Arc<dyn MemoryStore>, threshold: f32) -> Self {
        Self { store, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Look up a remembered answer for this query.
    ///
    /// Exact hash match wins over embedding similarity. Store failures
    /// degrade to a miss so the caller falls through to full retrieval.
    pub async fn lookup(&self, query: &str, embedding: &[f32]) -> Option<MemoryHit> {
        let hash = query_fingerprint(query);

        match self.store.find_exact(&hash).await {
            Ok(Some(entry)) => {
                self.bump(entry.id).await;
                metrics::record_memory_lookup("exact_hit");
                return Some(MemoryHit {
                    entry,
                    kind: LookupKind::Exact,
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Memory lookup failed, degrading to uncached");
                metrics::record_memory_lookup("error");
                return None;
            }
        }

        match self.store.find_similar(embedding, self.threshold).await {
            Ok(Some((entry, similarity))) => {
                self.bump(entry.id).await;
                metrics::record_memory_lookup("similar_hit");
                Some(MemoryHit {
                    entry,
                    kind: LookupKind::Similar(similarity),
                })
            }
            Ok(None) => {
                metrics::record_memory_lookup("miss");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Memory lookup failed, degrading to uncached");
                metrics::record_memory_lookup("error");
                None
            }
        }
    }

    async fn bump(&self, id: i64) {
        if let Err(e) = self.store.record_hit(id).await {
            tracing::warn!(memory_id = id, error = %e, "Failed to record memory hit");
        }
    }

    /// Record a hit against a known entry id (admission followers)
    pub async fn record_hit(&self, id: i64) {
        self.bump(id).await;
    }

    /// Persist a new entry. Returns (id, created) or None when storage
    /// failed; failure degrades the response, never the query.
    pub async fn store_entry(&self, entry: &NewMemoryEntry) -> Option<(i64, bool)> {
        match self.store.insert(entry).await {
            Ok((id, created)) => {
                metrics::record_memory_store(created);
                Some((id, created))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to store memory entry, returning uncached");
                None
            }
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<MemoryEntry>> {
        self.store.get(id).await
    }

    pub async fn stats(&self) -> Result<MemoryStats> {
        self.store.stats().await
    }

    pub async fn most_accessed(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
        self.store.most_accessed(limit).await
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
        self.store.recent(limit).await
    }

    pub async fn clear(&self) -> Result<u64> {
        self.store.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(query: &str, embedding: Vec<f32>) -> NewMemoryEntry {
        NewMemoryEntry {
            query_text: query.to_string(),
            query_hash: query_fingerprint(query),
            query_embedding: embedding,
            answer_text: format!("answer to {}", query),
            citations: serde_json::json!([{"index": 1, "chunk_id": 7}]),
            reference_list: serde_json::json!(["doc.pdf"]),
            entities: serde_json::json!([]),
            communities: serde_json::json!([]),
            low_confidence: false,
        }
    }

    #[test]
    fn test_fingerprint_normalizes_case_and_whitespace() {
        assert_eq!(
            query_fingerprint("What is Attention?"),
            query_fingerprint("  what is attention?  ")
        );
        assert_ne!(
            query_fingerprint("what is attention?"),
            query_fingerprint("what is bert?")
        );
    }

    #[tokio::test]
    async fn test_exact_hit_bumps_hit_count() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let memory = QueryMemory::new(store.clone(), 0.95);

        store.insert(&new_entry("what is attention?", vec![1.0, 0.0])).await.unwrap();

        let hit = memory.lookup("What is Attention?", &[0.0, 1.0]).await.unwrap();
        assert_eq!(hit.kind, LookupKind::Exact);

        let stored = store.get(hit.entry.id).await.unwrap().unwrap();
        assert_eq!(stored.hit_count, 1);
    }

    #[tokio::test]
    async fn test_similar_hit_requires_threshold() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let memory = QueryMemory::new(store.clone(), 0.95);

        store.insert(&new_entry("what is attention?", vec![1.0, 0.0])).await.unwrap();

        // Orthogonal embedding, different text: miss
        assert!(memory.lookup("unrelated", &[0.0, 1.0]).await.is_none());

        // Nearly identical embedding: similar hit
        let hit = memory.lookup("explain attention", &[0.999, 0.001]).await.unwrap();
        match hit.kind {
            LookupKind::Similar(s) => assert!(s >= 0.95),
            other => panic!("expected similar hit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_first_entry() {
        let store = InMemoryMemoryStore::new();

        let (first_id, created) = store.insert(&new_entry("q", vec![1.0])).await.unwrap();
        assert!(created);

        let (second_id, created) = store.insert(&new_entry("q", vec![1.0])).await.unwrap();
        assert!(!created);
        assert_eq!(first_id, second_id);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_none() {
        struct FailingStore;

        #[async_trait]
        impl MemoryStore for FailingStore {
            async fn find_exact(&self, _: &str) -> Result<Option<MemoryEntry>> {
                Err(docmind_common::errors::AppError::DatabaseConnection {
                    message: "down".into(),
                })
            }
            async fn find_similar(
                &self,
                _: &[f32],
                _: f32,
            ) -> Result<Option<(MemoryEntry, f32)>> {
                Err(docmind_common::errors::AppError::DatabaseConnection {
                    message: "down".into(),
                })
            }
            async fn insert(&self, _: &NewMemoryEntry) -> Result<(i64, bool)> {
                Err(docmind_common::errors::AppError::DatabaseConnection {
                    message: "down".into(),
                })
            }
            async fn record_hit(&self, _: i64) -> Result<()> {
                Ok(())
            }
            async fn get(&self, _: i64) -> Result<Option<MemoryEntry>> {
                Ok(None)
            }
            async fn stats(&self) -> Result<MemoryStats> {
                unimplemented!()
            }
            async fn most_accessed(&self, _: u64) -> Result<Vec<MemoryEntry>> {
                Ok(Vec::new())
            }
            async fn recent(&self, _: u64) -> Result<Vec<MemoryEntry>> {
                Ok(Vec::new())
            }
            async fn clear(&self) -> Result<u64> {
                Ok(0)
            }
        }

        let memory = QueryMemory::new(Arc::new(FailingStore), 0.95);
        assert!(memory.lookup("q", &[1.0]).await.is_none());
        assert!(memory.store_entry(&new_entry("q", vec![1.0])).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_reports_removed_count() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let memory = QueryMemory::new(store.clone(), 0.95);

        store.insert(&new_entry("a", vec![1.0])).await.unwrap();
        store.insert(&new_entry("b", vec![0.5])).await.unwrap();

        assert_eq!(memory.clear().await.unwrap(), 2);
        assert_eq!(memory.stats().await.unwrap().total_entries, 0);
    }
}
