//! Retrieval evaluation and user feedback
//!
//! Judges retrieval rankings against a similarity threshold, aggregates
//! precision metrics over everything judged so far, and applies
//! tri-state feedback patches to memory entries.

use async_trait::async_trait;
use docmind_common::db::models::{
    merge_feedback, ChunkEvaluation, Feedback, FeedbackPatch, MemoryEntry, RetrievalEvaluation,
};
use docmind_common::db::{FeedbackOutcome, JudgmentRow, NewChunkEvaluation, NewJudgment, Repository};
use docmind_common::errors::{AppError, Result};
use docmind_common::metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Persistence seam for judgments, chunk evaluations, and feedback
#[async_trait]
pub trait EvalStore: Send + Sync {
    async fn insert_judgments(&self, judgments: &[NewJudgment]) -> Result<usize>;

    async fn judgment_rows(&self) -> Result<Vec<JudgmentRow>>;

    async fn judgments_for_query(&self, memory_id: i64) -> Result<Vec<RetrievalEvaluation>>;

    async fn insert_chunk_evaluation(&self, eval: &NewChunkEvaluation) -> Result<ChunkEvaluation>;

    async fn chunk_quality_counts(&self) -> Result<(i64, i64)>;

    async fn upsert_feedback(
        &self,
        memory_id: i64,
        patch: &FeedbackPatch,
    ) -> Result<FeedbackOutcome>;

    async fn get_feedback(&self, memory_id: i64) -> Result<Option<Feedback>>;

    async fn delete_feedback(&self, memory_id: i64) -> Result<bool>;

    async fn favorites(&self) -> Result<Vec<(Feedback, MemoryEntry)>>;
}

#[async_trait]
impl EvalStore for Repository {
    async fn insert_judgments(&self, judgments: &[NewJudgment]) -> Result<usize> {
        self.insert_retrieval_evaluations(judgments).await
    }

    async fn judgment_rows(&self) -> Result<Vec<JudgmentRow>> {
        self.load_judgment_rows().await
    }

    async fn judgments_for_query(&self, memory_id: i64) -> Result<Vec<RetrievalEvaluation>> {
        Repository::judgments_for_query(self, memory_id).await
    }

    async fn insert_chunk_evaluation(&self, eval: &NewChunkEvaluation) -> Result<ChunkEvaluation> {
        Repository::insert_chunk_evaluation(self, eval).await
    }

    async fn chunk_quality_counts(&self) -> Result<(i64, i64)> {
        Repository::chunk_quality_counts(self).await
    }

    async fn upsert_feedback(
        &self,
        memory_id: i64,
        patch: &FeedbackPatch,
    ) -> Result<FeedbackOutcome> {
        Repository::upsert_feedback(self, memory_id, patch).await
    }

    async fn get_feedback(&self, memory_id: i64) -> Result<Option<Feedback>> {
        Repository::get_feedback(self, memory_id).await
    }

    async fn delete_feedback(&self, memory_id: i64) -> Result<bool> {
        Repository::delete_feedback(self, memory_id).await
    }

    async fn favorites(&self) -> Result<Vec<(Feedback, MemoryEntry)>> {
        self.list_favorites().await
    }
}

/// Heuristic binary relevance judge over retrieval similarity
#[derive(Debug, Clone, Copy)]
pub struct RelevanceJudge {
    threshold: f32,
}

impl RelevanceJudge {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Judge one retrieved chunk: 1 when similarity clears the threshold
    pub fn judge(&self, similarity: f32) -> (i16, String) {
        let relevant = similarity >= self.threshold;
        let explanation = format!(
            "similarity={:.3} threshold={}",
            similarity, self.threshold
        );
        (i16::from(relevant), explanation)
    }
}

/// Aggregated precision metrics over all recorded judgments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSummary {
    /// Mean over queries of relevant/judged
    pub overall_precision: f64,

    /// Strict: relevant in top 5 divided by 5, averaged over queries
    #[serde(rename = "precision@5")]
    pub precision_at_5: f64,

    /// Strict: relevant in top 10 divided by 10, averaged over queries
    #[serde(rename = "precision@10")]
    pub precision_at_10: f64,

    pub total_judgments: usize,
}

/// Reduce judgment rows to the summary metrics.
///
/// Each query contributes equally regardless of how many chunks were
/// judged for it. Precision at k divides by k even when fewer than k
/// positions were judged. No judgments at all yields zeros.
pub fn summarize_judgments(rows: &[JudgmentRow]) -> RetrievalSummary {
    if rows.is_empty() {
        return RetrievalSummary {
            overall_precision: 0.0,
            precision_at_5: 0.0,
            precision_at_10: 0.0,
            total_judgments: 0,
        };
    }

    let mut per_query: BTreeMap<i64, Vec<&JudgmentRow>> = BTreeMap::new();
    for row in rows {
        per_query.entry(row.query_cache_id).or_default().push(row);
    }

    let queries = per_query.len() as f64;
    let mut overall_sum = 0.0;
    let mut at_5_sum = 0.0;
    let mut at_10_sum = 0.0;

    for rows in per_query.values() {
        let relevant = rows.iter().filter(|r| r.relevance_score == 1).count() as f64;
        overall_sum += relevant / rows.len() as f64;

        let relevant_top = |k: i32| {
            rows.iter()
                .filter(|r| r.rank_position <= k && r.relevance_score == 1)
                .count() as f64
        };
        at_5_sum += relevant_top(5) / 5.0;
        at_10_sum += relevant_top(10) / 10.0;
    }

    RetrievalSummary {
        overall_precision: overall_sum / queries,
        precision_at_5: at_5_sum / queries,
        precision_at_10: at_10_sum / queries,
        total_judgments: rows.len(),
    }
}

/// Chunk quality rollup for the corpus health endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkQualityReport {
    pub good: i64,
    pub total: i64,
    pub percentage: f64,
}

/// Records judgments and feedback, and serves their aggregates
pub struct EvaluationRecorder {
    store: Arc<dyn EvalStore>,
    judge: RelevanceJudge,
}

impl EvaluationRecorder {
    pub fn new(store: Arc<dyn EvalStore>, relevance_threshold: f32) -> Self {
        Self {
            store,
            judge: RelevanceJudge::new(relevance_threshold),
        }
    }

    /// Judge a ranked retrieval result and append the judgments.
    ///
    /// `ranked` is (chunk_id, similarity) in rank order. Positions already
    /// judged for this query and method are left untouched.
    pub async fn judge_ranking(
        &self,
        memory_id: i64,
        method: &str,
        ranked: &[(i64, f32)],
    ) -> Result<usize> {
        let judgments: Vec<NewJudgment> = ranked
            .iter()
            .enumerate()
            .map(|(i, &(chunk_id, similarity))| {
                let (relevance_score, explanation) = self.judge.judge(similarity);
                NewJudgment {
                    query_cache_id: memory_id,
                    chunk_id,
                    relevance_score,
                    model_score: Some(similarity as f64),
                    explanation: Some(explanation),
                    retrieval_method: method.to_string(),
                    rank_position: (i + 1) as i32,
                }
            })
            .collect();

        let inserted = self.store.insert_judgments(&judgments).await?;
        metrics::record_judgments(method, inserted);
        tracing::debug!(memory_id, method, inserted, "Recorded retrieval judgments");
        Ok(inserted)
    }

    pub async fn retrieval_summary(&self) -> Result<RetrievalSummary> {
        let rows = self.store.judgment_rows().await?;
        Ok(summarize_judgments(&rows))
    }

    pub async fn judgments_for_query(&self, memory_id: i64) -> Result<Vec<RetrievalEvaluation>> {
        self.store.judgments_for_query(memory_id).await
    }

    /// Record a single chunk quality verdict
    pub async fn record_chunk_evaluation(
        &self,
        eval: &NewChunkEvaluation,
    ) -> Result<ChunkEvaluation> {
        if !(0..=1).contains(&eval.score) {
            return Err(AppError::Validation {
                message: format!("score must be 0 or 1, got {}", eval.score),
                field: Some("score".to_string()),
            });
        }
        if eval.criterion.trim().is_empty() {
            return Err(AppError::Validation {
                message: "criterion must not be empty".to_string(),
                field: Some("criterion".to_string()),
            });
        }

        self.store.insert_chunk_evaluation(eval).await
    }

    pub async fn chunk_quality(&self) -> Result<ChunkQualityReport> {
        let (good, total) = self.store.chunk_quality_counts().await?;
        let percentage = if total > 0 {
            good as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Ok(ChunkQualityReport {
            good,
            total,
            percentage,
        })
    }

    /// Apply a feedback patch, retrying once if a concurrent writer wins
    /// the insert race.
    pub async fn apply_feedback(
        &self,
        memory_id: i64,
        patch: &FeedbackPatch,
    ) -> Result<FeedbackOutcome> {
        patch.validate()?;

        let outcome = match self.store.upsert_feedback(memory_id, patch).await {
            Ok(outcome) => outcome,
            Err(err) if is_write_conflict(&err) => {
                tracing::warn!(memory_id, error = %err, "Feedback upsert conflicted, retrying");
                self.store.upsert_feedback(memory_id, patch).await?
            }
            Err(err) => return Err(err),
        };

        let action = match &outcome {
            FeedbackOutcome::Saved(_) => "saved",
            FeedbackOutcome::Cleared => "cleared",
        };
        metrics::record_feedback(action);
        Ok(outcome)
    }

    pub async fn feedback(&self, memory_id: i64) -> Result<Option<Feedback>> {
        self.store.get_feedback(memory_id).await
    }

    /// Delete feedback for a memory entry; missing feedback is an error
    pub async fn delete_feedback(&self, memory_id: i64) -> Result<()> {
        if !self.store.delete_feedback(memory_id).await? {
            return Err(AppError::FeedbackNotFound { memory_id });
        }
        metrics::record_feedback("deleted");
        Ok(())
    }

    pub async fn favorites(&self) -> Result<Vec<(Feedback, MemoryEntry)>> {
        self.store.favorites().await
    }
}

/// Unique-violation shapes that merit one retry of the feedback upsert
fn is_write_conflict(err: &AppError) -> bool {
    match err {
        AppError::Conflict { .. } => true,
        AppError::Database(db) => {
            let text = db.to_string();
            text.contains("duplicate key") || text.contains("unique constraint")
        }
        _ => false,
    }
}

/// In-process store mirroring the repository's evaluation semantics
#[derive(Default)]
pub struct InMemoryEvalStore {
    judgments: Mutex<Vec<RetrievalEvaluation>>,
    chunk_evals: Mutex<Vec<ChunkEvaluation>>,
    feedback: Mutex<Vec<Feedback>>,
    memories: Mutex<Vec<MemoryEntry>>,
    next_id: AtomicI64,
}

impl InMemoryEvalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a memory entry that feedback may attach to
    pub fn seed_memory(&self, entry: MemoryEntry) {
        self.memories.lock().unwrap().push(entry);
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl EvalStore for InMemoryEvalStore {
    async fn insert_judgments(&self, judgments: &[NewJudgment]) -> Result<usize> {
        let mut stored = self.judgments.lock().unwrap();
        let mut inserted = 0;

        for judgment in judgments {
            let duplicate = stored.iter().any(|j| {
                j.query_cache_id == judgment.query_cache_id
                    && j.retrieval_method == judgment.retrieval_method
                    && j.rank_position == judgment.rank_position
            });
            if duplicate {
                continue;
            }

            stored.push(RetrievalEvaluation {
                id: self.next_id(),
                query_cache_id: judgment.query_cache_id,
                chunk_id: judgment.chunk_id,
                relevance_score: judgment.relevance_score,
                model_score: judgment.model_score,
                explanation: judgment.explanation.clone(),
                retrieval_method: judgment.retrieval_method.clone(),
                rank_position: judgment.rank_position,
                evaluated_at: chrono::Utc::now().into(),
            });
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn judgment_rows(&self) -> Result<Vec<JudgmentRow>> {
        let stored = self.judgments.lock().unwrap();
        Ok(stored
            .iter()
            .map(|j| JudgmentRow {
                query_cache_id: j.query_cache_id,
                relevance_score: j.relevance_score,
                rank_position: j.rank_position,
            })
            .collect())
    }

    async fn judgments_for_query(&self, memory_id: i64) -> Result<Vec<RetrievalEvaluation>> {
        let stored = self.judgments.lock().unwrap();
        let mut rows: Vec<RetrievalEvaluation> = stored
            .iter()
            .filter(|j| j.query_cache_id == memory_id)
            .cloned()
            .collect();
        rows.sort_by_key(|j| j.rank_position);
        Ok(rows)
    }

    async fn insert_chunk_evaluation(&self, eval: &NewChunkEvaluation) -> Result<ChunkEvaluation> {
        let row = ChunkEvaluation {
            id: self.next_id(),
            chunk_id: eval.chunk_id,
            criterion: eval.criterion.clone(),
            score: eval.score,
            explanation: eval.explanation.clone(),
            model_used: eval.model_used.clone(),
            created_at: chrono::Utc::now().into(),
        };
        self.chunk_evals.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn chunk_quality_counts(&self) -> Result<(i64, i64)> {
        let stored = self.chunk_evals.lock().unwrap();
        let good = stored.iter().filter(|e| e.score == 1).count() as i64;
        Ok((good, stored.len() as i64))
    }

    async fn upsert_feedback(
        &self,
        memory_id: i64,
        patch: &FeedbackPatch,
    ) -> Result<FeedbackOutcome> {
        let known = self
            .memories
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.id == memory_id);
        if !known {
            return Err(AppError::MemoryNotFound { id: memory_id });
        }

        let mut stored = self.feedback.lock().unwrap();
        let position = stored.iter().position(|f| f.query_cache_id == memory_id);
        let existing = position.map(|i| stored[i].clone());

        let merged = merge_feedback(existing.as_ref(), patch);
        let now = chrono::Utc::now().fixed_offset();

        if merged.is_empty() {
            if let Some(i) = position {
                stored.remove(i);
            }
            return Ok(FeedbackOutcome::Cleared);
        }

        let row = Feedback {
            id: existing.as_ref().map(|f| f.id).unwrap_or_else(|| self.next_id()),
            query_cache_id: memory_id,
            feedback_text: merged.feedback_text,
            rating: merged.rating,
            accuracy_rating: merged.accuracy_rating,
            comprehensiveness_rating: merged.comprehensiveness_rating,
            helpfulness_rating: merged.helpfulness_rating,
            is_favorite: merged.is_favorite,
            created_at: existing.as_ref().map(|f| f.created_at).unwrap_or(now),
            updated_at: now,
        };

        match position {
            Some(i) => stored[i] = row.clone(),
            None => stored.push(row.clone()),
        }
        Ok(FeedbackOutcome::Saved(row))
    }

    async fn get_feedback(&self, memory_id: i64) -> Result<Option<Feedback>> {
        let stored = self.feedback.lock().unwrap();
        Ok(stored.iter().find(|f| f.query_cache_id == memory_id).cloned())
    }

    async fn delete_feedback(&self, memory_id: i64) -> Result<bool> {
        let mut stored = self.feedback.lock().unwrap();
        let before = stored.len();
        stored.retain(|f| f.query_cache_id != memory_id);
        Ok(stored.len() < before)
    }

    async fn favorites(&self) -> Result<Vec<(Feedback, MemoryEntry)>> {
        let feedback = self.feedback.lock().unwrap();
        let memories = self.memories.lock().unwrap();

        let mut rows: Vec<(Feedback, MemoryEntry)> = feedback
            .iter()
            .filter(|f| f.is_favorite)
            .filter_map(|f| {
                memories
                    .iter()
                    .find(|m| m.id == f.query_cache_id)
                    .map(|m| (f.clone(), m.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.updated_at.cmp(&a.0.updated_at));
        Ok(rows)
    }
}
