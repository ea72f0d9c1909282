//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.
//! pgvector operations go through raw SQL; embeddings cross the wire
//! as `[..]::vector` text literals.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use serde::{Deserialize, Serialize};

/// Result row from nearest-chunk search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: i64,
    pub document_id: i64,
    pub chunk_index: i32,
    pub content: String,
    pub source: String,
    pub reference: Option<String>,
    pub similarity: f64,
}

/// New memory entry awaiting insert
#[derive(Debug, Clone)]
pub struct NewMemoryEntry {
    pub query_text: String,
    pub query_hash: String,
    pub query_embedding: Vec<f32>,
    pub answer_text: String,
    pub citations: serde_json::Value,
    pub reference_list: serde_json::Value,
    pub entities: serde_json::Value,
    pub communities: serde_json::Value,
    pub low_confidence: bool,
}

/// Aggregate statistics over the query memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entries: i64,
    pub total_hits: i64,
    pub average_hits: f64,
    pub max_hits: i32,
    pub oldest_entry: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub newest_entry: Option<chrono::DateTime<chrono::FixedOffset>>,
}

/// New retrieval relevance judgment awaiting insert
#[derive(Debug, Clone)]
pub struct NewJudgment {
    pub query_cache_id: i64,
    pub chunk_id: i64,
    pub relevance_score: i16,
    pub model_score: Option<f64>,
    pub explanation: Option<String>,
    pub retrieval_method: String,
    pub rank_position: i32,
}

/// Minimal judgment row for precision aggregation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JudgmentRow {
    pub query_cache_id: i64,
    pub relevance_score: i16,
    pub rank_position: i32,
}

/// New chunk quality evaluation awaiting insert
#[derive(Debug, Clone)]
pub struct NewChunkEvaluation {
    pub chunk_id: i64,
    pub criterion: String,
    pub score: i16,
    pub explanation: Option<String>,
    pub model_used: Option<String>,
}

/// Outcome of a feedback patch application
#[derive(Debug, Clone)]
pub enum FeedbackOutcome {
    /// Record written (inserted or updated)
    Saved(Feedback),
    /// Patch left the record empty; any existing row was removed
    Cleared,
}

/// Format an embedding as a pgvector text literal
fn embedding_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Chunk Operations
    // ========================================================================

    /// Nearest chunks by cosine similarity, ties broken by lower chunk id.
    /// Returns at most `limit` rows; a short corpus returns what exists.
    pub async fn nearest_chunks(&self, embedding: &[f32], limit: usize) -> Result<Vec<ChunkHit>> {
        let embedding_str = embedding_literal(embedding);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                c.id,
                c.document_id,
                c.chunk_index,
                c.content,
                c.source,
                c.reference,
                1 - (c.embedding <=> $1::vector) as similarity
            FROM document_chunks c
            WHERE c.embedding IS NOT NULL
            ORDER BY c.embedding <=> $1::vector, c.id
            LIMIT $2
            "#,
            vec![embedding_str.into(), (limit as i64).into()],
        );

        let results = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(ChunkHit {
                    chunk_id: row.try_get_by_index::<i64>(0).ok()?,
                    document_id: row.try_get_by_index::<i64>(1).ok()?,
                    chunk_index: row.try_get_by_index::<i32>(2).ok()?,
                    content: row.try_get_by_index::<String>(3).ok()?,
                    source: row.try_get_by_index::<String>(4).ok()?,
                    reference: row.try_get_by_index::<Option<String>>(5).ok()?,
                    similarity: row.try_get_by_index::<f64>(6).ok()?,
                })
            })
            .collect();

        Ok(results)
    }

    /// Fetch chunks by id. Missing ids are silently absent from the result.
    pub async fn chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        ChunkEntity::find()
            .filter(ChunkColumn::Id.is_in(ids.iter().copied()))
            .order_by_asc(ChunkColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Total chunks with an embedding (readiness probe)
    pub async fn count_embedded_chunks(&self) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        ChunkEntity::find()
            .filter(ChunkColumn::Embedding.is_not_null())
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Memory Operations
    // ========================================================================

    /// Exact-match lookup on the normalized query hash
    pub async fn find_memory_exact(&self, query_hash: &str) -> Result<Option<MemoryEntry>> {
        MemoryEntity::find()
            .filter(MemoryColumn::QueryHash.eq(query_hash))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Nearest memory entry with cosine similarity at or above `threshold`
    pub async fn find_memory_similar(
        &self,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<(MemoryEntry, f32)>> {
        let embedding_str = embedding_literal(embedding);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                id,
                1 - (query_embedding <=> $1::vector) as similarity
            FROM query_cache
            WHERE query_embedding IS NOT NULL
              AND 1 - (query_embedding <=> $1::vector) >= $2
            ORDER BY query_embedding <=> $1::vector
            LIMIT 1
            "#,
            vec![embedding_str.into(), (threshold as f64).into()],
        );

        let Some(row) = self.read_conn().query_one(stmt).await? else {
            return Ok(None);
        };

        let id: i64 = row.try_get_by_index(0)?;
        let similarity: f64 = row.try_get_by_index(1)?;

        let entry = MemoryEntity::find_by_id(id)
            .one(self.read_conn())
            .await?
            .ok_or(AppError::MemoryNotFound { id })?;

        Ok(Some((entry, similarity as f32)))
    }

    /// Insert a memory entry. Returns `(id, created)`; a concurrent insert of
    /// the same query hash keeps the existing row and reports `created=false`.
    pub async fn insert_memory(&self, entry: &NewMemoryEntry) -> Result<(i64, bool)> {
        let embedding_str = embedding_literal(&entry.query_embedding);

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO query_cache (
                query_text, query_hash, query_embedding, answer_text,
                citations, reference_list, entities, communities,
                low_confidence, hit_count, created_at, last_accessed
            )
            VALUES ($1, $2, $3::vector, $4, $5, $6, $7, $8, $9, 0, NOW(), NOW())
            ON CONFLICT (query_hash) DO NOTHING
            RETURNING id
            "#,
            vec![
                entry.query_text.clone().into(),
                entry.query_hash.clone().into(),
                embedding_str.into(),
                entry.answer_text.clone().into(),
                entry.citations.clone().into(),
                entry.reference_list.clone().into(),
                entry.entities.clone().into(),
                entry.communities.clone().into(),
                entry.low_confidence.into(),
            ],
        );

        if let Some(row) = self.write_conn().query_one(stmt).await? {
            let id: i64 = row.try_get_by_index(0)?;
            return Ok((id, true));
        }

        // Lost an exact-hash race; the surviving row wins
        let existing = self
            .find_memory_exact(&entry.query_hash)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "memory insert conflicted but no row found".into(),
            })?;

        Ok((existing.id, false))
    }

    /// Bump hit count and touch last_accessed
    pub async fn record_memory_hit(&self, id: i64) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE query_cache SET hit_count = hit_count + 1, last_accessed = NOW() WHERE id = $1",
            vec![id.into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    /// Fetch a memory entry by id
    pub async fn get_memory(&self, id: i64) -> Result<Option<MemoryEntry>> {
        MemoryEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Aggregate memory statistics
    pub async fn memory_stats(&self) -> Result<MemoryStats> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            r#"
            SELECT
                COUNT(*)::bigint as total_entries,
                COALESCE(SUM(hit_count), 0)::bigint as total_hits,
                COALESCE(AVG(hit_count), 0)::float8 as average_hits,
                COALESCE(MAX(hit_count), 0)::int as max_hits,
                MIN(created_at) as oldest_entry,
                MAX(created_at) as newest_entry
            FROM query_cache
            "#
            .to_owned(),
        );

        let row = self
            .read_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "memory stats query returned no row".into(),
            })?;

        Ok(MemoryStats {
            total_entries: row.try_get_by_index(0)?,
            total_hits: row.try_get_by_index(1)?,
            average_hits: row.try_get_by_index(2)?,
            max_hits: row.try_get_by_index(3)?,
            oldest_entry: row.try_get_by_index(4)?,
            newest_entry: row.try_get_by_index(5)?,
        })
    }

    /// Most-hit memory entries
    pub async fn most_accessed_memory(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
        MemoryEntity::find()
            .order_by_desc(MemoryColumn::HitCount)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Most recently created memory entries
    pub async fn recent_memory(&self, limit: u64) -> Result<Vec<MemoryEntry>> {
        MemoryEntity::find()
            .order_by_desc(MemoryColumn::CreatedAt)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Delete every memory entry. Returns the number of rows removed.
    pub async fn clear_memory(&self) -> Result<u64> {
        let result = MemoryEntity::delete_many()
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    // ========================================================================
    // Feedback Operations
    // ========================================================================

    /// Fetch feedback for a memory entry
    pub async fn get_feedback(&self, memory_id: i64) -> Result<Option<Feedback>> {
        FeedbackEntity::find()
            .filter(FeedbackColumn::QueryCacheId.eq(memory_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Apply a feedback patch under a row lock.
    ///
    /// Reads the current row with `FOR UPDATE`, merges the patch, and writes
    /// the result back inside one transaction. A merge that empties the
    /// record deletes the row instead.
    pub async fn upsert_feedback(
        &self,
        memory_id: i64,
        patch: &FeedbackPatch,
    ) -> Result<FeedbackOutcome> {
        let txn = self.write_conn().begin().await?;

        // The memory entry must exist before feedback can attach to it
        let memory = MemoryEntity::find_by_id(memory_id).one(&txn).await?;
        if memory.is_none() {
            txn.rollback().await?;
            return Err(AppError::MemoryNotFound { id: memory_id });
        }

        let existing = FeedbackEntity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT * FROM user_feedback WHERE query_cache_id = $1 FOR UPDATE",
                vec![memory_id.into()],
            ))
            .one(&txn)
            .await?;

        let merged = merge_feedback(existing.as_ref(), patch);
        let now = chrono::Utc::now();

        let outcome = match (existing, merged.is_empty()) {
            (Some(row), true) => {
                row.delete(&txn).await?;
                FeedbackOutcome::Cleared
            }
            (None, true) => FeedbackOutcome::Cleared,
            (Some(row), false) => {
                let mut active: FeedbackActiveModel = row.into();
                apply_fields(&mut active, &merged);
                active.updated_at = Set(now.into());
                FeedbackOutcome::Saved(active.update(&txn).await?)
            }
            (None, false) => {
                let mut active = FeedbackActiveModel {
                    query_cache_id: Set(memory_id),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                    ..Default::default()
                };
                apply_fields(&mut active, &merged);
                FeedbackOutcome::Saved(active.insert(&txn).await?)
            }
        };

        txn.commit().await?;
        Ok(outcome)
    }

    /// Delete feedback for a memory entry. Returns whether a row existed.
    pub async fn delete_feedback(&self, memory_id: i64) -> Result<bool> {
        let result = FeedbackEntity::delete_many()
            .filter(FeedbackColumn::QueryCacheId.eq(memory_id))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Feedback rows marked favorite, with their query text
    pub async fn list_favorites(&self) -> Result<Vec<(Feedback, MemoryEntry)>> {
        let rows = FeedbackEntity::find()
            .filter(FeedbackColumn::IsFavorite.eq(true))
            .find_also_related(MemoryEntity)
            .order_by_desc(FeedbackColumn::UpdatedAt)
            .all(self.read_conn())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(feedback, memory)| memory.map(|m| (feedback, m)))
            .collect())
    }

    // ========================================================================
    // Evaluation Operations
    // ========================================================================

    /// Append retrieval judgments. Duplicate (query, method, rank) rows are
    /// ignored so the first judgment is never overwritten.
    pub async fn insert_retrieval_evaluations(&self, judgments: &[NewJudgment]) -> Result<usize> {
        let mut inserted = 0;

        for judgment in judgments {
            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO retrieval_evaluations (
                    query_cache_id, chunk_id, relevance_score, model_score,
                    explanation, retrieval_method, rank_position, evaluated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                ON CONFLICT (query_cache_id, retrieval_method, rank_position) DO NOTHING
                "#,
                vec![
                    judgment.query_cache_id.into(),
                    judgment.chunk_id.into(),
                    judgment.relevance_score.into(),
                    judgment.model_score.into(),
                    judgment.explanation.clone().into(),
                    judgment.retrieval_method.clone().into(),
                    judgment.rank_position.into(),
                ],
            );

            let result = self.write_conn().execute(stmt).await?;
            inserted += result.rows_affected() as usize;
        }

        Ok(inserted)
    }

    /// All judgment rows, reduced to what precision aggregation needs
    pub async fn load_judgment_rows(&self) -> Result<Vec<JudgmentRow>> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            "SELECT query_cache_id, relevance_score, rank_position FROM retrieval_evaluations"
                .to_owned(),
        );

        let rows = self
            .read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(JudgmentRow {
                    query_cache_id: row.try_get_by_index::<i64>(0).ok()?,
                    relevance_score: row.try_get_by_index::<i16>(1).ok()?,
                    rank_position: row.try_get_by_index::<i32>(2).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Full judgment rows for one query, rank ascending
    pub async fn judgments_for_query(&self, memory_id: i64) -> Result<Vec<RetrievalEvaluation>> {
        RetrievalEvalEntity::find()
            .filter(RetrievalEvalColumn::QueryCacheId.eq(memory_id))
            .order_by_asc(RetrievalEvalColumn::RankPosition)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Record a chunk quality evaluation
    pub async fn insert_chunk_evaluation(&self, eval: &NewChunkEvaluation) -> Result<ChunkEvaluation> {
        let now = chrono::Utc::now();

        let active = ChunkEvalActiveModel {
            chunk_id: Set(eval.chunk_id),
            criterion: Set(eval.criterion.clone()),
            score: Set(eval.score),
            explanation: Set(eval.explanation.clone()),
            model_used: Set(eval.model_used.clone()),
            created_at: Set(now.into()),
            ..Default::default()
        };

        active.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Pass/total counts over all chunk evaluations
    pub async fn chunk_quality_counts(&self) -> Result<(i64, i64)> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            r#"
            SELECT
                COUNT(*) FILTER (WHERE score = 1) as good,
                COUNT(*) as total
            FROM chunk_evaluations
            "#
            .to_owned(),
        );

        let row = self
            .read_conn()
            .query_one(stmt)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "chunk quality query returned no row".into(),
            })?;

        Ok((row.try_get_by_index(0)?, row.try_get_by_index(1)?))
    }

    // ========================================================================
    // Graph Store (read-only)
    // ========================================================================

    /// Load all graph entity nodes
    pub async fn load_graph_entities(&self) -> Result<Vec<GraphEntity>> {
        GraphEntityEntity::find()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Load all graph edges
    pub async fn load_graph_edges(&self) -> Result<Vec<GraphEdge>> {
        GraphEdgeEntity::find()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Load all community summaries
    pub async fn load_community_summaries(&self) -> Result<Vec<CommunitySummary>> {
        CommunityEntity::find()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

/// Copy merged field values into an active model
fn apply_fields(active: &mut FeedbackActiveModel, fields: &FeedbackFields) {
    active.feedback_text = Set(fields.feedback_text.clone());
    active.rating = Set(fields.rating);
    active.accuracy_rating = Set(fields.accuracy_rating);
    active.comprehensiveness_rating = Set(fields.comprehensiveness_rating);
    active.helpfulness_rating = Set(fields.helpfulness_rating);
    active.is_favorite = Set(fields.is_favorite);
}
