//! Retrieval evaluation handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::AppState;
use docmind_common::db::models::RetrievalEvaluation;
use docmind_common::errors::{AppError, Result};
use docmind_engine::{ChunkQualityReport, RetrievalSummary};

/// Precision rollup over all recorded judgments
pub async fn retrieval_summary(State(state): State<AppState>) -> Result<Json<RetrievalSummary>> {
    let summary = state.recorder.retrieval_summary().await?;
    Ok(Json(summary))
}

/// Judgment rows for one memory entry
pub async fn query_judgments(
    State(state): State<AppState>,
    Path(memory_id): Path<i64>,
) -> Result<Json<Vec<RetrievalEvaluation>>> {
    if state.memory.get(memory_id).await?.is_none() {
        return Err(AppError::MemoryNotFound { id: memory_id });
    }

    let judgments = state.recorder.judgments_for_query(memory_id).await?;
    Ok(Json(judgments))
}

/// Chunk quality rollup over all chunk evaluations
pub async fn chunk_quality_summary(
    State(state): State<AppState>,
) -> Result<Json<ChunkQualityReport>> {
    let report = state.recorder.chunk_quality().await?;
    Ok(Json(report))
}
