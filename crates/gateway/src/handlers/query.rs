//! Query pipeline handler

use axum::{extract::State, Json};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use docmind_common::errors::{AppError, Result};
use docmind_engine::{QueryRequest, QueryResponse};

/// Run the full query pipeline for one question
pub async fn run_query(
    State(state): State<AppState>,
    Json(mut request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    // A globally disabled memory overrides the per-request flag
    if !state.config.memory.enabled {
        request.use_memory = false;
    }

    let response = state.engine.process_query(request).await?;

    tracing::info!(
        query = %response.query,
        from_memory = response.from_memory,
        memory_id = ?response.memory_id,
        chunks = response.chunks.len(),
        low_confidence = response.low_confidence,
        latency_ms = start.elapsed().as_millis() as u64,
        "Query completed"
    );

    Ok(Json(response))
}
