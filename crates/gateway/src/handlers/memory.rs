//! Query memory administration handlers

use axum::{extract::State, Json};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::AppState;
use docmind_common::db::models::MemoryEntry;
use docmind_common::db::MemoryStats;
use docmind_common::errors::Result;

/// Entries listed under top accessed and recent
const SUMMARY_LIMIT: u64 = 5;

/// One memory entry as listed in the stats summaries
#[derive(Serialize)]
pub struct MemorySummaryEntry {
    pub id: i64,
    pub query: String,
    pub hit_count: i32,
    pub low_confidence: bool,
    pub created_at: DateTime<FixedOffset>,
    pub last_accessed: DateTime<FixedOffset>,
}

impl From<MemoryEntry> for MemorySummaryEntry {
    fn from(entry: MemoryEntry) -> Self {
        Self {
            id: entry.id,
            query: entry.query_text,
            hit_count: entry.hit_count,
            low_confidence: entry.low_confidence,
            created_at: entry.created_at,
            last_accessed: entry.last_accessed,
        }
    }
}

/// Memory statistics response
#[derive(Serialize)]
pub struct MemoryStatsResponse {
    #[serde(flatten)]
    pub stats: MemoryStats,
    pub top_accessed: Vec<MemorySummaryEntry>,
    pub recent: Vec<MemorySummaryEntry>,
}

/// Clear acknowledgement
#[derive(Serialize)]
pub struct ClearResponse {
    pub status: String,
    pub deleted_entries: u64,
}

/// Aggregate statistics plus the hottest and newest entries
pub async fn memory_stats(State(state): State<AppState>) -> Result<Json<MemoryStatsResponse>> {
    let stats = state.memory.stats().await?;

    let top_accessed = state
        .memory
        .most_accessed(SUMMARY_LIMIT)
        .await?
        .into_iter()
        .map(MemorySummaryEntry::from)
        .collect();

    let recent = state
        .memory
        .recent(SUMMARY_LIMIT)
        .await?
        .into_iter()
        .map(MemorySummaryEntry::from)
        .collect();

    Ok(Json(MemoryStatsResponse {
        stats,
        top_accessed,
        recent,
    }))
}

/// Drop every stored memory entry
pub async fn clear_memory(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let deleted = state.memory.clear().await?;

    tracing::info!(deleted, "Query memory cleared");

    Ok(Json(ClearResponse {
        status: "ok".to_string(),
        deleted_entries: deleted,
    }))
}
