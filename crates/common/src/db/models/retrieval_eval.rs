//! Retrieval relevance judgment entity
//!
//! Append-only: rows are inserted once per (query, method, rank) and never
//! updated, so historical judgments stay comparable across runs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "retrieval_evaluations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub query_cache_id: i64,

    pub chunk_id: i64,

    /// Binary relevance: 1 relevant, 0 not relevant
    pub relevance_score: i16,

    /// Optional graded score from a model-based judge
    pub model_score: Option<f64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub explanation: Option<String>,

    /// Which retrieval signal produced this ranking: vector | graph | fused
    #[sea_orm(column_type = "Text")]
    pub retrieval_method: String,

    /// 1-based rank of the chunk within the evaluated list
    pub rank_position: i32,

    pub evaluated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::memory::Entity",
        from = "Column::QueryCacheId",
        to = "super::memory::Column::Id",
        on_delete = "Cascade"
    )]
    Memory,
}

impl Related<super::memory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
