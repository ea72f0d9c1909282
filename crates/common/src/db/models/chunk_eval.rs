//! Per-chunk quality evaluation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chunk_evaluations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub chunk_id: i64,

    /// What was evaluated, e.g. "chunk_quality"
    #[sea_orm(column_type = "Text")]
    pub criterion: String,

    /// Binary score: 1 pass, 0 fail
    pub score: i16,

    #[sea_orm(column_type = "Text", nullable)]
    pub explanation: Option<String>,

    /// Judge identifier (model name or heuristic tag)
    #[sea_orm(column_type = "Text", nullable)]
    pub model_used: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chunk::Entity",
        from = "Column::ChunkId",
        to = "super::chunk::Column::Id",
        on_delete = "Cascade"
    )]
    Chunk,
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunk.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
