//! Query memory entity
//!
//! One row per remembered query: the answer, the ordered citation map,
//! and everything needed to reconstruct the original response shape.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "query_cache")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text")]
    pub query_text: String,

    /// SHA-256 of the lowercased, trimmed query text (unique)
    #[sea_orm(column_type = "Text")]
    pub query_hash: String,

    /// pgvector column, read back as its text form for SeaORM compatibility
    #[sea_orm(column_type = "Text", nullable, select_as = "text", save_as = "vector")]
    pub query_embedding: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub answer_text: String,

    /// Ordered citation map: `[{"index": 1, "chunk_id": 7}, ...]`
    #[sea_orm(column_type = "JsonBinary")]
    pub citations: Json,

    /// Reference list parallel to the citation map (entries may be null)
    #[sea_orm(column_type = "JsonBinary")]
    pub reference_list: Json,

    /// Scored entities from graph enhancement
    #[sea_orm(column_type = "JsonBinary")]
    pub entities: Json,

    /// Scored community summaries from graph enhancement
    #[sea_orm(column_type = "JsonBinary")]
    pub communities: Json,

    /// Set when the answer fell back to uncited low-confidence output
    pub low_confidence: bool,

    /// Times this entry answered a query after creation
    pub hit_count: i32,

    pub created_at: DateTimeWithTimeZone,

    pub last_accessed: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::feedback::Entity")]
    Feedback,
}

impl Related<super::feedback::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Feedback.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse the stored query embedding to Vec<f32>
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        self.query_embedding.as_ref().and_then(|s| {
            let inner = s.trim_start_matches('[').trim_end_matches(']');
            inner
                .split(',')
                .map(|v| v.trim().parse::<f32>().ok())
                .collect()
        })
    }
}
