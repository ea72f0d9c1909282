//! Document chunk entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "document_chunks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Owning document (ingestion-side entity, referenced by id only)
    pub document_id: i64,

    /// Position of this chunk within the document
    pub chunk_index: i32,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Source document label (e.g. filename)
    #[sea_orm(column_type = "Text")]
    pub source: String,

    /// Resolvable citation string for the owning document, when known
    #[sea_orm(column_type = "Text", nullable)]
    pub reference: Option<String>,

    /// pgvector column, read back as its text form for SeaORM compatibility.
    /// Vector operations go through raw SQL.
    #[sea_orm(column_type = "Text", nullable, select_as = "text", save_as = "vector")]
    pub embedding: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse embedding from stored text format to Vec<f32>
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        self.embedding.as_ref().and_then(|s| {
            // Format: "[1.0,2.0,3.0,...]"
            let inner = s.trim_start_matches('[').trim_end_matches(']');
            inner
                .split(',')
                .map(|v| v.trim().parse::<f32>().ok())
                .collect()
        })
    }
}
