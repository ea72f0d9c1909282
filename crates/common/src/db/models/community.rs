//! Community summary entity (read-only to this service)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "community_summaries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Stable community identifier from the graph build
    pub community_id: i32,

    #[sea_orm(column_type = "Text")]
    pub summary: String,

    /// Entity names belonging to this community: `["a", "b", ...]`
    #[sea_orm(column_type = "JsonBinary")]
    pub entities: Json,

    /// Chunk ids the community was derived from: `[1, 2, ...]`
    #[sea_orm(column_type = "JsonBinary")]
    pub related_chunk_ids: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Entity names as strings
    pub fn entity_names(&self) -> Vec<String> {
        self.entities
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Related chunk ids as i64
    pub fn chunk_ids(&self) -> Vec<i64> {
        self.related_chunk_ids
            .as_array()
            .map(|items| items.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default()
    }
}
