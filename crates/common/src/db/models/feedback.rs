//! User feedback entity and patch semantics
//!
//! At most one row per memory entry. A row with no text, no ratings, and
//! favorite off is never kept; clearing the last field deletes the row.
//!
//! Updates are tri-state patches: an absent field is untouched, an explicit
//! null clears the field, a value sets it.

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_feedback")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique)]
    pub query_cache_id: i64,

    #[sea_orm(column_type = "Text", nullable)]
    pub feedback_text: Option<String>,

    /// Overall rating, 1..=5
    pub rating: Option<i16>,

    pub accuracy_rating: Option<i16>,

    pub comprehensiveness_rating: Option<i16>,

    pub helpfulness_rating: Option<i16>,

    pub is_favorite: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
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

impl Model {
    /// True when every user-settable field is absent/off
    pub fn is_empty(&self) -> bool {
        self.feedback_text.is_none()
            && self.rating.is_none()
            && self.accuracy_rating.is_none()
            && self.comprehensiveness_rating.is_none()
            && self.helpfulness_rating.is_none()
            && !self.is_favorite
    }
}

/// Tri-state feedback patch.
///
/// Outer `None` = field untouched; `Some(None)` = clear; `Some(Some(v))` = set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackPatch {
    pub feedback_text: Option<Option<String>>,
    pub rating: Option<Option<i16>>,
    pub accuracy_rating: Option<Option<i16>>,
    pub comprehensiveness_rating: Option<Option<i16>>,
    pub helpfulness_rating: Option<Option<i16>>,
    pub is_favorite: Option<bool>,
}

impl FeedbackPatch {
    /// A patch that touches nothing
    pub fn is_noop(&self) -> bool {
        self.feedback_text.is_none()
            && self.rating.is_none()
            && self.accuracy_rating.is_none()
            && self.comprehensiveness_rating.is_none()
            && self.helpfulness_rating.is_none()
            && self.is_favorite.is_none()
    }

    /// Ratings must be 1..=5 when set
    pub fn validate(&self) -> crate::errors::Result<()> {
        for (field, value) in [
            ("rating", &self.rating),
            ("accuracy_rating", &self.accuracy_rating),
            ("comprehensiveness_rating", &self.comprehensiveness_rating),
            ("helpfulness_rating", &self.helpfulness_rating),
        ] {
            if let Some(Some(r)) = value {
                if !(1..=5).contains(r) {
                    return Err(AppError::Validation {
                        message: format!("{} must be between 1 and 5, got {}", field, r),
                        field: Some(field.to_string()),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Feedback field values after a patch has been applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackFields {
    pub feedback_text: Option<String>,
    pub rating: Option<i16>,
    pub accuracy_rating: Option<i16>,
    pub comprehensiveness_rating: Option<i16>,
    pub helpfulness_rating: Option<i16>,
    pub is_favorite: bool,
}

impl FeedbackFields {
    /// True when the merged record carries nothing worth keeping
    pub fn is_empty(&self) -> bool {
        self.feedback_text.is_none()
            && self.rating.is_none()
            && self.accuracy_rating.is_none()
            && self.comprehensiveness_rating.is_none()
            && self.helpfulness_rating.is_none()
            && !self.is_favorite
    }
}

fn patched<T: Clone>(current: Option<T>, patch: &Option<Option<T>>) -> Option<T> {
    match patch {
        None => current,
        Some(None) => None,
        Some(Some(v)) => Some(v.clone()),
    }
}

/// Merge a patch over the existing record (or a blank one)
pub fn merge_feedback(existing: Option<&Model>, patch: &FeedbackPatch) -> FeedbackFields {
    let base = existing.map(|row| FeedbackFields {
        feedback_text: row.feedback_text.clone(),
        rating: row.rating,
        accuracy_rating: row.accuracy_rating,
        comprehensiveness_rating: row.comprehensiveness_rating,
        helpfulness_rating: row.helpfulness_rating,
        is_favorite: row.is_favorite,
    });
    let base = base.unwrap_or_default();

    FeedbackFields {
        feedback_text: patched(base.feedback_text, &patch.feedback_text),
        rating: patched(base.rating, &patch.rating),
        accuracy_rating: patched(base.accuracy_rating, &patch.accuracy_rating),
        comprehensiveness_rating: patched(
            base.comprehensiveness_rating,
            &patch.comprehensiveness_rating,
        ),
        helpfulness_rating: patched(base.helpfulness_rating, &patch.helpfulness_rating),
        is_favorite: patch.is_favorite.unwrap_or(base.is_favorite),
    }
}
