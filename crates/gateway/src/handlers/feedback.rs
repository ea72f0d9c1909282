//! Feedback handlers
//!
//! `POST /api/feedback` carries a tri-state patch: an absent field is left
//! untouched, an explicit `null` clears it, a value sets it. The wire shape
//! keeps the distinction with a double `Option` so a single request can mix
//! sets and clears.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::AppState;
use docmind_common::db::models::{Feedback, FeedbackPatch};
use docmind_common::db::FeedbackOutcome;
use docmind_common::errors::{AppError, Result};

/// Deserialize a field that must distinguish `null` from absent.
///
/// Combined with `#[serde(default)]`: absent stays `None`, `null` becomes
/// `Some(None)`, a value becomes `Some(Some(v))`.
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Feedback patch request
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub memory_id: i64,

    #[serde(default, deserialize_with = "double_option")]
    pub feedback_text: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub rating: Option<Option<i16>>,

    #[serde(default, deserialize_with = "double_option")]
    pub accuracy_rating: Option<Option<i16>>,

    #[serde(default, deserialize_with = "double_option")]
    pub comprehensiveness_rating: Option<Option<i16>>,

    #[serde(default, deserialize_with = "double_option")]
    pub helpfulness_rating: Option<Option<i16>>,

    #[serde(default)]
    pub is_favorite: Option<bool>,
}

impl FeedbackRequest {
    fn into_patch(self) -> FeedbackPatch {
        FeedbackPatch {
            feedback_text: self.feedback_text,
            rating: self.rating,
            accuracy_rating: self.accuracy_rating,
            comprehensiveness_rating: self.comprehensiveness_rating,
            helpfulness_rating: self.helpfulness_rating,
            is_favorite: self.is_favorite,
        }
    }
}

/// Feedback acknowledgement
#[derive(Serialize)]
pub struct FeedbackAck {
    pub status: String,
    pub message: String,
}

/// Feedback lookup response
#[derive(Serialize)]
pub struct FeedbackEnvelope {
    pub status: String,
    pub feedback: Feedback,
}

/// One favorited answer with its feedback record
#[derive(Serialize)]
pub struct FavoriteEntry {
    pub memory_id: i64,
    pub query: String,
    pub answer: String,
    pub feedback: Feedback,
}

/// Favorites listing response
#[derive(Serialize)]
pub struct FavoritesResponse {
    pub status: String,
    pub favorites: Vec<FavoriteEntry>,
}

/// Apply a feedback patch to a memory entry
pub async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackAck>> {
    let memory_id = request.memory_id;
    let patch = request.into_patch();

    if patch.is_noop() {
        return Err(AppError::Validation {
            message: "Feedback request carries no fields".to_string(),
            field: None,
        });
    }

    let outcome = state.recorder.apply_feedback(memory_id, &patch).await?;

    let message = match outcome {
        FeedbackOutcome::Saved(_) => "Feedback saved",
        FeedbackOutcome::Cleared => "Feedback cleared",
    };

    tracing::info!(memory_id, outcome = message, "Feedback applied");

    Ok(Json(FeedbackAck {
        status: "ok".to_string(),
        message: message.to_string(),
    }))
}

/// Fetch the feedback record for a memory entry
pub async fn get_feedback(
    State(state): State<AppState>,
    Path(memory_id): Path<i64>,
) -> Result<Json<FeedbackEnvelope>> {
    let feedback = state
        .recorder
        .feedback(memory_id)
        .await?
        .ok_or(AppError::FeedbackNotFound { memory_id })?;

    Ok(Json(FeedbackEnvelope {
        status: "ok".to_string(),
        feedback,
    }))
}

/// Delete the feedback record for a memory entry
pub async fn remove_feedback(
    State(state): State<AppState>,
    Path(memory_id): Path<i64>,
) -> Result<Json<FeedbackAck>> {
    state.recorder.delete_feedback(memory_id).await?;

    Ok(Json(FeedbackAck {
        status: "ok".to_string(),
        message: format!("Feedback for memory entry {} deleted", memory_id),
    }))
}

/// List all favorited answers
pub async fn list_favorites(State(state): State<AppState>) -> Result<Json<FavoritesResponse>> {
    let favorites = state
        .recorder
        .favorites()
        .await?
        .into_iter()
        .map(|(feedback, entry)| FavoriteEntry {
            memory_id: entry.id,
            query: entry.query_text,
            answer: entry.answer_text,
            feedback,
        })
        .collect();

    Ok(Json(FavoritesResponse {
        status: "ok".to_string(),
        favorites,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_stay_untouched() {
        let request: FeedbackRequest =
            serde_json::from_value(serde_json::json!({"memory_id": 7, "rating": 4})).unwrap();

        let patch = request.into_patch();
        assert_eq!(patch.rating, Some(Some(4)));
        assert_eq!(patch.feedback_text, None);
        assert_eq!(patch.is_favorite, None);
    }

    #[test]
    fn explicit_null_clears_a_field() {
        let request: FeedbackRequest = serde_json::from_value(serde_json::json!({
            "memory_id": 7,
            "rating": null,
            "feedback_text": "solid answer"
        }))
        .unwrap();

        let patch = request.into_patch();
        assert_eq!(patch.rating, Some(None));
        assert_eq!(patch.feedback_text, Some(Some("solid answer".to_string())));
    }

    #[test]
    fn empty_body_is_a_noop_patch() {
        let request: FeedbackRequest =
            serde_json::from_value(serde_json::json!({"memory_id": 7})).unwrap();

        assert!(request.into_patch().is_noop());
    }

    #[test]
    fn mixed_set_and_clear_round_trips() {
        let request: FeedbackRequest = serde_json::from_value(serde_json::json!({
            "memory_id": 3,
            "accuracy_rating": 5,
            "helpfulness_rating": null,
            "is_favorite": true
        }))
        .unwrap();

        let patch = request.into_patch();
        assert_eq!(patch.accuracy_rating, Some(Some(5)));
        assert_eq!(patch.helpfulness_rating, Some(None));
        assert_eq!(patch.is_favorite, Some(true));
        assert_eq!(patch.comprehensiveness_rating, None);
    }
}
