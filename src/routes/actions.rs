use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::Date;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::analysis::normalize;
use crate::auth::AuthUser;
use crate::error::{AppError, ValidationError};
use crate::gl::AddedSugar;
use crate::pending::{CancelError, ImageRef, PendingAction, TextInput};
use crate::state::AppState;
use crate::storage::meal_image_key;

const MAX_SCAN_BODY: usize = 12 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/actions/scan",
            post(start_scan).layer(DefaultBodyLimit::max(MAX_SCAN_BODY)),
        )
        .route("/actions/text", post(start_text))
        .route("/actions/refine", post(start_refine))
        .route("/actions", get(list_actions))
        .route("/actions/:id", delete(cancel_action))
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub image_b64: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub date: Option<Date>,
}

fn default_content_type() -> String {
    "image/jpeg".into()
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub context: String,
    pub added_sugar: Option<AddedSugar>,
    pub date: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    pub meal_id: Uuid,
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct Started {
    pub id: Uuid,
}

fn accepted(id: Uuid) -> (StatusCode, Json<Started>) {
    (StatusCode::ACCEPTED, Json(Started { id }))
}

/// Store the photo first so the meal can point at it, then hand it to the
/// pipeline.
#[instrument(skip(state, body), fields(content_type = %body.content_type))]
pub async fn start_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ScanRequest>,
) -> Result<(StatusCode, Json<Started>), AppError> {
    let bytes = Base64::decode_vec(body.image_b64.trim()).map_err(|_| ValidationError::InvalidImage)?;
    if bytes.is_empty() {
        return Err(ValidationError::InvalidImage.into());
    }
    let bytes = Bytes::from(bytes);

    let key = meal_image_key(user_id, &body.content_type);
    state
        .storage
        .put_object(&key, bytes.clone(), &body.content_type)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

    let id = state.pending.start_scan(
        user_id,
        ImageRef {
            key: Some(key),
            bytes,
        },
        body.date,
    )?;
    Ok(accepted(id))
}

#[instrument(skip(state, body), fields(name = %body.name))]
pub async fn start_text(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<TextRequest>,
) -> Result<(StatusCode, Json<Started>), AppError> {
    let id = state.pending.start_text_analysis(
        user_id,
        TextInput {
            name: body.name,
            description: body.description,
            context: body.context,
            added_sugar: body.added_sugar,
            date: body.date,
        },
    )?;
    Ok(accepted(id))
}

/// Re-analyse a logged meal with the user's correction. Meals logged
/// without an analysis are refined from their name and GL alone.
#[instrument(skip(state, body), fields(meal_id = %body.meal_id))]
pub async fn start_refine(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<RefineRequest>,
) -> Result<(StatusCode, Json<Started>), AppError> {
    let meal = state
        .meals
        .get(user_id, body.meal_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let previous = meal
        .analysis_result
        .clone()
        .unwrap_or_else(|| normalize(&json!({ "foodName": meal.name, "glycemicLoad": meal.gl })));

    let image = match meal.image_uri {
        Some(key) => match state.storage.get_object(&key).await {
            Ok(bytes) => Some(ImageRef { key: Some(key), bytes }),
            Err(e) => {
                warn!(error = %e, "meal image unavailable; refining from text");
                None
            }
        },
        None => None,
    };

    let id = state
        .pending
        .start_refinement(user_id, meal.id, image, previous, &body.feedback)?;
    Ok(accepted(id))
}

#[instrument(skip(state))]
pub async fn list_actions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<Vec<PendingAction>> {
    Json(state.pending.list(user_id))
}

#[instrument(skip(state))]
pub async fn cancel_action(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    match state.pending.get(id) {
        Some(action) if action.user_id == user_id => match state.pending.cancel(id) {
            Ok(()) => Ok(StatusCode::NO_CONTENT),
            Err(CancelError::NotFound) => Err(AppError::NotFound),
            Err(e @ CancelError::Saving) => Err(AppError::Conflict(e.to_string())),
        },
        _ => Err(AppError::NotFound),
    }
}
