use axum::{extract::State, routing::get, routing::put, Json, Router};
use serde::Deserialize;
use tracing::instrument;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::profiles::{self, Profile, UserGoal};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/profile/goal", put(put_goal))
        .route("/profile/budget", put(put_budget))
}

#[derive(Debug, Deserialize)]
pub struct GoalRequest {
    pub goal: UserGoal,
}

#[derive(Debug, Deserialize)]
pub struct BudgetRequest {
    pub budget: i64,
}

pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(profiles::load(state.profiles.as_ref(), user_id).await?))
}

#[instrument(skip(state))]
pub async fn put_goal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<GoalRequest>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(profiles::set_goal(state.profiles.as_ref(), user_id, body.goal).await?))
}

#[instrument(skip(state))]
pub async fn put_budget(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<BudgetRequest>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(profiles::set_budget(state.profiles.as_ref(), user_id, body.budget).await?))
}
