use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::foods::FoodItem;
use crate::gl::estimate_display_range;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/foods/search", get(search_foods))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct FoodHit {
    #[serde(flatten)]
    pub item: FoodItem,
    pub gl_range: String,
}

pub async fn search_foods(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<FoodHit>> {
    let hits = state
        .catalog
        .search(&query.q)
        .into_iter()
        .map(|item| FoodHit {
            gl_range: estimate_display_range(item.gl_median),
            item: item.clone(),
        })
        .collect();
    Json(hits)
}
