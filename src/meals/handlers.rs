use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{BarcodeEntryRequest, DateQuery, ManualEntryRequest, MealResponse, SearchEntryRequest};
use super::entry;
use super::repo_types::{Meal, MealPatch, NewMeal};
use super::services::{confirm_added_sugar, refresh_recommendations};
use crate::analysis::NutritionalAnalysisResult;
use crate::auth::AuthUser;
use crate::error::{AppError, ValidationError};
use crate::foods::barcode::BarcodeLookup;
use crate::gl::{classify_speed, classify_stability, estimate_display_range, AddedSugar};
use crate::state::AppState;
use crate::summary::filter_by_date;

const IMAGE_URL_TTL_SECS: u64 = 3600;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/:id", get(get_meal).patch(patch_meal))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/manual", post(log_manual))
        .route("/meals/search-entry", post(log_search_entry))
        .route("/meals/barcode", post(log_barcode))
        .route("/meals/:id/recommendations", post(refresh_meal_recommendations))
        .route("/meals/:id/added-sugar", post(add_sugar))
}

async fn respond(state: &AppState, meal: Meal) -> MealResponse {
    let image_url = match &meal.image_uri {
        Some(key) => match state.storage.presign_get(key, IMAGE_URL_TTL_SECS).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, meal_id = %meal.id, "presign failed");
                None
            }
        },
        None => None,
    };
    let added_sugar_likely = meal.added_sugar.is_none()
        && meal
            .analysis_result
            .as_ref()
            .is_some_and(|a| a.suggests_added_sugar());
    MealResponse {
        gl_range: estimate_display_range(meal.gl as f64),
        added_sugar_likely,
        meal,
        image_url,
    }
}

async fn save(
    state: &AppState,
    user_id: Uuid,
    result: NutritionalAnalysisResult,
    timestamp: Option<OffsetDateTime>,
    added_sugar: Option<AddedSugar>,
) -> Result<(StatusCode, Json<MealResponse>), AppError> {
    let timestamp = timestamp.unwrap_or_else(OffsetDateTime::now_utc);
    let meal = NewMeal::from_analysis(result, timestamp, None, added_sugar);
    let meal = state.meals.create_verified(user_id, meal).await?;
    Ok((StatusCode::CREATED, Json(respond(state, meal).await)))
}

#[instrument(skip(state, body), fields(name = %body.name))]
pub async fn log_manual(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ManualEntryRequest>,
) -> Result<(StatusCode, Json<MealResponse>), AppError> {
    let result = entry::manual_analysis(&body.name, body.category, body.portion, body.added_sugar.as_ref())?;
    save(&state, user_id, result, body.timestamp, body.added_sugar).await
}

#[instrument(skip(state, body), fields(food_id = %body.food_id))]
pub async fn log_search_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SearchEntryRequest>,
) -> Result<(StatusCode, Json<MealResponse>), AppError> {
    let item = state
        .catalog
        .get(&body.food_id)
        .ok_or_else(|| ValidationError::UnknownFood(body.food_id.clone()))?;
    let result = entry::catalog_analysis(item, body.quantity, body.added_sugar.as_ref())?;
    save(&state, user_id, result, body.timestamp, body.added_sugar).await
}

#[instrument(skip(state, body))]
pub async fn log_barcode(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<BarcodeEntryRequest>,
) -> Result<(StatusCode, Json<MealResponse>), AppError> {
    let product = match (body.product, body.barcode) {
        (Some(product), _) => {
            state.products.remember(product.clone());
            product
        }
        (None, Some(barcode)) => state
            .products
            .lookup(&barcode)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?
            .ok_or(ValidationError::UnknownFood(barcode))?,
        (None, None) => {
            return Err(ValidationError::UnknownFood("no barcode or product given".into()).into())
        }
    };
    let result = entry::product_analysis(&product, body.grams, body.category)?;
    save(&state, user_id, result, body.timestamp, None).await
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DateQuery>,
) -> Result<Json<Vec<MealResponse>>, AppError> {
    let meals = state.meals.list(user_id).await?;
    let meals: Vec<Meal> = match q.date {
        Some(date) => filter_by_date(&meals, date).into_iter().cloned().collect(),
        None => meals,
    };
    let mut out = Vec::with_capacity(meals.len());
    for meal in meals {
        out.push(respond(&state, meal).await);
    }
    Ok(Json(out))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MealResponse>, AppError> {
    let meal = state.meals.get(user_id, id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(respond(&state, meal).await))
}

/// Meal that may still take a confirmed added sugar.
async fn unsweetened(state: &AppState, user_id: Uuid, id: Uuid) -> Result<Meal, AppError> {
    let meal = state.meals.get(user_id, id).await?.ok_or(AppError::NotFound)?;
    if meal.added_sugar.is_some() {
        return Err(AppError::Conflict("added sugar is already confirmed for this meal".into()));
    }
    Ok(meal)
}

/// A GL change without explicit labels re-derives them. An added sugar is
/// folded in after the other fields, as `POST /meals/:id/added-sugar` does.
#[instrument(skip(state, patch))]
pub async fn patch_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(mut patch): Json<MealPatch>,
) -> Result<Json<MealResponse>, AppError> {
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
    }
    if let Some(gl) = patch.gl {
        if gl < 0 {
            return Err(ValidationError::NotPositive { field: "gl" }.into());
        }
        patch.sugar_speed.get_or_insert(classify_speed(gl as f64));
        patch.energy_stability.get_or_insert(classify_stability(gl as f64));
    }
    let sugar = patch.added_sugar.take();
    if let Some(sugar) = &sugar {
        sugar.validate()?;
        unsweetened(&state, user_id, id).await?;
    }
    state.meals.update(user_id, id, patch).await?;
    let meal = match sugar {
        Some(sugar) => confirm_added_sugar(&state.meals, user_id, id, sugar).await?,
        None => state.meals.get(user_id, id).await?.ok_or(AppError::NotFound)?,
    };
    Ok(Json(respond(&state, meal).await))
}

/// Confirm the added sugar the analysis asked about.
#[instrument(skip(state, sugar))]
pub async fn add_sugar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(sugar): Json<AddedSugar>,
) -> Result<Json<MealResponse>, AppError> {
    sugar.validate()?;
    unsweetened(&state, user_id, id).await?;
    let meal = confirm_added_sugar(&state.meals, user_id, id, sugar).await?;
    Ok(Json(respond(&state, meal).await))
}

#[instrument(skip(state))]
pub async fn refresh_meal_recommendations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MealResponse>, AppError> {
    let meal = refresh_recommendations(&state.analysis, &state.meals, user_id, id).await?;
    Ok(Json(respond(&state, meal).await))
}

#[cfg(test)]
mod tests {
    use crate::app::build_app;
    use crate::app::tests::{bearer, body_json};
    use crate::foods::tests::item;
    use crate::foods::FoodCatalog;
    use crate::analysis::normalize;
    use crate::meals::NewMeal;
    use crate::state::AppState;
    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::json;
    use time::macros::datetime;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn post(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("authorization", token)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri).header("authorization", token).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn manual_entry_is_listed_by_date() {
        let state = AppState::fake();
        let token = bearer(&state, Uuid::new_v4());
        let app = build_app(state);

        let res = app
            .clone()
            .oneshot(post(
                "/api/v1/meals/manual",
                &token,
                json!({
                    "name": "Thali",
                    "category": "balanced",
                    "portion": "medium",
                    "timestamp": "2024-03-05T13:00:00+05:30"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let meal = body_json(res).await;
        assert_eq!(meal["gl"], 33);
        assert_eq!(meal["sugarSpeed"], "Fast");
        assert_eq!(meal["glRange"], "28-38");

        let res = app.clone().oneshot(get("/api/v1/meals?date=2024-03-05", &token)).await.unwrap();
        assert_eq!(body_json(res).await.as_array().unwrap().len(), 1);
        let res = app.oneshot(get("/api/v1/meals?date=2024-03-06", &token)).await.unwrap();
        assert!(body_json(res).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let state = AppState::fake();
        let token = bearer(&state, Uuid::new_v4());
        let res = build_app(state.clone())
            .oneshot(post(
                "/api/v1/meals/manual",
                &token,
                json!({ "name": "  ", "category": "balanced", "portion": "small" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "validation");
    }

    #[tokio::test]
    async fn search_entry_uses_catalog() {
        let catalog = FoodCatalog::new(vec![item("2", "Idli")]);
        let state = AppState::fake_with(
            Arc::new(crate::analysis::MockAnalysisProvider::new(std::time::Duration::ZERO)),
            catalog,
        );
        let token = bearer(&state, Uuid::new_v4());
        let app = build_app(state);

        let res = app
            .clone()
            .oneshot(post(
                "/api/v1/meals/search-entry",
                &token,
                json!({ "food_id": "2", "quantity": { "mode": "servings", "value": 2 } }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_json(res).await["gl"], 17);

        let res = app
            .oneshot(post(
                "/api/v1/meals/search-entry",
                &token,
                json!({ "food_id": "404", "quantity": { "mode": "grams", "value": 50 } }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn barcode_product_is_remembered() {
        let state = AppState::fake();
        let token = bearer(&state, Uuid::new_v4());
        let app = build_app(state);

        let product = json!({
            "barcode": "8901063",
            "name": "Marie",
            "nutriments": { "carbohydrates_100g": 75.0, "sugars_100g": 22.0 }
        });
        let res = app
            .clone()
            .oneshot(post(
                "/api/v1/meals/barcode",
                &token,
                json!({ "product": product, "grams": 40, "category": "heavy_sweet" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .oneshot(post(
                "/api/v1/meals/barcode",
                &token,
                json!({ "barcode": "8901063", "grams": 20, "category": "heavy_sweet" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        // 20 g -> 15 g carbs, GI 75
        assert_eq!(body_json(res).await["gl"], 11);
    }

    #[tokio::test]
    async fn patch_rederives_labels_and_other_users_see_nothing() {
        let state = AppState::fake();
        let owner = bearer(&state, Uuid::new_v4());
        let stranger = bearer(&state, Uuid::new_v4());
        let app = build_app(state);

        let res = app
            .clone()
            .oneshot(post(
                "/api/v1/meals/manual",
                &owner,
                json!({ "name": "Salad", "category": "light_snack", "portion": "small" }),
            ))
            .await
            .unwrap();
        let id = body_json(res).await["id"].as_str().unwrap().to_string();

        let req = Request::patch(format!("/api/v1/meals/{id}"))
            .header("authorization", &owner)
            .header("content-type", "application/json")
            .body(Body::from(json!({ "gl": 25 }).to_string()))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let meal = body_json(res).await;
        assert_eq!(meal["gl"], 25);
        assert_eq!(meal["sugarSpeed"], "Fast");
        assert_eq!(meal["energyStability"], "Crash");
        assert_eq!(meal["name"], "Salad");

        let res = app.oneshot(get(&format!("/api/v1/meals/{id}"), &stranger)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn requires_a_token() {
        let res = build_app(AppState::fake())
            .oneshot(Request::get("/api/v1/meals").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    fn patch(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
        Request::patch(uri)
            .header("authorization", token)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn scanned_meal_asks_for_sugar_until_confirmed() {
        let state = AppState::fake();
        let user = Uuid::new_v4();
        let token = bearer(&state, user);
        let analysis = normalize(&json!({
            "foodName": "Masala Chai",
            "glycemicLoad": 6,
            "totalAvailableCarbsGrams": 10,
            "addedSugarLikely": true
        }));
        let meal = NewMeal::from_analysis(analysis, datetime!(2024-03-05 08:00 UTC), Some("meals/chai.jpg".into()), None);
        let meal = state.meals.create(user, meal).await.unwrap();
        let app = build_app(state);

        let uri = format!("/api/v1/meals/{}", meal.id);
        let res = app.clone().oneshot(get(&uri, &token)).await.unwrap();
        let shown = body_json(res).await;
        assert_eq!(shown["addedSugarLikely"], true);
        assert_eq!(shown["gl"], 6);

        let sugar = json!({ "amount": 2, "unit": "spoon", "typeId": "white_sugar" });
        let res = app
            .clone()
            .oneshot(post(&format!("{uri}/added-sugar"), &token, sugar.clone()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let sweet = body_json(res).await;
        assert_eq!(sweet["gl"], 11);
        assert_eq!(sweet["sugarSpeed"], "Moderate");
        assert_eq!(sweet["energyStability"], "Unsteady");
        assert_eq!(sweet["analysisResult"]["glycemicLoad"], 11.2);
        assert_eq!(sweet["addedSugar"]["typeId"], "white_sugar");
        assert_eq!(sweet["addedSugarLikely"], false);
        assert_eq!(sweet["imageUrl"], "memory://meals/chai.jpg");

        // A second confirmation would count the sugar twice.
        let res = app
            .oneshot(post(&format!("{uri}/added-sugar"), &token, sugar))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn patched_sugar_is_folded_into_gl() {
        let state = AppState::fake();
        let token = bearer(&state, Uuid::new_v4());
        let app = build_app(state);

        let res = app
            .clone()
            .oneshot(post(
                "/api/v1/meals/manual",
                &token,
                json!({ "name": "Curd", "category": "light_snack", "portion": "small" }),
            ))
            .await
            .unwrap();
        let id = body_json(res).await["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/meals/{id}");

        let res = app
            .clone()
            .oneshot(patch(
                &uri,
                &token,
                json!({ "gl": 4, "addedSugar": { "amount": 2, "unit": "spoon", "typeId": "white_sugar" } }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let meal = body_json(res).await;
        // 4 + 8 g * 65 / 100
        assert_eq!(meal["gl"], 9);
        assert_eq!(meal["sugarSpeed"], "Slow");
        assert_eq!(meal["analysisResult"]["glycemicLoad"], 9.2);

        let res = app
            .clone()
            .oneshot(patch(&uri, &token, json!({ "addedSugar": { "amount": 1, "unit": "g", "typeId": "honey" } })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = app
            .oneshot(post(
                &format!("/api/v1/meals/{}/added-sugar", Uuid::new_v4()),
                &token,
                json!({ "amount": 1, "unit": "g", "typeId": "honey" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
