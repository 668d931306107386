use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::profiles;
use crate::state::AppState;
use crate::summary::{daily_summary, meals_needing_recommendations, weekly_series, DailyPoint, DailySummary, DEFAULT_SERIES_DAYS};

const MAX_SERIES_DAYS: u32 = 31;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary/daily", get(daily))
        .route("/summary/weekly", get(weekly))
}

#[derive(Debug, Deserialize)]
pub struct DailyQuery {
    pub date: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub end: Option<Date>,
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyResponse {
    #[serde(flatten)]
    pub summary: DailySummary,
    /// High-GL meals of the day still waiting for advice.
    pub needs_recommendations: Vec<Uuid>,
}

#[instrument(skip(state))]
pub async fn daily(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DailyQuery>,
) -> Result<Json<DailyResponse>, AppError> {
    let date = q.date.unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let profile = profiles::load(state.profiles.as_ref(), user_id).await?;
    let meals = state.meals.list(user_id).await?;
    let pending = state.pending.pending_for_date(user_id, date);

    Ok(Json(DailyResponse {
        summary: daily_summary(&meals, date, profile.daily_budget, pending),
        needs_recommendations: meals_needing_recommendations(&meals, date)
            .into_iter()
            .map(|m| m.id)
            .collect(),
    }))
}

#[instrument(skip(state))]
pub async fn weekly(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<SeriesQuery>,
) -> Result<Json<Vec<DailyPoint>>, AppError> {
    let end = q.end.unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let days = q.days.unwrap_or(DEFAULT_SERIES_DAYS).clamp(1, MAX_SERIES_DAYS);
    let meals = state.meals.list(user_id).await?;
    Ok(Json(weekly_series(&meals, end, days)))
}

#[cfg(test)]
mod tests {
    use crate::app::build_app;
    use crate::app::tests::{bearer, body_json};
    use crate::state::AppState;
    use axum::{body::Body, http::Request, http::StatusCode, Router};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        (status, body_json(res).await)
    }

    fn assert_close(v: &Value, expected: f64) {
        let got = v.as_f64().unwrap();
        assert!((got - expected).abs() < 1e-9, "{got} != {expected}");
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri).header("authorization", token).body(Body::empty()).unwrap()
    }

    async fn log_thali(app: &Router, token: &str, timestamp: &str) -> String {
        let req = Request::post("/api/v1/meals/manual")
            .header("authorization", token)
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "name": "Thali",
                    "category": "balanced",
                    "portion": "medium",
                    "timestamp": timestamp
                })
                .to_string(),
            ))
            .unwrap();
        let (status, meal) = call(app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        meal["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn daily_summary_against_default_budget() {
        let state = AppState::fake();
        let token = bearer(&state, Uuid::new_v4());
        let app = build_app(state);
        let id = log_thali(&app, &token, "2024-03-05T13:00:00Z").await;

        let (status, day) = call(&app, get("/api/v1/summary/daily?date=2024-03-05", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(day["date"], "2024-03-05");
        assert_eq!(day["totalGl"], 33);
        assert_eq!(day["spikeCount"], 1);
        assert_eq!(day["mealCount"], 1);
        assert_eq!(day["budget"], 100);
        assert_close(&day["percentage"], 33.0);
        assert_eq!(day["remaining"], 67.0);
        assert_eq!(day["zone"], "safe");
        // One meal above 30 is enough for a crash day.
        assert_eq!(day["stability"], "Crash");
        assert_eq!(day["pendingActions"], 0);
        assert_eq!(day["needsRecommendations"], json!([id]));

        let (_, empty) = call(&app, get("/api/v1/summary/daily?date=2024-03-04", &token)).await;
        assert_eq!(empty["totalGl"], 0);
        assert_eq!(empty["stability"], "Stable");
    }

    #[tokio::test]
    async fn budget_follows_the_profile() {
        let state = AppState::fake();
        let token = bearer(&state, Uuid::new_v4());
        let app = build_app(state);
        log_thali(&app, &token, "2024-03-05T13:00:00Z").await;

        let req = Request::put("/api/v1/profile/budget")
            .header("authorization", &token)
            .header("content-type", "application/json")
            .body(Body::from(json!({ "budget": 60 }).to_string()))
            .unwrap();
        assert_eq!(call(&app, req).await.0, StatusCode::OK);

        let (_, day) = call(&app, get("/api/v1/summary/daily?date=2024-03-05", &token)).await;
        assert_eq!(day["budget"], 60);
        assert_close(&day["percentage"], 55.0);
        assert_close(&day["gaugePercentage"], 55.0);
    }

    #[tokio::test]
    async fn weekly_series_is_oldest_first() {
        let state = AppState::fake();
        let token = bearer(&state, Uuid::new_v4());
        let app = build_app(state);
        log_thali(&app, &token, "2024-03-05T13:00:00Z").await;
        log_thali(&app, &token, "2024-03-07T08:00:00Z").await;

        let (_, series) = call(&app, get("/api/v1/summary/weekly?end=2024-03-07&days=3", &token)).await;
        assert_eq!(
            series,
            json!([
                { "date": "2024-03-05", "totalGl": 33 },
                { "date": "2024-03-06", "totalGl": 0 },
                { "date": "2024-03-07", "totalGl": 33 }
            ])
        );

        let (_, default) = call(&app, get("/api/v1/summary/weekly?end=2024-03-07", &token)).await;
        assert_eq!(default.as_array().unwrap().len(), 7);
    }
}
