use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Meal, MealPatch, MealRow, NewMeal};
use crate::error::RepoError;

/// Durable `meals` collection, keyed by owning user.
#[async_trait]
pub trait MealStore: Send + Sync {
    async fn insert(&self, user_id: Uuid, meal: NewMeal) -> Result<Meal, RepoError>;
    async fn update(&self, user_id: Uuid, id: Uuid, patch: MealPatch) -> Result<(), RepoError>;
    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Meal>, RepoError>;
    /// Newest meal first.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Meal>, RepoError>;
}

const MEAL_COLUMNS: &str = "id, user_id, name, gl, sugar_speed, energy_stability, eaten_at, \
                            eaten_offset_secs, image_uri, analysis_result, added_sugar, created_at";

#[derive(Clone)]
pub struct PgMealStore {
    db: PgPool,
}

impl PgMealStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MealStore for PgMealStore {
    async fn insert(&self, user_id: Uuid, meal: NewMeal) -> Result<Meal, RepoError> {
        let row = sqlx::query_as::<_, MealRow>(&format!(
            r#"
            INSERT INTO meals (id, user_id, name, gl, sugar_speed, energy_stability, eaten_at,
                               eaten_offset_secs, image_uri, analysis_result, added_sugar)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MEAL_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&meal.name)
        .bind(meal.gl)
        .bind(meal.sugar_speed.as_str())
        .bind(meal.energy_stability.as_str())
        .bind(meal.timestamp)
        .bind(meal.timestamp.offset().whole_seconds())
        .bind(&meal.image_uri)
        .bind(meal.analysis_result.map(Json))
        .bind(meal.added_sugar.map(Json))
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn update(&self, user_id: Uuid, id: Uuid, patch: MealPatch) -> Result<(), RepoError> {
        let res = sqlx::query(
            r#"
            UPDATE meals SET
                name             = COALESCE($3, name),
                gl               = COALESCE($4, gl),
                sugar_speed      = COALESCE($5, sugar_speed),
                energy_stability = COALESCE($6, energy_stability),
                eaten_at         = COALESCE($7, eaten_at),
                eaten_offset_secs = COALESCE($8, eaten_offset_secs),
                image_uri        = COALESCE($9, image_uri),
                analysis_result  = COALESCE($10, analysis_result),
                added_sugar      = COALESCE($11, added_sugar)
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(patch.name)
        .bind(patch.gl)
        .bind(patch.sugar_speed.map(|s| s.as_str()))
        .bind(patch.energy_stability.map(|s| s.as_str()))
        .bind(patch.timestamp)
        .bind(patch.timestamp.map(|t| t.offset().whole_seconds()))
        .bind(patch.image_uri)
        .bind(patch.analysis_result.map(Json))
        .bind(patch.added_sugar.map(Json))
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Meal>, RepoError> {
        let row = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Meal::from))
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Meal>, RepoError> {
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE user_id = $1 ORDER BY eaten_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Meal::from).collect())
    }
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemoryMealStore {
    meals: Mutex<Vec<Meal>>,
}

impl MemoryMealStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MealStore for MemoryMealStore {
    async fn insert(&self, user_id: Uuid, meal: NewMeal) -> Result<Meal, RepoError> {
        let meal = meal.into_meal(Uuid::new_v4(), user_id, OffsetDateTime::now_utc());
        self.meals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(meal.clone());
        Ok(meal)
    }

    async fn update(&self, user_id: Uuid, id: Uuid, patch: MealPatch) -> Result<(), RepoError> {
        let mut meals = self.meals.lock().unwrap_or_else(PoisonError::into_inner);
        let meal = meals
            .iter_mut()
            .find(|m| m.id == id && m.user_id == user_id)
            .ok_or(RepoError::NotFound(id))?;
        meal.apply(patch);
        Ok(())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Meal>, RepoError> {
        Ok(self
            .meals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.id == id && m.user_id == user_id)
            .cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Meal>, RepoError> {
        let mut meals: Vec<Meal> = self
            .meals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        meals.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(meals)
    }
}
