use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::repo::MealStore;
use super::repo_types::{Meal, MealPatch, NewMeal};
use crate::analysis::{normalize, AnalysisService};
use crate::error::RepoError;
use crate::gl::AddedSugar;

#[derive(Default)]
struct LocalMeals {
    meals: HashMap<Uuid, Meal>,
    loaded_users: HashSet<Uuid>,
}

/// Persistence façade over a [`MealStore`].
///
/// Keeps a local copy of every meal it has seen so readers (the summary
/// views) never wait on the store. Creates go to the store first; updates
/// are applied locally first and written to the store best-effort.
pub struct MealRepository {
    store: Arc<dyn MealStore>,
    local: Mutex<LocalMeals>,
}

impl MealRepository {
    pub fn new(store: Arc<dyn MealStore>) -> Self {
        Self {
            store,
            local: Mutex::new(LocalMeals::default()),
        }
    }

    fn local(&self) -> std::sync::MutexGuard<'_, LocalMeals> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn insert(&self, user_id: Uuid, meal: NewMeal) -> Result<Meal, RepoError> {
        self.store.insert(user_id, meal).await.map_err(|e| {
            error!(error = %e, %user_id, "meal create failed");
            e
        })
    }

    fn remember(&self, meal: &Meal) {
        self.local().meals.insert(meal.id, meal.clone());
        info!(meal_id = %meal.id, user_id = %meal.user_id, "meal created");
    }

    /// Persist a new meal; the returned meal carries the store-assigned id.
    #[instrument(skip(self, meal), fields(name = %meal.name, gl = meal.gl))]
    pub async fn create(&self, user_id: Uuid, meal: NewMeal) -> Result<Meal, RepoError> {
        let meal = self.insert(user_id, meal).await?;
        self.remember(&meal);
        Ok(meal)
    }

    /// Insert followed by a read-back. A create the store acknowledged but
    /// cannot read back is a [`RepoError::GhostWrite`] and never becomes
    /// visible to readers.
    #[instrument(skip(self, meal), fields(name = %meal.name, gl = meal.gl))]
    pub async fn create_verified(&self, user_id: Uuid, meal: NewMeal) -> Result<Meal, RepoError> {
        let meal = self.insert(user_id, meal).await?;
        if !self.verify_write(user_id, meal.id).await {
            error!(meal_id = %meal.id, %user_id, "meal acknowledged but missing on read-back");
            return Err(RepoError::GhostWrite(meal.id));
        }
        self.remember(&meal);
        Ok(meal)
    }

    /// Read-after-write existence check against the store itself.
    pub async fn verify_write(&self, user_id: Uuid, id: Uuid) -> bool {
        match self.store.get(user_id, id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(error = %e, meal_id = %id, "write verification read failed");
                false
            }
        }
    }

    /// Patch a meal. The local copy changes immediately; a failed remote
    /// write is logged and not rolled back.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, user_id: Uuid, id: Uuid, patch: MealPatch) -> Result<(), RepoError> {
        if patch.is_empty() {
            return Ok(());
        }
        if self.get(user_id, id).await?.is_none() {
            return Err(RepoError::NotFound(id));
        }
        if let Some(meal) = self.local().meals.get_mut(&id) {
            meal.apply(patch.clone());
        }
        if let Err(e) = self.store.update(user_id, id, patch).await {
            warn!(error = %e, meal_id = %id, "remote meal update failed; local copy kept");
        }
        Ok(())
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Meal>, RepoError> {
        if let Some(m) = self.local().meals.get(&id).filter(|m| m.user_id == user_id) {
            return Ok(Some(m.clone()));
        }
        let found = self.store.get(user_id, id).await?;
        if let Some(m) = &found {
            self.local().meals.insert(m.id, m.clone());
        }
        Ok(found)
    }

    /// All meals of a user, newest first. The first call per user pulls the
    /// store's copy into the local collection.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Meal>, RepoError> {
        let loaded = self.local().loaded_users.contains(&user_id);
        if !loaded {
            let stored = self.store.list_by_user(user_id).await?;
            let mut local = self.local();
            for m in stored {
                local.meals.entry(m.id).or_insert(m);
            }
            local.loaded_users.insert(user_id);
        }
        let mut meals: Vec<Meal> = self
            .local()
            .meals
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        meals.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(meals)
    }
}

/// Ask the provider for advice on a meal and store it in the meal's
/// analysis. A provider failure is logged and the meal is returned as is.
#[instrument(skip(analysis, meals))]
pub async fn refresh_recommendations(
    analysis: &AnalysisService,
    meals: &MealRepository,
    user_id: Uuid,
    id: Uuid,
) -> Result<Meal, RepoError> {
    let meal = meals.get(user_id, id).await?.ok_or(RepoError::NotFound(id))?;
    let recommendations = match analysis.recommendations_for(&meal.name).await {
        Ok(recs) if !recs.is_empty() => recs,
        Ok(_) => return Ok(meal),
        Err(e) => {
            warn!(error = %e, meal_id = %id, "recommendation refresh failed");
            return Ok(meal);
        }
    };

    let mut result = meal
        .analysis_result
        .clone()
        .unwrap_or_else(|| crate::analysis::normalize(&serde_json::json!({ "foodName": meal.name })));
    result.recommendations = recommendations;
    let patch = MealPatch {
        analysis_result: Some(result),
        ..Default::default()
    };
    meals.update(user_id, id, patch).await?;
    meals.get(user_id, id).await?.ok_or(RepoError::NotFound(id))
}

/// Fold a user-confirmed added sugar into a logged meal. The meal's GL, its
/// labels and its stored analysis all move to the new totals.
#[instrument(skip(meals, sugar), fields(sugar_type = %sugar.type_id))]
pub async fn confirm_added_sugar(
    meals: &MealRepository,
    user_id: Uuid,
    id: Uuid,
    sugar: AddedSugar,
) -> Result<Meal, RepoError> {
    let meal = meals.get(user_id, id).await?.ok_or(RepoError::NotFound(id))?;
    let patch = added_sugar_patch(&meal, sugar);
    info!(meal_id = %id, from = meal.gl, to = ?patch.gl, "added sugar confirmed");
    meals.update(user_id, id, patch).await?;
    meals.get(user_id, id).await?.ok_or(RepoError::NotFound(id))
}

fn added_sugar_patch(meal: &Meal, sugar: AddedSugar) -> MealPatch {
    let mut base = meal
        .analysis_result
        .clone()
        .unwrap_or_else(|| normalize(&serde_json::json!({ "foodName": meal.name, "glycemicLoad": meal.gl })));
    // A hand-edited GL wins over the one the analysis came back with.
    if base.meal_gl() != meal.gl {
        base.glycemic_load = meal.gl as f64;
    }
    let result = base.with_added_sugar(&sugar);
    MealPatch {
        gl: Some(result.meal_gl()),
        sugar_speed: Some(result.sugar_speed),
        energy_stability: Some(result.energy_stability),
        analysis_result: Some(result),
        added_sugar: Some(sugar),
        ..Default::default()
    }
}
