//! Health goal and daily GL budget per user.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{RepoError, ValidationError};

pub const DEFAULT_BUDGET: i64 = 100;
pub const MIN_BUDGET: i64 = 60;
pub const MAX_BUDGET: i64 = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserGoal {
    BloodSugar,
    AvoidSpikes,
    Energy,
    Pcos,
}

impl UserGoal {
    /// Budget preset for the goal.
    pub fn budget(self) -> i64 {
        match self {
            Self::BloodSugar => 70,
            Self::AvoidSpikes => 90,
            Self::Energy => 110,
            Self::Pcos => 75,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BloodSugar => "blood_sugar",
            Self::AvoidSpikes => "avoid_spikes",
            Self::Energy => "energy",
            Self::Pcos => "pcos",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blood_sugar" => Some(Self::BloodSugar),
            "avoid_spikes" => Some(Self::AvoidSpikes),
            "energy" => Some(Self::Energy),
            "pcos" => Some(Self::Pcos),
            _ => None,
        }
    }
}

pub fn validate_budget(value: i64) -> Result<i64, ValidationError> {
    if (MIN_BUDGET..=MAX_BUDGET).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::BudgetOutOfRange {
            value,
            min: MIN_BUDGET,
            max: MAX_BUDGET,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: Uuid,
    pub goal: Option<UserGoal>,
    pub daily_budget: i64,
}

impl Profile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            goal: None,
            daily_budget: DEFAULT_BUDGET,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    user_id: Uuid,
    goal: Option<String>,
    daily_budget: i64,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        Self {
            user_id: r.user_id,
            goal: r.goal.as_deref().and_then(UserGoal::parse),
            daily_budget: r.daily_budget,
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<Profile>, RepoError>;
    async fn upsert(&self, profile: &Profile) -> Result<(), RepoError>;
}

/// Profile of `user_id`, or the defaults when none is stored yet.
pub async fn load(store: &dyn ProfileStore, user_id: Uuid) -> Result<Profile, RepoError> {
    Ok(store.get(user_id).await?.unwrap_or_else(|| Profile::new(user_id)))
}

/// Choosing a goal resets the budget to the goal's preset.
pub async fn set_goal(store: &dyn ProfileStore, user_id: Uuid, goal: UserGoal) -> Result<Profile, RepoError> {
    let mut profile = load(store, user_id).await?;
    profile.goal = Some(goal);
    profile.daily_budget = goal.budget();
    store.upsert(&profile).await?;
    tracing::info!(%user_id, goal = goal.as_str(), budget = profile.daily_budget, "goal set");
    Ok(profile)
}

pub async fn set_budget(store: &dyn ProfileStore, user_id: Uuid, budget: i64) -> Result<Profile, crate::error::AppError> {
    let budget = validate_budget(budget)?;
    let mut profile = load(store, user_id).await?;
    profile.daily_budget = budget;
    store.upsert(&profile).await?;
    Ok(profile)
}

#[derive(Clone)]
pub struct PgProfileStore {
    db: PgPool,
}

impl PgProfileStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Profile>, RepoError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT user_id, goal, daily_budget FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Profile::from))
    }

    async fn upsert(&self, profile: &Profile) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, goal, daily_budget)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET goal = EXCLUDED.goal, daily_budget = EXCLUDED.daily_budget
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.goal.map(UserGoal::as_str))
        .bind(profile.daily_budget)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<Uuid, Profile>>,
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Profile>, RepoError> {
        Ok(self
            .profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned())
    }

    async fn upsert(&self, profile: &Profile) -> Result<(), RepoError> {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.user_id, profile.clone());
        Ok(())
    }
}
