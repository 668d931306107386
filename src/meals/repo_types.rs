use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::analysis::NutritionalAnalysisResult;
use crate::gl::{classify_speed, classify_stability, AddedSugar, EnergyStability, SugarSpeed};

/// A logged meal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub name: String,
    pub gl: i64,
    pub sugar_speed: SugarSpeed,
    pub energy_stability: EnergyStability,
    /// When the meal was eaten; may be backdated.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub image_uri: Option<String>,
    pub analysis_result: Option<NutritionalAnalysisResult>,
    pub added_sugar: Option<AddedSugar>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A meal before the store has assigned it an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeal {
    pub name: String,
    pub gl: i64,
    pub sugar_speed: SugarSpeed,
    pub energy_stability: EnergyStability,
    pub timestamp: OffsetDateTime,
    pub image_uri: Option<String>,
    pub analysis_result: Option<NutritionalAnalysisResult>,
    pub added_sugar: Option<AddedSugar>,
}

impl NewMeal {
    /// Meal fields taken from a finished analysis.
    pub fn from_analysis(
        result: NutritionalAnalysisResult,
        timestamp: OffsetDateTime,
        image_uri: Option<String>,
        added_sugar: Option<AddedSugar>,
    ) -> Self {
        Self {
            name: result.food_name.clone(),
            gl: result.meal_gl(),
            sugar_speed: result.sugar_speed,
            energy_stability: result.energy_stability,
            timestamp,
            image_uri,
            analysis_result: Some(result),
            added_sugar,
        }
    }

    pub fn into_meal(self, id: Uuid, user_id: Uuid, created_at: OffsetDateTime) -> Meal {
        Meal {
            id,
            user_id,
            name: self.name,
            gl: self.gl,
            sugar_speed: self.sugar_speed,
            energy_stability: self.energy_stability,
            timestamp: self.timestamp,
            image_uri: self.image_uri,
            analysis_result: self.analysis_result,
            added_sugar: self.added_sugar,
            created_at,
        }
    }
}

/// Field-level update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPatch {
    pub name: Option<String>,
    pub gl: Option<i64>,
    pub sugar_speed: Option<SugarSpeed>,
    pub energy_stability: Option<EnergyStability>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub image_uri: Option<String>,
    pub analysis_result: Option<NutritionalAnalysisResult>,
    pub added_sugar: Option<AddedSugar>,
}

impl MealPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Replace a meal's analysis-derived fields with a refined result.
    pub fn from_analysis(result: NutritionalAnalysisResult) -> Self {
        Self {
            name: Some(result.food_name.clone()),
            gl: Some(result.meal_gl()),
            sugar_speed: Some(result.sugar_speed),
            energy_stability: Some(result.energy_stability),
            analysis_result: Some(result),
            ..Default::default()
        }
    }
}

impl Meal {
    pub fn apply(&mut self, patch: MealPatch) {
        let MealPatch {
            name,
            gl,
            sugar_speed,
            energy_stability,
            timestamp,
            image_uri,
            analysis_result,
            added_sugar,
        } = patch;
        if let Some(v) = name {
            self.name = v;
        }
        if let Some(v) = gl {
            self.gl = v;
        }
        if let Some(v) = sugar_speed {
            self.sugar_speed = v;
        }
        if let Some(v) = energy_stability {
            self.energy_stability = v;
        }
        if let Some(v) = timestamp {
            self.timestamp = v;
        }
        if image_uri.is_some() {
            self.image_uri = image_uri;
        }
        if analysis_result.is_some() {
            self.analysis_result = analysis_result;
        }
        if added_sugar.is_some() {
            self.added_sugar = added_sugar;
        }
    }
}

/// Row shape of the `meals` table.
#[derive(Debug, FromRow)]
pub struct MealRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub gl: i64,
    pub sugar_speed: String,
    pub energy_stability: String,
    pub eaten_at: OffsetDateTime,
    /// Offset the meal was logged in; `eaten_at` itself comes back as UTC.
    pub eaten_offset_secs: i32,
    pub image_uri: Option<String>,
    pub analysis_result: Option<Json<NutritionalAnalysisResult>>,
    pub added_sugar: Option<Json<AddedSugar>>,
    pub created_at: OffsetDateTime,
}

impl From<MealRow> for Meal {
    fn from(r: MealRow) -> Self {
        let gl = r.gl as f64;
        Self {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            gl: r.gl,
            sugar_speed: SugarSpeed::parse(&r.sugar_speed).unwrap_or_else(|| classify_speed(gl)),
            energy_stability: EnergyStability::parse(&r.energy_stability)
                .unwrap_or_else(|| classify_stability(gl)),
            timestamp: restore_offset(r.eaten_at, r.eaten_offset_secs),
            image_uri: r.image_uri,
            analysis_result: r.analysis_result.map(|j| j.0),
            added_sugar: r.added_sugar.map(|j| j.0),
            created_at: r.created_at,
        }
    }
}

fn restore_offset(at: OffsetDateTime, offset_secs: i32) -> OffsetDateTime {
    match UtcOffset::from_whole_seconds(offset_secs) {
        Ok(offset) => at.to_offset(offset),
        Err(_) => at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn meal() -> Meal {
        NewMeal {
            name: "Idli".into(),
            gl: 6,
            sugar_speed: SugarSpeed::Slow,
            energy_stability: EnergyStability::Stable,
            timestamp: datetime!(2024-03-05 08:30 UTC),
            image_uri: None,
            analysis_result: None,
            added_sugar: None,
        }
        .into_meal(Uuid::new_v4(), Uuid::new_v4(), datetime!(2024-03-05 08:31 UTC))
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut m = meal();
        m.apply(MealPatch {
            gl: Some(11),
            sugar_speed: Some(SugarSpeed::Moderate),
            ..Default::default()
        });
        assert_eq!(m.gl, 11);
        assert_eq!(m.sugar_speed, SugarSpeed::Moderate);
        assert_eq!(m.name, "Idli");
        assert_eq!(m.energy_stability, EnergyStability::Stable);
        assert!(MealPatch::default().is_empty());
    }

    #[test]
    fn row_with_legacy_labels_maps_to_meal() {
        let row = MealRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Kheer".into(),
            gl: 24,
            sugar_speed: "Fast".into(),
            energy_stability: "Likely Crash".into(),
            eaten_at: datetime!(2024-03-05 20:00 UTC),
            eaten_offset_secs: 0,
            image_uri: None,
            analysis_result: None,
            added_sugar: None,
            created_at: datetime!(2024-03-05 20:01 UTC),
        };
        let m = Meal::from(row);
        assert_eq!(m.sugar_speed, SugarSpeed::Fast);
        assert_eq!(m.energy_stability, EnergyStability::Crash);
    }

    #[test]
    fn row_keeps_the_logged_offset() {
        // Postgres hands back 21:00 UTC for a meal logged at 02:30 +05:30.
        let row = MealRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Poha".into(),
            gl: 12,
            sugar_speed: "Moderate".into(),
            energy_stability: "Unsteady".into(),
            eaten_at: datetime!(2024-03-05 21:00 UTC),
            eaten_offset_secs: 5 * 3600 + 1800,
            image_uri: None,
            analysis_result: None,
            added_sugar: None,
            created_at: datetime!(2024-03-05 21:01 UTC),
        };
        let m = Meal::from(row);
        assert_eq!(m.timestamp, datetime!(2024-03-06 02:30 +05:30));
        assert_eq!(m.timestamp.offset().whole_seconds(), 19_800);
        assert_eq!(m.timestamp.date(), time::macros::date!(2024 - 03 - 06));
        let filtered = crate::summary::filter_by_date(std::slice::from_ref(&m), time::macros::date!(2024 - 03 - 06));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn bad_offset_falls_back_to_utc() {
        let at = datetime!(2024-03-05 21:00 UTC);
        assert_eq!(restore_offset(at, 999_999), at);
    }

    #[test]
    fn serialises_camel_case_without_owner() {
        let json = serde_json::to_value(meal()).unwrap();
        assert_eq!(json["sugarSpeed"], "Slow");
        assert_eq!(json["timestamp"], "2024-03-05T08:30:00Z");
        assert!(json.get("userId").is_none());
    }
}
