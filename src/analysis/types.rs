use serde::{Deserialize, Serialize};

use crate::gl::{
    apply_added_sugar, classify_speed, classify_stability, round1, AddedSugar, EnergyStability,
    SugarSpeed,
};

/// One component of an analysed meal, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    pub estimated_weight_grams: f64,
    pub carbs_per_100g: f64,
    pub total_carbs: f64,
    pub glycemic_index: f64,
    pub glycemic_load: f64,
    pub calories: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionalInfo {
    pub calories: f64,
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
}

/// Added sugar as reported by the provider (not the user's confirmation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddedSugarDetection {
    pub detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Fully populated analysis of a meal, whether it came from the AI
/// provider, the food catalog, or manual entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionalAnalysisResult {
    pub food_name: String,
    pub ingredients: Vec<Ingredient>,
    pub total_available_carbs_grams: f64,
    pub glycemic_index: f64,
    pub glycemic_load: f64,
    pub confidence_score: f64,
    pub nutritional_info: NutritionalInfo,
    pub analysis: String,
    pub recommendations: Vec<String>,
    pub sugar_speed: SugarSpeed,
    pub energy_stability: EnergyStability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_sugar: Option<AddedSugarDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_sugar_likely: Option<bool>,
}

impl NutritionalAnalysisResult {
    /// Whether the provider thinks the user should be asked about added sugar.
    pub fn suggests_added_sugar(&self) -> bool {
        self.added_sugar_likely.unwrap_or(false)
            || self.added_sugar.as_ref().is_some_and(|s| s.detected)
    }

    /// Fold a user-confirmed added sugar into the totals and re-derive the
    /// labels from the new GL.
    pub fn with_added_sugar(mut self, sugar: &AddedSugar) -> Self {
        let totals = apply_added_sugar(
            self.glycemic_load,
            self.total_available_carbs_grams,
            sugar.amount,
            sugar.unit,
        );
        let grams = totals.carbs - self.total_available_carbs_grams;
        self.glycemic_load = round1(totals.gl);
        self.total_available_carbs_grams = round1(totals.carbs);
        self.nutritional_info.carbs = round1(self.nutritional_info.carbs + grams);
        self.nutritional_info.sugar = round1(self.nutritional_info.sugar + grams);
        self.sugar_speed = classify_speed(self.glycemic_load);
        self.energy_stability = classify_stability(self.glycemic_load);
        self
    }

    /// GL as stored on a meal.
    pub fn meal_gl(&self) -> i64 {
        self.glycemic_load.round() as i64
    }
}
