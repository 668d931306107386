//! Shapes loosely structured provider output into a [`NutritionalAnalysisResult`].
//!
//! [`normalize`] is total: any JSON value, including `null`, arrays, and
//! objects with wrong field types, yields a fully populated result. Missing
//! root totals are filled in from the ingredient list when one is present.

use serde_json::{Map, Value};

use super::types::{AddedSugarDetection, Ingredient, NutritionalAnalysisResult, NutritionalInfo};
use crate::gl::{classify_speed, classify_stability, compute_gl, EnergyStability, SugarSpeed};

pub const UNKNOWN_FOOD: &str = "Unknown Food";
pub const NO_ANALYSIS: &str = "No analysis available.";
pub const UNKNOWN_INGREDIENT: &str = "Unknown ingredient";

pub fn normalize(raw: &Value) -> NutritionalAnalysisResult {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);
    let info = obj
        .get("nutritionalInfo")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let raw_ingredients: Vec<&Map<String, Value>> = obj
        .get("ingredients")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default();
    let ingredients: Vec<Ingredient> = raw_ingredients.iter().map(|i| ingredient(i)).collect();
    let has_ingredients = !ingredients.is_empty();

    // Root value, else the ingredient sum, else zero.
    let total = |root: Option<f64>, per_ingredient: &dyn Fn(usize) -> f64| {
        root.unwrap_or_else(|| {
            if has_ingredients {
                (0..ingredients.len()).map(per_ingredient).sum()
            } else {
                0.0
            }
        })
    };

    let glycemic_load = total(number(obj, &["glycemicLoad"]), &|i| ingredients[i].glycemic_load);
    let carbs = total(number(info, &["carbs"]).or_else(|| number(obj, &["carbs"])), &|i| {
        ingredients[i].total_carbs
    });
    let calories = total(
        number(info, &["calories"]).or_else(|| number(obj, &["calories"])),
        &|i| ingredients[i].calories,
    );
    let protein = total(
        number(info, &["protein"]).or_else(|| number(obj, &["protein"])),
        &|i| number(raw_ingredients[i], &["protein"]).unwrap_or(0.0),
    );
    let fat = total(number(info, &["fat"]).or_else(|| number(obj, &["fat"])), &|i| {
        number(raw_ingredients[i], &["fat"]).unwrap_or(0.0)
    });
    let total_available_carbs_grams = total(
        number(obj, &["totalAvailableCarbsGrams", "totalAvailableCarbohydratesG"]),
        &|i| ingredients[i].total_carbs,
    );

    let glycemic_index = number(obj, &["glycemicIndex"])
        .unwrap_or_else(|| weighted_gi(&ingredients))
        .min(100.0);

    let sugar_speed = text(obj, "sugarSpeed")
        .and_then(SugarSpeed::parse)
        .unwrap_or_else(|| classify_speed(glycemic_load));
    let energy_stability = text(obj, "energyStability")
        .and_then(EnergyStability::parse)
        .unwrap_or_else(|| classify_stability(glycemic_load));

    NutritionalAnalysisResult {
        food_name: non_empty(obj, "foodName").unwrap_or_else(|| UNKNOWN_FOOD.to_string()),
        ingredients,
        total_available_carbs_grams,
        glycemic_index,
        glycemic_load,
        confidence_score: number(obj, &["confidenceScore"]).unwrap_or(0.0).min(1.0),
        nutritional_info: NutritionalInfo {
            calories,
            carbs,
            protein,
            fat,
            fiber: number(info, &["fiber"]).unwrap_or(0.0),
            sugar: number(info, &["sugar"]).unwrap_or(0.0),
        },
        analysis: non_empty(obj, "analysis").unwrap_or_else(|| NO_ANALYSIS.to_string()),
        recommendations: obj
            .get("recommendations")
            .and_then(Value::as_array)
            .map(|recs| {
                recs.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        sugar_speed,
        energy_stability,
        added_sugar: obj
            .get("addedSugar")
            .and_then(Value::as_object)
            .map(added_sugar),
        added_sugar_likely: obj.get("addedSugarLikely").and_then(Value::as_bool),
    }
}

fn ingredient(obj: &Map<String, Value>) -> Ingredient {
    let weight = number(obj, &["estimatedWeightGrams", "estimatedWeightG"]).unwrap_or(0.0);
    let carbs_per_100g = number(obj, &["carbsPer100g"]).unwrap_or(0.0);
    let total_carbs = number(obj, &["totalCarbs", "availableCarbohydratesG"])
        .unwrap_or(weight * carbs_per_100g / 100.0);
    let glycemic_index = number(obj, &["glycemicIndex", "giMedian"])
        .unwrap_or(0.0)
        .min(100.0);
    Ingredient {
        name: non_empty(obj, "name").unwrap_or_else(|| UNKNOWN_INGREDIENT.to_string()),
        estimated_weight_grams: weight,
        carbs_per_100g,
        total_carbs,
        glycemic_index,
        glycemic_load: number(obj, &["glycemicLoad"])
            .unwrap_or_else(|| compute_gl(total_carbs, glycemic_index)),
        calories: number(obj, &["calories"]).unwrap_or(0.0),
    }
}

fn added_sugar(obj: &Map<String, Value>) -> AddedSugarDetection {
    AddedSugarDetection {
        detected: obj.get("detected").and_then(Value::as_bool).unwrap_or(false),
        source: non_empty(obj, "source"),
        amount: number(obj, &["amount"]),
        confidence: number(obj, &["confidence"]).map(|c| c.min(1.0)),
    }
}

/// Carb-weighted mean GI of the ingredients; zero when there are no carbs.
fn weighted_gi(ingredients: &[Ingredient]) -> f64 {
    let carbs: f64 = ingredients.iter().map(|i| i.total_carbs).sum();
    if carbs <= 0.0 {
        return 0.0;
    }
    ingredients
        .iter()
        .map(|i| i.glycemic_index * i.total_carbs)
        .sum::<f64>()
        / carbs
}

/// First of `keys` holding a finite number (or numeric string), floored at 0.
fn number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| {
        let v = match obj.get(*k)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        v.is_finite().then_some(v.max(0.0))
    })
}

fn text<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn non_empty(obj: &Map<String, Value>, key: &str) -> Option<String> {
    text(obj, key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
