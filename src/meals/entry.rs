//! Synchronous logging paths that never call the analysis provider: a
//! manual estimate, a catalogued food, or a scanned packaged product.
//! Each builds a [`NutritionalAnalysisResult`] locally.

use serde::Deserialize;

use crate::analysis::{Ingredient, NutritionalAnalysisResult, NutritionalInfo};
use crate::error::ValidationError;
use crate::foods::barcode::ProductData;
use crate::foods::{FoodItem, Quantity};
use crate::gl::{classify_speed, compute_gl, round1, AddedSugar, SugarSpeed};

const MANUAL_CONFIDENCE: f64 = 0.5;
const CATALOG_CONFIDENCE: f64 = 0.9;
const PRODUCT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualCategory {
    LightSnack,
    Balanced,
    HeavySweet,
}

impl ManualCategory {
    pub fn carbs_per_100g(self) -> f64 {
        match self {
            Self::LightSnack => 5.0,
            Self::Balanced => 20.0,
            Self::HeavySweet => 50.0,
        }
    }

    pub fn glycemic_index(self) -> f64 {
        match self {
            Self::LightSnack => 30.0,
            Self::Balanced => 55.0,
            Self::HeavySweet => 75.0,
        }
    }

    /// Lowest sugar speed a meal of this category is reported with.
    fn speed_floor(self) -> SugarSpeed {
        match self {
            Self::LightSnack => SugarSpeed::Slow,
            Self::Balanced => SugarSpeed::Moderate,
            Self::HeavySweet => SugarSpeed::Fast,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Portion {
    Small,
    Medium,
    Large,
    Grams(f64),
}

impl Portion {
    pub fn grams(self) -> Result<f64, ValidationError> {
        match self {
            Self::Small => Ok(150.0),
            Self::Medium => Ok(300.0),
            Self::Large => Ok(500.0),
            Self::Grams(g) if g.is_finite() && g > 0.0 => Ok(g),
            Self::Grams(_) => Err(ValidationError::NotPositive { field: "portion" }),
        }
    }
}

fn speed_rank(s: SugarSpeed) -> u8 {
    match s {
        SugarSpeed::Slow => 0,
        SugarSpeed::Moderate => 1,
        SugarSpeed::Fast => 2,
    }
}

fn validated_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_string())
}

fn validate_sugar(sugar: Option<&AddedSugar>) -> Result<(), ValidationError> {
    sugar.map_or(Ok(()), AddedSugar::validate)
}

struct Estimate {
    name: String,
    grams: f64,
    carbs: f64,
    gi: f64,
    nutrition: NutritionalInfo,
    confidence: f64,
    analysis: String,
}

impl Estimate {
    fn into_result(self, added_sugar: Option<&AddedSugar>) -> NutritionalAnalysisResult {
        let gl = compute_gl(self.carbs, self.gi);
        let carbs_per_100g = if self.grams > 0.0 {
            self.carbs / self.grams * 100.0
        } else {
            0.0
        };
        let result = NutritionalAnalysisResult {
            food_name: self.name.clone(),
            ingredients: vec![Ingredient {
                name: self.name,
                estimated_weight_grams: round1(self.grams),
                carbs_per_100g: round1(carbs_per_100g),
                total_carbs: round1(self.carbs),
                glycemic_index: self.gi,
                glycemic_load: round1(gl),
                calories: round1(self.nutrition.calories),
            }],
            total_available_carbs_grams: round1(self.carbs),
            glycemic_index: self.gi,
            glycemic_load: round1(gl),
            confidence_score: self.confidence,
            nutritional_info: NutritionalInfo {
                calories: round1(self.nutrition.calories),
                carbs: round1(self.nutrition.carbs),
                protein: round1(self.nutrition.protein),
                fat: round1(self.nutrition.fat),
                fiber: round1(self.nutrition.fiber),
                sugar: round1(self.nutrition.sugar),
            },
            analysis: self.analysis,
            recommendations: Vec::new(),
            sugar_speed: classify_speed(gl),
            energy_stability: classify_speed(gl).into(),
            added_sugar: None,
            added_sugar_likely: None,
        };
        match added_sugar {
            Some(sugar) => result.with_added_sugar(sugar),
            None => result,
        }
    }
}

/// Estimate from a category and portion the user picked.
pub fn manual_analysis(
    name: &str,
    category: ManualCategory,
    portion: Portion,
    added_sugar: Option<&AddedSugar>,
) -> Result<NutritionalAnalysisResult, ValidationError> {
    let name = validated_name(name)?;
    let grams = portion.grams()?;
    validate_sugar(added_sugar)?;

    let carbs = grams * category.carbs_per_100g() / 100.0;
    let mut result = Estimate {
        analysis: format!("Manual estimate for {grams:.0} g."),
        name,
        grams,
        carbs,
        gi: category.glycemic_index(),
        nutrition: NutritionalInfo {
            carbs,
            ..Default::default()
        },
        confidence: MANUAL_CONFIDENCE,
    }
    .into_result(added_sugar);

    if speed_rank(result.sugar_speed) < speed_rank(category.speed_floor()) {
        result.sugar_speed = category.speed_floor();
        result.energy_stability = result.sugar_speed.into();
    }
    Ok(result)
}

/// Result for a catalogued food eaten in the given quantity.
pub fn catalog_analysis(
    item: &FoodItem,
    quantity: Quantity,
    added_sugar: Option<&AddedSugar>,
) -> Result<NutritionalAnalysisResult, ValidationError> {
    let grams = item.grams_for(quantity)?;
    validate_sugar(added_sugar)?;
    let carbs = item.carbs_for_grams(grams);
    Ok(Estimate {
        name: item.canonical_name.clone(),
        grams,
        carbs,
        gi: item.gi,
        nutrition: NutritionalInfo {
            carbs,
            ..Default::default()
        },
        confidence: CATALOG_CONFIDENCE,
        analysis: format!(
            "{} from the food database, {grams:.0} g ({} g per {}).",
            item.canonical_name, item.serving_size_g, item.serving_type
        ),
    }
    .into_result(added_sugar))
}

/// Result for a packaged product. Its GI comes from the category the user
/// picked since product labels carry none.
pub fn product_analysis(
    product: &ProductData,
    grams: f64,
    category: ManualCategory,
) -> Result<NutritionalAnalysisResult, ValidationError> {
    if !grams.is_finite() || grams <= 0.0 {
        return Err(ValidationError::NotPositive { field: "grams" });
    }
    let scaled = product
        .nutriments
        .as_ref()
        .and_then(|n| n.scaled_to(grams))
        .ok_or_else(|| ValidationError::MissingNutriments(product.barcode.clone()))?;

    let name = match product.brand.trim() {
        "" => product.name.clone(),
        brand => format!("{} ({brand})", product.name),
    };
    Ok(Estimate {
        name: validated_name(&name)?,
        grams,
        carbs: scaled.carbs,
        gi: category.glycemic_index(),
        nutrition: NutritionalInfo {
            calories: scaled.calories,
            carbs: scaled.carbs,
            protein: scaled.protein,
            fat: scaled.fat,
            fiber: scaled.fiber,
            sugar: scaled.sugar,
        },
        confidence: PRODUCT_CONFIDENCE,
        analysis: format!("Packaged product {}, {grams:.0} g.", product.barcode),
    }
    .into_result(None))
}
