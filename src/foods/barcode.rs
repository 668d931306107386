use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-100 g nutrition of a packaged product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutriments {
    pub carbohydrates_100g: Option<f64>,
    pub sugars_100g: Option<f64>,
    pub fiber_100g: Option<f64>,
    pub proteins_100g: Option<f64>,
    pub fat_100g: Option<f64>,
    pub energy_kcal_100g: Option<f64>,
}

/// Product data as returned by a barcode lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    pub barcode: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub ingredients: Option<String>,
    #[serde(default)]
    pub nutriments: Option<Nutriments>,
    #[serde(default)]
    pub serving_size: Option<String>,
}

/// Nutrition of a product scaled to an eaten amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledNutrition {
    pub carbs: f64,
    pub sugar: f64,
    pub fiber: f64,
    pub protein: f64,
    pub fat: f64,
    pub calories: f64,
}

impl Nutriments {
    /// `None` when the product carries no carbohydrate figure.
    pub fn scaled_to(&self, grams: f64) -> Option<ScaledNutrition> {
        let carbs = self.carbohydrates_100g?;
        let scale = |v: Option<f64>| v.unwrap_or(0.0).max(0.0) * grams / 100.0;
        Some(ScaledNutrition {
            carbs: scale(Some(carbs)),
            sugar: scale(self.sugars_100g),
            fiber: scale(self.fiber_100g),
            protein: scale(self.proteins_100g),
            fat: scale(self.fat_100g),
            calories: scale(self.energy_kcal_100g),
        })
    }
}

/// Resolves a scanned barcode to product data.
#[async_trait]
pub trait BarcodeLookup: Send + Sync {
    async fn lookup(&self, barcode: &str) -> anyhow::Result<Option<ProductData>>;
}

/// Products seen so far, keyed by barcode. A product submitted once with
/// its data can later be logged by barcode alone.
#[derive(Default)]
pub struct ProductDirectory {
    products: Mutex<HashMap<String, ProductData>>,
}

impl ProductDirectory {
    pub fn remember(&self, product: ProductData) {
        self.products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product.barcode.clone(), product);
    }
}

#[async_trait]
impl BarcodeLookup for ProductDirectory {
    async fn lookup(&self, barcode: &str) -> anyhow::Result<Option<ProductData>> {
        Ok(self
            .products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(barcode.trim())
            .cloned())
    }
}
