//! Local food catalog and the barcode product shape.

pub mod barcode;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MIN_QUERY_LEN: usize = 2;
pub const MAX_RESULTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlCategory {
    Low,
    Medium,
    High,
}

/// A catalogued food with a standard serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub food_id: String,
    pub canonical_name: String,
    #[serde(default)]
    pub primary_category: String,
    #[serde(default)]
    pub serving_type: String,
    pub gi: f64,
    pub gl_median: f64,
    pub gl_category: GlCategory,
    pub serving_size_g: f64,
    #[serde(default)]
    pub serving_size_min_g: Option<f64>,
    #[serde(default)]
    pub serving_size_max_g: Option<f64>,
    pub available_carbs_g: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum Quantity {
    Servings(f64),
    Grams(f64),
}

impl FoodItem {
    pub fn grams_for(&self, quantity: Quantity) -> Result<f64, ValidationError> {
        let (value, grams) = match quantity {
            Quantity::Servings(n) => (n, n * self.serving_size_g),
            Quantity::Grams(g) => (g, g),
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::NotPositive { field: "quantity" });
        }
        Ok(grams)
    }

    /// Available carbs in `grams` of this food.
    pub fn carbs_for_grams(&self, grams: f64) -> f64 {
        if self.serving_size_g <= 0.0 {
            return 0.0;
        }
        self.available_carbs_g / self.serving_size_g * grams
    }
}

/// In-memory search index over catalog items.
#[derive(Debug, Default)]
pub struct FoodCatalog {
    items: Vec<FoodItem>,
}

impl FoodCatalog {
    pub fn new(items: Vec<FoodItem>) -> Self {
        Self { items }
    }

    /// Load a JSON array of items.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read food catalog {}", path.display()))?;
        let items: Vec<FoodItem> = serde_json::from_str(&raw).context("parse food catalog")?;
        tracing::info!(items = items.len(), "food catalog loaded");
        Ok(Self::new(items))
    }

    /// Case-insensitive substring match on the canonical name, in catalog
    /// order, capped at [`MAX_RESULTS`].
    pub fn search(&self, query: &str) -> Vec<&FoodItem> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.items
            .iter()
            .filter(|item| item.canonical_name.to_lowercase().contains(&needle))
            .take(MAX_RESULTS)
            .collect()
    }

    pub fn get(&self, food_id: &str) -> Option<&FoodItem> {
        self.items.iter().find(|item| item.food_id == food_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn item(id: &str, name: &str) -> FoodItem {
        FoodItem {
            food_id: id.into(),
            canonical_name: name.into(),
            primary_category: "Breakfast".into(),
            serving_type: "piece".into(),
            gi: 70.0,
            gl_median: 8.4,
            gl_category: GlCategory::Low,
            serving_size_g: 40.0,
            serving_size_min_g: None,
            serving_size_max_g: None,
            available_carbs_g: 12.0,
        }
    }

    #[test]
    fn search_rules() {
        let catalog = FoodCatalog::new(vec![
            item("1", "Rava Idli"),
            item("2", "Idli"),
            item("3", "Masala Dosa"),
        ]);
        assert!(catalog.search("i").is_empty());
        let hits: Vec<&str> = catalog.search("IDLI").iter().map(|i| i.food_id.as_str()).collect();
        assert_eq!(hits, vec!["1", "2"]);
        assert_eq!(catalog.get("3").map(|i| i.canonical_name.as_str()), Some("Masala Dosa"));
        assert!(catalog.get("9").is_none());
    }

    #[test]
    fn search_is_capped() {
        let items = (0..80).map(|i| item(&i.to_string(), &format!("Roti {i}"))).collect();
        let catalog = FoodCatalog::new(items);
        assert_eq!(catalog.search("roti").len(), MAX_RESULTS);
        assert_eq!(catalog.len(), 80);
    }

    #[test]
    fn portions() {
        let idli = item("2", "Idli");
        assert_eq!(idli.grams_for(Quantity::Servings(2.0)).unwrap(), 80.0);
        assert_eq!(idli.grams_for(Quantity::Grams(50.0)).unwrap(), 50.0);
        assert!(idli.grams_for(Quantity::Servings(0.0)).is_err());
        assert!(idli.grams_for(Quantity::Grams(f64::NAN)).is_err());
        assert!((idli.carbs_for_grams(80.0) - 24.0).abs() < 1e-9);
    }

    #[test]
    fn parses_catalog_json() {
        let raw = r#"[{"food_id":"7","canonical_name":"Poha","gi":64,"gl_median":13,
                      "gl_category":"Medium","serving_size_g":150,"available_carbs_g":20}]"#;
        let items: Vec<FoodItem> = serde_json::from_str(raw).unwrap();
        assert_eq!(items[0].gl_category, GlCategory::Medium);
        assert!(items[0].serving_size_min_g.is_none());
    }
}
