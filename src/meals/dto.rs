use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use super::entry::{ManualCategory, Portion};
use super::repo_types::Meal;
use crate::foods::barcode::ProductData;
use crate::foods::Quantity;
use crate::gl::AddedSugar;

#[derive(Debug, Deserialize)]
pub struct ManualEntryRequest {
    pub name: String,
    pub category: ManualCategory,
    pub portion: Portion,
    pub added_sugar: Option<AddedSugar>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct SearchEntryRequest {
    pub food_id: String,
    pub quantity: Quantity,
    pub added_sugar: Option<AddedSugar>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

/// Either a full product (remembered for later scans) or a barcode seen
/// before.
#[derive(Debug, Deserialize)]
pub struct BarcodeEntryRequest {
    pub barcode: Option<String>,
    pub product: Option<ProductData>,
    pub grams: f64,
    pub category: ManualCategory,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<Date>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealResponse {
    #[serde(flatten)]
    pub meal: Meal,
    /// Display range of the GL, e.g. `"16-20"`.
    pub gl_range: String,
    /// The analysis thinks sugar was added and the user has not said how much.
    pub added_sugar_likely: bool,
    pub image_url: Option<String>,
}
