//! Glycemic load arithmetic and the GL classification thresholds.
//!
//! Every place that turns a GL number into a label goes through
//! [`classify_speed`] / [`classify_stability`]; the threshold constants live
//! only here.

pub mod sugars;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A meal below this GL is `Slow` / `Stable`.
pub const LOW_GL_MAX: f64 = 10.0;
/// A meal above this GL is `Fast` / `Crash`.
pub const MODERATE_GL_MAX: f64 = 20.0;

/// GI used for any user-confirmed added sugar, regardless of its type.
pub const ADDED_SUGAR_GI: f64 = 65.0;
/// One spoon (teaspoon) of sugar in grams.
pub const GRAMS_PER_SPOON: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SugarSpeed {
    Slow,
    Moderate,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnergyStability {
    #[serde(alias = "Steady")]
    Stable,
    #[serde(alias = "Okay")]
    Unsteady,
    #[serde(alias = "Likely Crash")]
    Crash,
}

impl SugarSpeed {
    /// Lenient parse used on provider output.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Some(Self::Slow),
            "moderate" => Some(Self::Moderate),
            "fast" => Some(Self::Fast),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slow => "Slow",
            Self::Moderate => "Moderate",
            Self::Fast => "Fast",
        }
    }
}

impl EnergyStability {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" | "steady" => Some(Self::Stable),
            "unsteady" | "okay" => Some(Self::Unsteady),
            "crash" | "likely crash" => Some(Self::Crash),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::Unsteady => "Unsteady",
            Self::Crash => "Crash",
        }
    }
}

/// GL = GI × carbs / 100. Not rounded.
pub fn compute_gl(total_carbs_g: f64, glycemic_index: f64) -> f64 {
    glycemic_index * total_carbs_g / 100.0
}

pub fn classify_speed(gl: f64) -> SugarSpeed {
    if gl < LOW_GL_MAX {
        SugarSpeed::Slow
    } else if gl <= MODERATE_GL_MAX {
        SugarSpeed::Moderate
    } else {
        SugarSpeed::Fast
    }
}

pub fn classify_stability(gl: f64) -> EnergyStability {
    classify_speed(gl).into()
}

/// Stability always follows speed band for band.
impl From<SugarSpeed> for EnergyStability {
    fn from(speed: SugarSpeed) -> Self {
        match speed {
            SugarSpeed::Slow => Self::Stable,
            SugarSpeed::Moderate => Self::Unsteady,
            SugarSpeed::Fast => Self::Crash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SugarUnit {
    #[serde(rename = "g")]
    Grams,
    #[serde(rename = "spoon")]
    Spoon,
}

impl SugarUnit {
    pub fn to_grams(self, amount: f64) -> f64 {
        match self {
            Self::Grams => amount,
            Self::Spoon => amount * GRAMS_PER_SPOON,
        }
    }
}

/// Added sugar the user confirmed for a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedSugar {
    pub amount: f64,
    pub unit: SugarUnit,
    pub type_id: String,
}

impl AddedSugar {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::NotPositive {
                field: "added sugar amount",
            });
        }
        if sugars::sugar_type(&self.type_id).is_none() {
            return Err(ValidationError::UnknownSugarType(self.type_id.clone()));
        }
        Ok(())
    }

    pub fn grams(&self) -> f64 {
        self.unit.to_grams(self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlTotals {
    pub gl: f64,
    pub carbs: f64,
}

/// Fold an added-sugar amount into a GL/carb pair. Negative or NaN amounts
/// count as zero, so the totals never decrease.
pub fn apply_added_sugar(base_gl: f64, base_carbs: f64, amount: f64, unit: SugarUnit) -> GlTotals {
    let grams = unit.to_grams(amount.max(0.0));
    GlTotals {
        gl: base_gl + compute_gl(grams, ADDED_SUGAR_GI),
        carbs: base_carbs + grams,
    }
}

/// Variation applied around a GL point estimate; bands widen with magnitude.
fn range_variation(gl: f64) -> f64 {
    const BANDS: [(f64, f64); 10] = [
        (10.0, 0.05),
        (15.0, 0.0625),
        (20.0, 0.075),
        (25.0, 0.0875),
        (30.0, 0.10),
        (35.0, 0.125),
        (40.0, 0.15),
        (45.0, 0.175),
        (50.0, 0.20),
        (55.0, 0.2225),
    ];
    BANDS
        .iter()
        .find(|(upper, _)| gl < *upper)
        .map_or(0.25, |(_, pct)| *pct)
}

/// Human range such as `"16-20"` for a GL estimate.
pub fn estimate_display_range(gl: f64) -> String {
    let variation = gl * range_variation(gl);
    let min = (gl - variation).floor() as i64;
    let max = (gl + variation).ceil() as i64;
    if min == max {
        return min.to_string();
    }
    format!("{}-{}", min.max(0), max)
}

/// Round to one decimal place, as stored in analysis results.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
