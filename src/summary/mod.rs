//! Derived daily and weekly views over a user's meals. Nothing here is
//! stored; every summary is recomputed from the meal list on read.

use serde::Serialize;
use time::{Date, Duration};

use crate::gl::{EnergyStability, SugarSpeed, MODERATE_GL_MAX};
use crate::meals::Meal;

/// Daily total above `budget × this` is a crash day.
pub const CRASH_BUDGET_FACTOR: f64 = 1.2;
/// A single meal above this GL makes the day a crash day.
pub const CRASH_MEAL_GL: f64 = 30.0;
/// More spikes than this make the day a crash day.
pub const CRASH_SPIKE_COUNT: usize = 2;

pub const SAFE_ZONE_MAX: f64 = 60.0;
pub const RISKY_ZONE_MAX: f64 = 90.0;

pub const DEFAULT_SERIES_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTotals {
    pub total_gl: i64,
    pub spike_count: usize,
    pub max_meal_gl: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetZone {
    Safe,
    Risky,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub date: Date,
    pub total_gl: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: Date,
    #[serde(flatten)]
    pub totals: DailyTotals,
    pub meal_count: usize,
    pub stability: EnergyStability,
    pub budget: i64,
    pub percentage: f64,
    pub gauge_percentage: f64,
    pub zone: BudgetZone,
    pub remaining: f64,
    pub pending_actions: usize,
}

/// Meals whose timestamp falls on `date` in the timestamp's own offset.
pub fn filter_by_date(meals: &[Meal], date: Date) -> Vec<&Meal> {
    meals.iter().filter(|m| m.timestamp.date() == date).collect()
}

pub fn daily_totals<'a>(meals: impl IntoIterator<Item = &'a Meal>) -> DailyTotals {
    meals.into_iter().fold(DailyTotals::default(), |mut t, m| {
        t.total_gl += m.gl;
        if m.sugar_speed == SugarSpeed::Fast {
            t.spike_count += 1;
        }
        t.max_meal_gl = t.max_meal_gl.max(m.gl);
        t
    })
}

/// Any one severe signal escalates the day.
pub fn classify_daily_stability(
    total_gl: f64,
    budget: f64,
    max_meal_gl: f64,
    spike_count: usize,
) -> EnergyStability {
    if total_gl > budget * CRASH_BUDGET_FACTOR
        || max_meal_gl > CRASH_MEAL_GL
        || spike_count > CRASH_SPIKE_COUNT
    {
        EnergyStability::Crash
    } else if total_gl > budget || max_meal_gl > MODERATE_GL_MAX || spike_count >= 1 {
        EnergyStability::Unsteady
    } else {
        EnergyStability::Stable
    }
}

/// Not capped at 100; over-budget values are meaningful.
pub fn percentage_of_budget(consumed: f64, budget: f64) -> f64 {
    if budget <= 0.0 {
        return 0.0;
    }
    (consumed / budget * 100.0).max(0.0)
}

/// Percentage as drawn on a ring gauge.
pub fn gauge_percentage(consumed: f64, budget: f64) -> f64 {
    percentage_of_budget(consumed, budget).min(100.0)
}

pub fn remaining_budget(consumed: f64, budget: f64) -> f64 {
    (budget - consumed).max(0.0)
}

pub fn budget_zone(percentage: f64) -> BudgetZone {
    if percentage < SAFE_ZONE_MAX {
        BudgetZone::Safe
    } else if percentage <= RISKY_ZONE_MAX {
        BudgetZone::Risky
    } else {
        BudgetZone::Danger
    }
}

/// One point per calendar day ending at `end`, oldest first.
pub fn weekly_series(meals: &[Meal], end: Date, days: u32) -> Vec<DailyPoint> {
    (0..days)
        .rev()
        .filter_map(|back| end.checked_sub(Duration::days(back.into())))
        .map(|date| DailyPoint {
            date,
            total_gl: daily_totals(filter_by_date(meals, date)).total_gl,
        })
        .collect()
}

pub fn daily_summary(meals: &[Meal], date: Date, budget: i64, pending_actions: usize) -> DailySummary {
    let todays = filter_by_date(meals, date);
    let totals = daily_totals(todays.iter().copied());
    let (consumed, budget_f) = (totals.total_gl as f64, budget as f64);
    let percentage = percentage_of_budget(consumed, budget_f);
    DailySummary {
        date,
        totals,
        meal_count: todays.len(),
        stability: classify_daily_stability(
            consumed,
            budget_f,
            totals.max_meal_gl as f64,
            totals.spike_count,
        ),
        budget,
        percentage,
        gauge_percentage: gauge_percentage(consumed, budget_f),
        zone: budget_zone(percentage),
        remaining: remaining_budget(consumed, budget_f),
        pending_actions,
    }
}

/// High-GL meals of a day that carry no advice yet.
pub fn meals_needing_recommendations(meals: &[Meal], date: Date) -> Vec<&Meal> {
    filter_by_date(meals, date)
        .into_iter()
        .filter(|m| m.gl as f64 > MODERATE_GL_MAX)
        .filter(|m| {
            m.analysis_result
                .as_ref()
                .map_or(true, |r| r.recommendations.is_empty())
        })
        .collect()
}
