pub mod dto;
pub mod entry;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use repo::{MealStore, MemoryMealStore, PgMealStore};
pub use repo_types::{Meal, MealPatch, NewMeal};
pub use services::MealRepository;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
