//! Everything between a meal input and a [`NutritionalAnalysisResult`].

pub mod cache;
pub mod normalize;
pub mod prompt;
pub mod provider;
pub mod service;
pub mod types;

pub use cache::AnalysisCache;
pub use normalize::normalize;
pub use provider::{AnalysisProvider, AnalysisRequest, HttpAnalysisProvider, MockAnalysisProvider, RequestKind};
pub use service::AnalysisService;
pub use types::{AddedSugarDetection, Ingredient, NutritionalAnalysisResult, NutritionalInfo};
