//! HTTP surface for everything that is not a direct meal write.

pub mod actions;
pub mod foods;
pub mod profile;
pub mod summary;
