pub mod analysis;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod foods;
pub mod gl;
pub mod meals;
pub mod pending;
pub mod profiles;
pub mod routes;
pub mod state;
pub mod storage;
pub mod summary;
