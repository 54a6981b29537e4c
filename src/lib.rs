// src/lib.rs
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod quote;
pub mod views;

pub use api::{routes, AppState};
pub use config::Config;
pub use error::AppError;
