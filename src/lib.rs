//! Bibliotheca Library Management System
//!
//! REST JSON API server for managing a library catalog, its physical copies,
//! circulation (loans, reservations, fines), member notifications and an
//! append-only audit trail.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod mediator;
pub mod models;
pub mod repository;
pub mod services;
pub mod sweeper;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
