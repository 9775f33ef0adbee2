//! Ingest API server library.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, Envelope};
pub use routes::create_router;
pub use state::AppState;
