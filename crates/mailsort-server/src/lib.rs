//! Mailsort Server
//!
//! HTTP boundary around the email classifier: request validation, the
//! confidence threshold, JSON responses and Prometheus metrics.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use routes::{create_router, AppError, PredictRequest, PredictResponse};
pub use state::AppState;
