//! mailsort Core
//!
//! Core types and error handling shared across mailsort components.
//!
//! This crate provides:
//! - The ordered [`LabelSet`] that maps model output indices to categories
//! - [`PredictionResult`] and its per-label [`Distribution`]
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Distribution, LabelSet, PredictionResult, DEFAULT_LABELS, UNKNOWN_LABEL};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{Distribution, LabelSet, PredictionResult, UNKNOWN_LABEL};
}
