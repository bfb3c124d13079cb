//! Classifier trait and common types

use async_trait::async_trait;
use mailsort_core::{PredictionResult, Result};

/// Trait for all email classifiers
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the given text.
    ///
    /// A `confidence_threshold` of 0 returns the plain top-1 label.
    async fn classify(&self, text: &str, confidence_threshold: f32) -> Result<Classification>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Get the tier (performance category)
    fn tier(&self) -> ClassifierTier;
}

/// Prediction plus the bookkeeping the serving layer records
#[derive(Debug, Clone)]
pub struct Classification {
    /// Label and per-label distribution
    pub prediction: PredictionResult,

    /// Model name or version
    pub model: String,

    /// Latency in microseconds
    pub latency_us: u64,
}

impl Classification {
    pub fn label(&self) -> &str {
        &self.prediction.label
    }

    /// Check if the top probability reaches `threshold`
    pub fn exceeds_threshold(&self, threshold: f32) -> bool {
        self.prediction.top_probability() >= threshold
    }
}

/// Classifier performance tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierTier {
    /// Ultra-fast (<2ms) - keyword rules
    A,
    /// Fast (<50ms) - quantized transformer on CPU
    B,
}

impl ClassifierTier {
    /// Get the latency budget for this tier in microseconds
    pub fn latency_budget_us(&self) -> u64 {
        match self {
            Self::A => 2_000,
            Self::B => 50_000,
        }
    }
}
