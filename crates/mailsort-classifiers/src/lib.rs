//! Mailsort Classifiers
//!
//! Email classification for inbound mail triage.
//!
//! Classifiers are organized into tiers based on latency budgets:
//! - Tier A (<2ms): Keyword rules used for weak labelling
//! - Tier B (<50ms): Quantized MiniLM transformer served through ONNX Runtime
//!
//! The model and tokenizer are loaded once per process and shared by every
//! caller; see [`model_loader`].

pub mod classifier;
pub mod keyword;
pub mod model_config;
pub mod model_loader;
pub mod predictor;
pub mod scoring;

pub use classifier::{Classification, Classifier, ClassifierTier};
pub use keyword::KeywordLabeler;
pub use model_config::{ArtifactPaths, ModelMetadata};
pub use model_loader::{
    get_artifacts, global_loader, ArtifactCache, ArtifactLoader, LoadedArtifacts,
};
pub use predictor::{predict, EmailClassifier, Predictor};
pub use scoring::{argmax, prediction_from_logits, softmax};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{Classification, Classifier};
    pub use crate::keyword::KeywordLabeler;
    pub use crate::model_config::ArtifactPaths;
    pub use crate::predictor::{EmailClassifier, Predictor};
}
