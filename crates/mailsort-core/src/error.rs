//! Error types for mailsort

/// Result type alias using mailsort's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mailsort operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model or tokenizer artifacts are missing, unreadable, malformed,
    /// or incompatible with each other
    #[error("artifact load error: {0}")]
    ArtifactLoad(String),

    /// Tokenization or the forward pass failed
    #[error("inference error: {0}")]
    Inference(String),

    /// Input rejected before reaching the model
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new artifact load error
    pub fn artifact_load(msg: impl Into<String>) -> Self {
        Self::ArtifactLoad(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller sent something we refuse to process.
    ///
    /// Everything else is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Short, stable name of the variant, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArtifactLoad(_) => "artifact_load",
            Self::Inference(_) => "inference",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}
