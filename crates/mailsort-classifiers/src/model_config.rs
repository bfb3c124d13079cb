//! Artifact locations and model metadata

use mailsort_core::{Error, LabelSet, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the quantized model path
pub const MODEL_PATH_ENV: &str = "ONNX_MODEL_PATH";

/// Environment variable overriding the tokenizer directory
pub const TOKENIZER_DIR_ENV: &str = "TOKENIZER_DIR";

/// Environment variable overriding the token truncation length
pub const MAX_LENGTH_ENV: &str = "MAX_TOKEN_LENGTH";

/// Where the export pipeline writes the INT8 model
pub const DEFAULT_MODEL_PATH: &str = "models/minilm-int8.onnx";

/// Where the fine-tuning pipeline saves the tokenizer bundle
pub const DEFAULT_TOKENIZER_DIR: &str = "models/minilm-epoch3";

/// Longest token sequence fed to the model; the rest is dropped
pub const DEFAULT_MAX_LENGTH: usize = 256;

/// Filesystem locations of the model and tokenizer, plus tokenization knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Quantized ONNX model file
    pub model_path: PathBuf,

    /// Directory holding `tokenizer.json` and optionally `config.json`
    pub tokenizer_dir: PathBuf,

    /// Truncation length in tokens
    pub max_length: usize,

    /// Feed `token_type_ids` (BERT-style exports expect it)
    pub use_token_type_ids: bool,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            tokenizer_dir: PathBuf::from(DEFAULT_TOKENIZER_DIR),
            max_length: DEFAULT_MAX_LENGTH,
            use_token_type_ids: true,
        }
    }
}

impl ArtifactPaths {
    /// Create paths for an explicit model file and tokenizer directory
    pub fn new(model_path: impl Into<PathBuf>, tokenizer_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            tokenizer_dir: tokenizer_dir.into(),
            ..Default::default()
        }
    }

    /// Defaults, overridden by `ONNX_MODEL_PATH`, `TOKENIZER_DIR` and
    /// `MAX_TOKEN_LENGTH` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut paths = Self::default();

        if let Some(path) = lookup(MODEL_PATH_ENV).filter(|v| !v.is_empty()) {
            paths.model_path = PathBuf::from(path);
        }

        if let Some(dir) = lookup(TOKENIZER_DIR_ENV).filter(|v| !v.is_empty()) {
            paths.tokenizer_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup(MAX_LENGTH_ENV) {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => paths.max_length = n,
                _ => tracing::warn!(
                    value = %raw,
                    "ignoring invalid {}, using {}",
                    MAX_LENGTH_ENV,
                    paths.max_length
                ),
            }
        }

        paths
    }

    /// Set truncation length
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Enable or disable the `token_type_ids` input
    pub fn with_token_type_ids(mut self, enable: bool) -> Self {
        self.use_token_type_ids = enable;
        self
    }

    /// Path to the serialized tokenizer
    pub fn tokenizer_file(&self) -> PathBuf {
        self.tokenizer_dir.join("tokenizer.json")
    }

    /// Path to the Hugging Face model config saved next to the tokenizer
    pub fn model_config_file(&self) -> PathBuf {
        self.tokenizer_dir.join("config.json")
    }

    /// Basic existence checks, run before any expensive loading
    pub fn check_exists(&self) -> Result<()> {
        if !self.model_path.is_file() {
            return Err(Error::artifact_load(format!(
                "model file not found: {}",
                self.model_path.display()
            )));
        }
        if !self.tokenizer_dir.is_dir() {
            return Err(Error::artifact_load(format!(
                "tokenizer directory not found: {}",
                self.tokenizer_dir.display()
            )));
        }
        if !self.tokenizer_file().is_file() {
            return Err(Error::artifact_load(format!(
                "tokenizer.json not found in {}",
                self.tokenizer_dir.display()
            )));
        }
        if self.max_length == 0 {
            return Err(Error::config("max_length must be greater than zero"));
        }
        Ok(())
    }
}

/// Subset of the Hugging Face `config.json` we rely on
#[derive(Debug, Clone, Default, Deserialize)]
struct HfModelConfig {
    #[serde(default)]
    id2label: HashMap<String, String>,

    #[serde(default)]
    vocab_size: Option<usize>,
}

/// Label order and vocabulary size persisted next to the tokenizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Index-aligned labels
    pub labels: LabelSet,

    /// Vocabulary size the model was trained with, if recorded
    pub vocab_size: Option<usize>,

    /// Whether `labels` came from `config.json` rather than the defaults
    pub labels_from_config: bool,
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            labels: LabelSet::default(),
            vocab_size: None,
            labels_from_config: false,
        }
    }
}

impl ModelMetadata {
    /// Read `config.json` from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no model config, using default labels");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::artifact_load(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_json(&contents)
            .map_err(|e| Error::artifact_load(format!("{}: {}", path.display(), e)))
    }

    /// Parse metadata from the text of a Hugging Face `config.json`
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: HfModelConfig = serde_json::from_str(contents)?;

        let labels = labels_from_id2label(&config.id2label)?;
        let labels_from_config = labels.is_some();

        Ok(Self {
            labels: labels.unwrap_or_default(),
            vocab_size: config.vocab_size,
            labels_from_config,
        })
    }
}

/// Order `id2label` by numeric id.
///
/// Returns `None` when the mapping is absent or only holds the generic
/// `LABEL_<n>` names the trainer emits when no labels were given.
fn labels_from_id2label(id2label: &HashMap<String, String>) -> Result<Option<LabelSet>> {
    if id2label.is_empty() {
        return Ok(None);
    }

    let mut indexed = Vec::with_capacity(id2label.len());
    for (id, label) in id2label {
        let idx: usize = id
            .parse()
            .map_err(|_| Error::config(format!("id2label key '{id}' is not an integer")))?;
        indexed.push((idx, label.clone()));
    }
    indexed.sort_by_key(|(idx, _)| *idx);

    for (expected, (idx, _)) in indexed.iter().enumerate() {
        if *idx != expected {
            return Err(Error::config(format!(
                "id2label ids must be contiguous from 0, missing id {expected}"
            )));
        }
    }

    let generic = indexed
        .iter()
        .all(|(idx, label)| *label == format!("LABEL_{idx}"));
    if generic {
        if indexed.len() != LabelSet::default().len() {
            return Err(Error::config(format!(
                "model config declares {} generic labels, default label set has {}",
                indexed.len(),
                LabelSet::default().len()
            )));
        }
        return Ok(None);
    }

    LabelSet::new(indexed.into_iter().map(|(_, label)| label)).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let paths = ArtifactPaths::default();
        assert_eq!(paths.model_path, PathBuf::from("models/minilm-int8.onnx"));
        assert_eq!(paths.tokenizer_dir, PathBuf::from("models/minilm-epoch3"));
        assert_eq!(paths.max_length, 256);
        assert!(paths.use_token_type_ids);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (MODEL_PATH_ENV, "/srv/model.onnx"),
            (TOKENIZER_DIR_ENV, "/srv/tok"),
            (MAX_LENGTH_ENV, "128"),
        ]
        .into_iter()
        .collect();

        let paths = ArtifactPaths::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(paths.model_path, PathBuf::from("/srv/model.onnx"));
        assert_eq!(paths.tokenizer_dir, PathBuf::from("/srv/tok"));
        assert_eq!(paths.max_length, 128);
    }

    #[test]
    fn test_invalid_max_length_keeps_default() {
        let paths = ArtifactPaths::from_lookup(|k| {
            (k == MAX_LENGTH_ENV).then(|| "lots".to_string())
        });
        assert_eq!(paths.max_length, DEFAULT_MAX_LENGTH);
    }

    #[test]
    fn test_check_exists_reports_missing_model() {
        let paths = ArtifactPaths::new("/definitely/not/here.onnx", "/nope");
        let err = paths.check_exists().unwrap_err();
        assert!(matches!(err, Error::ArtifactLoad(_)));
        assert!(err.to_string().contains("here.onnx"));
    }

    #[test]
    fn test_metadata_id2label_order() {
        let json = r#"{
            "architectures": ["BertForSequenceClassification"],
            "id2label": {"2": "partnership", "0": "support", "3": "spam", "1": "sales"},
            "vocab_size": 30522
        }"#;

        let meta = ModelMetadata::from_json(json).unwrap();
        assert!(meta.labels_from_config);
        assert_eq!(meta.labels, LabelSet::default());
        assert_eq!(meta.vocab_size, Some(30522));
    }

    #[test]
    fn test_metadata_generic_labels_fall_back() {
        let json =
            r#"{"id2label": {"0": "LABEL_0", "1": "LABEL_1", "2": "LABEL_2", "3": "LABEL_3"}}"#;
        let meta = ModelMetadata::from_json(json).unwrap();
        assert!(!meta.labels_from_config);
        assert_eq!(meta.labels, LabelSet::default());
    }

    #[test]
    fn test_metadata_generic_labels_wrong_count() {
        let json = r#"{"id2label": {"0": "LABEL_0", "1": "LABEL_1"}}"#;
        assert!(ModelMetadata::from_json(json).is_err());
    }

    #[test]
    fn test_metadata_gap_in_ids() {
        let json = r#"{"id2label": {"0": "support", "2": "sales"}}"#;
        assert!(ModelMetadata::from_json(json).is_err());
    }

    #[test]
    fn test_metadata_missing_file() {
        let meta = ModelMetadata::load(Path::new("/no/such/config.json")).unwrap();
        assert_eq!(meta, ModelMetadata::default());
    }
}
