//! Server configuration

use mailsort_classifiers::{ArtifactPaths, Predictor};
use mailsort_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::ServeArgs;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "mailsort.yaml";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Top-label probability below which the category becomes `unknown`
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Largest accepted email body, in bytes
    #[serde(default = "default_max_email_bytes")]
    pub max_email_bytes: usize,

    /// Shortest accepted email body, in characters
    #[serde(default = "default_min_email_chars")]
    pub min_email_chars: usize,

    /// Load the model before accepting traffic
    #[serde(default)]
    pub preload: bool,

    /// Artifact overrides; unset fields fall back to the environment
    #[serde(default)]
    pub model: ModelSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    pub model_path: Option<PathBuf>,
    pub tokenizer_dir: Option<PathBuf>,
    pub max_length: Option<usize>,
}

impl ModelSection {
    fn is_empty(&self) -> bool {
        self.model_path.is_none() && self.tokenizer_dir.is_none() && self.max_length.is_none()
    }
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(args: &ServeArgs) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config = serde_yaml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Apply CLI and environment overrides
    pub fn apply_overrides(&mut self, args: &ServeArgs) {
        if let Some(listen) = &args.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(threshold) = args.confidence_threshold {
            self.confidence_threshold = threshold;
        }
        if let Some(max_bytes) = args.max_email_bytes {
            self.max_email_bytes = max_bytes;
        }
        if args.preload {
            self.preload = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_email_bytes == 0 {
            return Err(Error::config("max_email_bytes must be greater than zero"));
        }
        if self.min_email_chars > self.max_email_bytes {
            return Err(Error::config(format!(
                "min_email_chars ({}) exceeds max_email_bytes ({})",
                self.min_email_chars, self.max_email_bytes
            )));
        }
        if self.model.max_length == Some(0) {
            return Err(Error::config("model.max_length must be greater than zero"));
        }
        Ok(())
    }

    /// Artifact paths when the config overrides any of them
    pub fn artifact_paths(&self) -> Option<ArtifactPaths> {
        if self.model.is_empty() {
            return None;
        }

        let mut paths = ArtifactPaths::from_env();
        if let Some(model_path) = &self.model.model_path {
            paths.model_path = model_path.clone();
        }
        if let Some(tokenizer_dir) = &self.model.tokenizer_dir {
            paths.tokenizer_dir = tokenizer_dir.clone();
        }
        if let Some(max_length) = self.model.max_length {
            paths.max_length = max_length;
        }
        Some(paths)
    }

    /// Predictor for the configured artifacts, sharing the process-wide
    /// loader unless the config points elsewhere
    pub fn predictor(&self) -> Predictor {
        match self.artifact_paths() {
            Some(paths) => Predictor::from_paths(paths),
            None => Predictor::global(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            confidence_threshold: default_confidence_threshold(),
            max_email_bytes: default_max_email_bytes(),
            min_email_chars: default_min_email_chars(),
            preload: false,
            model: ModelSection::default(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_max_email_bytes() -> usize {
    4096
}

fn default_min_email_chars() -> usize {
    10
}
