//! Single-text inference: tokenize, run the cached session, score

use async_trait::async_trait;
use mailsort_core::{Error, PredictionResult, Result};
use ort::value::Tensor;
use std::sync::Arc;
use std::time::Instant;

use crate::classifier::{Classification, Classifier, ClassifierTier};
use crate::model_config::ArtifactPaths;
use crate::model_loader::{global_loader, shared_global_loader, ArtifactLoader, LoadedArtifacts};
use crate::scoring::{prediction_from_logits, validate_threshold};

impl LoadedArtifacts {
    /// Raw per-label scores for `text`.
    ///
    /// Input longer than the configured token limit is truncated without
    /// error. Empty text is still tokenized and run.
    pub fn logits(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::inference(format!("tokenization failed: {e}")))?;

        if !encoding.get_overflowing().is_empty() {
            tracing::debug!(
                max_length = self.paths().max_length,
                "input truncated to token limit"
            );
        }

        let seq_len = encoding.get_ids().len();
        let shape = [1_i64, seq_len as i64];

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();

        let ids_tensor = Tensor::from_array((shape, input_ids.into_boxed_slice()))
            .map_err(|e| Error::inference(format!("failed to build input_ids tensor: {e}")))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.into_boxed_slice()))
            .map_err(|e| Error::inference(format!("failed to build attention_mask tensor: {e}")))?;
        let type_tensor = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))
            .map_err(|e| Error::inference(format!("failed to build token_type_ids tensor: {e}")))?;

        let mut session = self.session.lock();
        let outputs = if self.paths().use_token_type_ids {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])
        }
        .map_err(|e| Error::inference(format!("forward pass failed: {e}")))?;

        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::inference(format!("failed to read logits: {e}")))?;
        let dims: &[i64] = output_shape;

        let num_labels = self.labels().len();
        let well_formed = match dims {
            [n] => *n as usize == num_labels,
            [1, n] => *n as usize == num_labels,
            _ => false,
        };
        if !well_formed || output_data.len() != num_labels {
            return Err(Error::inference(format!(
                "unexpected output shape {dims:?}, expected [1, {num_labels}]"
            )));
        }

        Ok(output_data.to_vec())
    }

    /// Classify `text`, demoting to `unknown` below `confidence_threshold`
    pub fn predict(&self, text: &str, confidence_threshold: f32) -> Result<PredictionResult> {
        let logits = self.logits(text)?;
        prediction_from_logits(self.labels(), &logits, confidence_threshold)
    }
}

/// Classifies email bodies with the cached model for one set of artifacts
#[derive(Clone)]
pub struct Predictor {
    loader: Arc<ArtifactLoader>,
}

impl Predictor {
    pub fn new(loader: Arc<ArtifactLoader>) -> Self {
        Self { loader }
    }

    /// Predictor sharing the process-wide loader
    pub fn global() -> Self {
        Self::new(shared_global_loader())
    }

    /// Predictor with its own loader for `paths`
    pub fn from_paths(paths: ArtifactPaths) -> Self {
        Self::new(Arc::new(ArtifactLoader::new(paths)))
    }

    pub fn loader(&self) -> &ArtifactLoader {
        &self.loader
    }

    /// Classify `text`.
    ///
    /// Loads the artifacts on first use; load and inference failures
    /// propagate, never a default label.
    pub fn predict(&self, text: &str, confidence_threshold: f32) -> Result<PredictionResult> {
        validate_threshold(confidence_threshold)?;
        let artifacts = self.loader.get()?;
        artifacts.predict(text, confidence_threshold)
    }
}

/// Classify `text` with the process-wide artifacts from [`global_loader`]
pub fn predict(text: &str, confidence_threshold: f32) -> Result<PredictionResult> {
    validate_threshold(confidence_threshold)?;
    let artifacts = global_loader().get()?;
    artifacts.predict(text, confidence_threshold)
}

/// [`Classifier`] backed by the quantized transformer.
///
/// Inference is CPU-bound, so it runs on the blocking thread pool.
pub struct EmailClassifier {
    name: String,
    predictor: Predictor,
}

impl EmailClassifier {
    pub fn new(predictor: Predictor) -> Self {
        Self::with_name("minilm-email", predictor)
    }

    pub fn with_name(name: impl Into<String>, predictor: Predictor) -> Self {
        Self {
            name: name.into(),
            predictor,
        }
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }
}

#[async_trait]
impl Classifier for EmailClassifier {
    async fn classify(&self, text: &str, confidence_threshold: f32) -> Result<Classification> {
        let start = Instant::now();
        let predictor = self.predictor.clone();
        let text = text.to_owned();

        let prediction =
            tokio::task::spawn_blocking(move || predictor.predict(&text, confidence_threshold))
                .await
                .map_err(|e| Error::internal(format!("inference task failed: {e}")))??;

        let latency_us = start.elapsed().as_micros() as u64;
        tracing::debug!(
            label = %prediction.label,
            top_probability = prediction.top_probability(),
            latency_us,
            "classified email"
        );

        Ok(Classification {
            prediction,
            model: self.name.clone(),
            latency_us,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> ClassifierTier {
        ClassifierTier::B
    }
}
