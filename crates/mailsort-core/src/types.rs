//! Core types for mailsort

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// Label returned when no category clears the confidence threshold.
///
/// Never a member of a [`LabelSet`] and never a key of a [`Distribution`].
pub const UNKNOWN_LABEL: &str = "unknown";

/// Category order the bundled model was fine-tuned with.
pub const DEFAULT_LABELS: [&str; 4] = ["support", "sales", "partnership", "spam"];

/// Ordered category names, index-aligned with the model's output layer.
///
/// Reordering this without retraining silently corrupts every prediction,
/// so it is built once from model metadata and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Create a label set, rejecting empty, duplicate or reserved names
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();

        if labels.is_empty() {
            return Err(Error::config("label set must not be empty"));
        }

        for (idx, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(Error::config(format!("label at index {idx} is blank")));
            }
            if label == UNKNOWN_LABEL {
                return Err(Error::config(format!(
                    "'{UNKNOWN_LABEL}' is reserved for below-threshold results"
                )));
            }
            if labels[..idx].contains(label) {
                return Err(Error::config(format!("duplicate label '{label}'")));
            }
        }

        Ok(Self { labels })
    }

    /// Number of labels (equals the model's output dimension)
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when there are no labels; never the case for a constructed set
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label at output index `idx`
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    /// Output index of `label`
    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.position(label).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Per-label probabilities, in [`LabelSet`] order.
///
/// Serializes as a JSON object keyed by label, preserving label order.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    entries: Vec<(String, f32)>,
}

impl Distribution {
    /// Pair each label with its probability.
    ///
    /// Fails when the lengths differ, which means the model and the label
    /// set disagree about the output dimension.
    pub fn new(labels: &LabelSet, probabilities: &[f32]) -> Result<Self> {
        if labels.len() != probabilities.len() {
            return Err(Error::inference(format!(
                "model produced {} scores but the label set has {} labels",
                probabilities.len(),
                labels.len()
            )));
        }

        let entries = labels
            .iter()
            .zip(probabilities)
            .map(|(label, &p)| (label.to_string(), p))
            .collect();

        Ok(Self { entries })
    }

    /// Probability of `label`, if it belongs to the label set
    pub fn get(&self, label: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest-probability entry; the first one wins on ties
    pub fn top(&self) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (label, p) in self.iter() {
            match best {
                Some((_, bp)) if p <= bp => {}
                _ => best = Some((label, p)),
            }
        }
        best
    }

    /// Sum of all probabilities (1.0 up to rounding for softmax output)
    pub fn sum(&self) -> f32 {
        self.entries.iter().map(|(_, p)| p).sum()
    }
}

impl Serialize for Distribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, p) in &self.entries {
            map.serialize_entry(label, p)?;
        }
        map.end()
    }
}

/// Outcome of classifying one email body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// A [`LabelSet`] member, or [`UNKNOWN_LABEL`]
    pub label: String,

    /// Original per-label probabilities, unaffected by thresholding
    pub distribution: Distribution,
}

impl PredictionResult {
    /// Probability of the most likely label
    pub fn top_probability(&self) -> f32 {
        self.distribution.top().map(|(_, p)| p).unwrap_or(0.0)
    }

    /// Whether the result was demoted below the confidence threshold
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_label_order() {
        let labels = LabelSet::default();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels.get(0), Some("support"));
        assert_eq!(labels.get(3), Some("spam"));
        assert_eq!(labels.position("partnership"), Some(2));
        assert!(!labels.contains(UNKNOWN_LABEL));
    }

    #[test]
    fn test_label_set_rejects_invalid() {
        assert!(LabelSet::new(Vec::<String>::new()).is_err());
        assert!(LabelSet::new(["support", "support"]).is_err());
        assert!(LabelSet::new(["support", "unknown"]).is_err());
        assert!(LabelSet::new(["support", " "]).is_err());
        assert!(LabelSet::new(["a", "b"]).is_ok());
    }

    #[test]
    fn test_constructed_label_sets_are_never_empty() {
        assert!(!LabelSet::default().is_empty());
        assert!(!LabelSet::new(["spam"]).unwrap().is_empty());
    }

    #[test]
    fn test_distribution_length_mismatch() {
        let labels = LabelSet::default();
        let err = Distribution::new(&labels, &[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_distribution_top_prefers_first_on_tie() {
        let labels = LabelSet::default();
        let dist = Distribution::new(&labels, &[0.1, 0.4, 0.4, 0.1]).unwrap();
        assert_eq!(dist.top(), Some(("sales", 0.4)));
        assert!((dist.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_distribution_serializes_in_label_order() {
        let labels = LabelSet::default();
        let dist = Distribution::new(&labels, &[0.25, 0.5, 0.125, 0.125]).unwrap();
        let json = serde_json::to_string(&dist).unwrap();
        assert_eq!(
            json,
            r#"{"support":0.25,"sales":0.5,"partnership":0.125,"spam":0.125}"#
        );
    }

    #[test]
    fn test_prediction_result_helpers() {
        let labels = LabelSet::default();
        let result = PredictionResult {
            label: UNKNOWN_LABEL.to_string(),
            distribution: Distribution::new(&labels, &[0.4, 0.3, 0.2, 0.1]).unwrap(),
        };
        assert!(result.is_unknown());
        assert!((result.top_probability() - 0.4).abs() < f32::EPSILON);
    }
}
