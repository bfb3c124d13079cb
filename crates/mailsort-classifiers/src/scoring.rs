//! Logits to calibrated prediction: softmax, argmax, confidence threshold

use mailsort_core::{Distribution, Error, LabelSet, PredictionResult, Result, UNKNOWN_LABEL};

/// Numerically stable softmax.
///
/// Subtracting the maximum logit before exponentiating keeps `exp` from
/// overflowing, so shifting every logit by a constant leaves the result
/// unchanged.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the lowest index wins on ties.
///
/// NaN never beats a real number. Returns `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &v) in values.iter().enumerate() {
        match best {
            None => best = Some((idx, v)),
            Some((_, bv)) if v > bv || (bv.is_nan() && !v.is_nan()) => best = Some((idx, v)),
            Some(_) => {}
        }
    }
    best.map(|(idx, _)| idx)
}

/// Demote `candidate` to `unknown` when the threshold is active and the top
/// probability falls strictly below it.
pub fn apply_threshold<'a>(candidate: &'a str, top_probability: f32, threshold: f32) -> &'a str {
    if threshold > 0.0 && top_probability < threshold {
        UNKNOWN_LABEL
    } else {
        candidate
    }
}

/// Reject thresholds outside `[0, 1]`
pub fn validate_threshold(threshold: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::validation(format!(
            "confidence threshold must be within [0, 1], got {threshold}"
        )));
    }
    Ok(())
}

/// Turn one logit vector into a thresholded prediction.
pub fn prediction_from_logits(
    labels: &LabelSet,
    logits: &[f32],
    threshold: f32,
) -> Result<PredictionResult> {
    validate_threshold(threshold)?;

    if logits.iter().any(|x| !x.is_finite()) {
        return Err(Error::inference("model produced non-finite logits"));
    }

    let probabilities = softmax(logits);
    let distribution = Distribution::new(labels, &probabilities)?;

    let idx = argmax(&probabilities).ok_or_else(|| Error::inference("model produced no scores"))?;
    let candidate = labels
        .get(idx)
        .ok_or_else(|| Error::inference(format!("argmax index {idx} outside label set")))?;

    let label = apply_threshold(candidate, probabilities[idx], threshold).to_string();

    Ok(PredictionResult {
        label,
        distribution,
    })
}

/// Prediction built directly from probabilities, used where no logits exist
/// (keyword rules) and by tests exercising the threshold in isolation.
pub fn prediction_from_probabilities(
    labels: &LabelSet,
    probabilities: &[f32],
    threshold: f32,
) -> Result<PredictionResult> {
    validate_threshold(threshold)?;

    let distribution = Distribution::new(labels, probabilities)?;
    let idx = argmax(probabilities).ok_or_else(|| Error::inference("no scores"))?;
    let candidate = labels
        .get(idx)
        .ok_or_else(|| Error::inference(format!("argmax index {idx} outside label set")))?;

    Ok(PredictionResult {
        label: apply_threshold(candidate, probabilities[idx], threshold).to_string(),
        distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_softmax_known_values() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert_close(&probs, &[0.090_030_57, 0.244_728_48, 0.665_240_94], 1e-6);
    }

    #[test]
    fn test_softmax_large_logits_do_not_overflow() {
        let probs = softmax(&[1000.0, 1001.0, 1002.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert_close(&probs, &softmax(&[0.0, 1.0, 2.0]), 1e-6);
    }

    #[test]
    fn test_softmax_empty() {
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn test_argmax_ties_pick_first() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax(&[0.25; 4]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_ignores_nan() {
        assert_eq!(argmax(&[f32::NAN, 0.1, 0.3]), Some(2));
    }

    #[test]
    fn test_threshold_demotes_low_confidence() {
        let labels = LabelSet::default();
        let result =
            prediction_from_probabilities(&labels, &[0.40, 0.30, 0.20, 0.10], 0.50).unwrap();

        assert_eq!(result.label, UNKNOWN_LABEL);
        assert_eq!(result.distribution.len(), 4);
        assert_eq!(result.distribution.get("support"), Some(0.40));
        assert_eq!(result.distribution.get(UNKNOWN_LABEL), None);
    }

    #[test]
    fn test_threshold_keeps_confident_label() {
        let labels = LabelSet::default();
        let result =
            prediction_from_probabilities(&labels, &[0.10, 0.60, 0.20, 0.10], 0.50).unwrap();
        assert_eq!(result.label, "sales");
    }

    #[test]
    fn test_threshold_equal_is_not_demoted() {
        assert_eq!(apply_threshold("spam", 0.5, 0.5), "spam");
        assert_eq!(apply_threshold("spam", 0.1, 0.0), "spam");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let labels = LabelSet::default();
        let logits = [0.0, 0.0, 0.0, 0.0];
        assert!(prediction_from_logits(&labels, &logits, 1.5).is_err());
        assert!(prediction_from_logits(&labels, &logits, -0.1).is_err());
        assert!(prediction_from_logits(&labels, &logits, f32::NAN).is_err());
    }

    #[test]
    fn test_logit_count_must_match_labels() {
        let labels = LabelSet::default();
        let err = prediction_from_logits(&labels, &[1.0, 2.0], 0.0).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_non_finite_logits_rejected() {
        let labels = LabelSet::default();
        let err = prediction_from_logits(&labels, &[1.0, f32::NAN, 0.0, 0.0], 0.0).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    fn logits_strategy() -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-50.0f32..50.0, 4)
    }

    proptest! {
        #[test]
        fn prop_distribution_is_valid(logits in logits_strategy()) {
            let labels = LabelSet::default();
            let result = prediction_from_logits(&labels, &logits, 0.0).unwrap();

            prop_assert!(labels.contains(&result.label));
            prop_assert!((result.distribution.sum() - 1.0).abs() < 1e-5);
            for (_, p) in result.distribution.iter() {
                prop_assert!((0.0..=1.0).contains(&p));
            }
        }

        #[test]
        fn prop_softmax_shift_invariant(logits in logits_strategy(), shift in -1000.0f32..1000.0) {
            let shifted: Vec<f32> = logits.iter().map(|x| x + shift).collect();
            let a = softmax(&logits);
            let b = softmax(&shifted);
            for (x, y) in a.iter().zip(&b) {
                // f32 loses absolute precision in the shifted logits themselves
                prop_assert!((x - y).abs() < 1e-3);
            }
        }

        #[test]
        fn prop_threshold_is_monotonic(
            logits in logits_strategy(),
            low in 0.0f32..=1.0,
            high in 0.0f32..=1.0,
        ) {
            let (low, high) = if low <= high { (low, high) } else { (high, low) };
            let labels = LabelSet::default();

            let loose = prediction_from_logits(&labels, &logits, low).unwrap();
            let strict = prediction_from_logits(&labels, &logits, high).unwrap();

            prop_assert_eq!(&loose.distribution, &strict.distribution);
            if loose.is_unknown() {
                prop_assert!(strict.is_unknown());
            }
            if !strict.is_unknown() {
                prop_assert_eq!(&strict.label, &loose.label);
            }
        }

        #[test]
        fn prop_deterministic(logits in logits_strategy(), threshold in 0.0f32..=1.0) {
            let labels = LabelSet::default();
            let a = prediction_from_logits(&labels, &logits, threshold).unwrap();
            let b = prediction_from_logits(&labels, &logits, threshold).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
