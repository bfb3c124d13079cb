//! Keyword rules for weak labelling (Tier A)
//!
//! Bootstraps training data from unlabelled mail: a text gets the label of
//! the highest-precedence bucket whose keywords it contains. English and
//! Persian keywords are included.

use crate::classifier::{Classification, Classifier, ClassifierTier};
use crate::scoring::prediction_from_probabilities;
use aho_corasick::{AhoCorasick, MatchKind};
use mailsort_core::{Error, LabelSet, Result, UNKNOWN_LABEL};
use std::time::Instant;

const SUPPORT: &[&str] = &[
    "refund", "issue", "bug", "help", "complaint", "problem",
    "بازپرداخت", "مشکل", "خطا", "کمک", "شکایت", "مسئله",
];

const SALES: &[&str] = &[
    "price", "quotation", "buy", "cost", "discount",
    "قیمت", "پیش‌فاکتور", "خرید", "هزینه", "تخفیف",
];

const PARTNERSHIP: &[&str] = &[
    "collaboration", "partner", "joint venture", "synergy", "cooperate",
    "همکاری", "شریک", "سرمایه‌گذاری مشترک", "هم‌افزایی", "مشارکت",
];

const SPAM: &[&str] = &[
    "casino", "lottery", "viagra", "bitcoins", "winner", "free money",
    "کازینو", "لاتاری", "ویارا", "بیتکوین", "برنده", "کسب درآمد رایگان",
];

/// Highest-precision bucket first
const PRECEDENCE: [&str; 4] = ["spam", "support", "sales", "partnership"];

/// Lowercase and collapse runs of whitespace into single spaces
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub struct KeywordLabeler {
    name: String,
    labels: LabelSet,
    matcher: AhoCorasick,
    /// Label index for each pattern id in `matcher`
    pattern_labels: Vec<usize>,
}

impl KeywordLabeler {
    pub fn new() -> Result<Self> {
        Self::with_name("keyword-rules")
    }

    pub fn with_name(name: impl Into<String>) -> Result<Self> {
        let labels = LabelSet::default();
        let buckets = [
            ("support", SUPPORT),
            ("sales", SALES),
            ("partnership", PARTNERSHIP),
            ("spam", SPAM),
        ];

        let mut patterns = Vec::new();
        let mut pattern_labels = Vec::new();
        for (label, words) in buckets {
            let idx = labels.position(label).ok_or_else(|| {
                Error::internal(format!("keyword bucket '{label}' not in label set"))
            })?;
            for word in words {
                patterns.push(word.to_lowercase());
                pattern_labels.push(idx);
            }
        }

        // Substring semantics: every keyword occurrence counts, overlaps included.
        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .map_err(|e| Error::internal(format!("Failed to build keyword matcher: {e}")))?;

        Ok(Self {
            name: name.into(),
            labels,
            matcher,
            pattern_labels,
        })
    }

    /// Labels whose keywords appear in `text`, in label-set order
    pub fn matched_labels(&self, text: &str) -> Vec<&str> {
        let normalized = normalize(text);
        let mut hit = vec![false; self.labels.len()];
        for m in self.matcher.find_overlapping_iter(&normalized) {
            hit[self.pattern_labels[m.pattern().as_usize()]] = true;
        }

        self.labels
            .iter()
            .zip(hit)
            .filter_map(|(label, h)| h.then_some(label))
            .collect()
    }

    /// Weak label for `text`, or `None` when no keyword matches
    pub fn assign(&self, text: &str) -> Option<&'static str> {
        let matched = self.matched_labels(text);
        PRECEDENCE
            .iter()
            .copied()
            .find(|label| matched.contains(label))
    }
}

#[async_trait::async_trait]
impl Classifier for KeywordLabeler {
    async fn classify(&self, text: &str, confidence_threshold: f32) -> Result<Classification> {
        let start = Instant::now();

        let assigned = self.assign(text).and_then(|l| self.labels.position(l));

        // One-hot on the assigned label, uniform when nothing matched.
        let probabilities: Vec<f32> = match assigned {
            Some(winner) => (0..self.labels.len())
                .map(|idx| if idx == winner { 1.0 } else { 0.0 })
                .collect(),
            None => vec![1.0 / self.labels.len() as f32; self.labels.len()],
        };

        let mut prediction =
            prediction_from_probabilities(&self.labels, &probabilities, confidence_threshold)?;
        if assigned.is_none() {
            prediction.label = UNKNOWN_LABEL.to_string();
        }

        Ok(Classification {
            prediction,
            model: self.name.clone(),
            latency_us: start.elapsed().as_micros() as u64,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> ClassifierTier {
        ClassifierTier::A
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Need\n\tHELP   now "), "need help now");
    }

    #[test]
    fn test_assign_single_bucket() {
        let labeler = KeywordLabeler::new().unwrap();
        assert_eq!(labeler.assign("Can I get a REFUND please?"), Some("support"));
        assert_eq!(labeler.assign("What is the price for 10 seats?"), Some("sales"));
        assert_eq!(labeler.assign("Open to a joint\nventure?"), Some("partnership"));
        assert_eq!(labeler.assign("You are a WINNER"), Some("spam"));
    }

    #[test]
    fn test_assign_precedence() {
        let labeler = KeywordLabeler::new().unwrap();
        // spam beats support
        assert_eq!(labeler.assign("help, you won the lottery"), Some("spam"));
        // support beats sales
        assert_eq!(labeler.assign("problem with the discount code"), Some("support"));
        // sales beats partnership
        assert_eq!(labeler.assign("partner price list"), Some("sales"));
    }

    #[test]
    fn test_assign_persian() {
        let labeler = KeywordLabeler::new().unwrap();
        assert_eq!(labeler.assign("سلام، در پرداخت مشکل دارم"), Some("support"));
        assert_eq!(labeler.assign("قیمت محصول چقدر است؟"), Some("sales"));
    }

    #[test]
    fn test_assign_none() {
        let labeler = KeywordLabeler::new().unwrap();
        assert_eq!(labeler.assign("Lunch on Thursday?"), None);
        assert!(labeler.matched_labels("").is_empty());
    }

    #[test]
    fn test_matched_labels_in_label_order() {
        let labeler = KeywordLabeler::new().unwrap();
        assert_eq!(
            labeler.matched_labels("casino refund price synergy"),
            vec!["support", "sales", "partnership", "spam"]
        );
    }

    #[tokio::test]
    async fn test_classify_one_hot() {
        let labeler = KeywordLabeler::new().unwrap();
        let result = labeler.classify("Found a bug in the app", 0.5).await.unwrap();

        assert_eq!(result.label(), "support");
        assert_eq!(result.prediction.distribution.get("support"), Some(1.0));
        assert!((result.prediction.distribution.sum() - 1.0).abs() < 1e-6);
        assert_eq!(labeler.tier(), ClassifierTier::A);
    }

    #[tokio::test]
    async fn test_classify_no_match_is_unknown() {
        let labeler = KeywordLabeler::new().unwrap();
        let result = labeler.classify("See you at lunch", 0.0).await.unwrap();

        assert_eq!(result.label(), "unknown");
        assert_eq!(result.prediction.distribution.len(), 4);
    }
}
