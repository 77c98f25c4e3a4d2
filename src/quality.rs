//! Quality scoring for pattern output.
//!
//! All scores are deterministic text heuristics: placeholders with the right
//! shape, not language understanding.  What matters is the contract: bounded
//! sub-scores with optional deficiency reasons, a pessimistic min-aggregate
//! confidence, and a `fallback_reason` that concatenates every complaint.
//!
//! The evaluator is a pure function of its inputs and holds no state between
//! calls.  It sits behind the [`Evaluator`] trait so callers (and tests) can
//! substitute a constant-scoring implementation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::patterns::split_sentences;

// ---------------------------------------------------------------------------
// MetricScore
// ---------------------------------------------------------------------------

/// A single metric: a numeric score in [0, 1], or null with a reason when the
/// dimension could not be scored at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricScore {
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MetricScore {
    pub fn clean(score: f64) -> Self {
        Self {
            score: Some(score),
            reason: None,
        }
    }

    pub fn flagged(score: f64, reason: impl Into<String>) -> Self {
        Self {
            score: Some(score),
            reason: Some(reason.into()),
        }
    }

    pub fn unscorable(reason: impl Into<String>) -> Self {
        Self {
            score: None,
            reason: Some(reason.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// QualityReport
// ---------------------------------------------------------------------------

/// The full result of one evaluation.
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub metrics: BTreeMap<String, MetricScore>,
    /// Minimum of the numeric sub-confidences; any weak dimension caps the
    /// whole report.
    pub confidence: f64,
    /// All non-empty per-dimension reasons joined with "; ".  Absent when
    /// every dimension is clean.
    pub fallback_reason: Option<String>,
}

impl QualityReport {
    /// Build a report from metrics, deriving confidence and fallback_reason.
    pub fn from_metrics(metrics: BTreeMap<String, MetricScore>) -> Self {
        let confidence = metrics
            .values()
            .filter_map(|m| m.score)
            .fold(f64::INFINITY, f64::min);
        let confidence = if confidence.is_finite() { confidence } else { 0.0 };
        let reasons: Vec<&str> = metrics
            .values()
            .filter_map(|m| m.reason.as_deref())
            .filter(|r| !r.is_empty())
            .collect();
        let fallback_reason = if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("; "))
        };
        Self {
            metrics,
            confidence,
            fallback_reason,
        }
    }

    /// True when any numeric metric sits below `threshold`.
    pub fn any_below(&self, threshold: f64) -> bool {
        self.metrics
            .values()
            .any(|m| m.score.map_or(false, |s| s < threshold))
    }
}

// ---------------------------------------------------------------------------
// Evaluator trait
// ---------------------------------------------------------------------------

/// Scores a text produced by a named pattern.
pub trait Evaluator {
    fn evaluate(&self, text: &str, pattern_name: &str) -> QualityReport;
}

// ---------------------------------------------------------------------------
// QualityEvaluator — the heuristic implementation
// ---------------------------------------------------------------------------

/// Static per-pattern base effectiveness.  Unknown patterns score 0.5.
const EFFECTIVENESS_TABLE: &[(&str, f64)] = &[
    ("StepwiseInsightSynthesis", 0.88),
    ("PatternCritiqueThenRewrite", 0.9),
    ("ContrastiveExpansion", 0.82),
    ("AudienceReframe", 0.85),
    ("PlainLanguageRewrite", 0.86),
    ("StructuredOutline", 0.84),
    ("EvidenceAnnotation", 0.8),
    ("TerseSummary", 0.87),
];

pub struct QualityEvaluator;

impl QualityEvaluator {
    fn clarity(text: &str) -> MetricScore {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return MetricScore::unscorable("no output produced");
        }
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        if words.len() < 3 {
            return MetricScore::flagged(0.5, "output too short to assess");
        }
        let sentences = split_sentences(trimmed);
        let avg_sentence_len = if sentences.is_empty() {
            words.len() as f64
        } else {
            words.len() as f64 / sentences.len() as f64
        };
        let avg_word_len =
            words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / words.len() as f64;

        let mut score: f64 = 0.92;
        let mut reasons: Vec<&str> = Vec::new();
        if avg_sentence_len > 30.0 {
            score -= 0.35;
            reasons.push("sentences run long");
        }
        if avg_word_len > 9.0 {
            score -= 0.2;
            reasons.push("vocabulary is dense");
        }
        let score = score.clamp(0.0, 1.0);
        match reasons.is_empty() {
            true => MetricScore::clean(score),
            false => MetricScore::flagged(score, reasons.join(", ")),
        }
    }

    fn innovation(text: &str) -> MetricScore {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            return MetricScore::unscorable("no output produced");
        }
        let unique: std::collections::HashSet<&String> = words.iter().collect();
        let diversity = unique.len() as f64 / words.len() as f64;
        let score = (0.4 + 0.6 * diversity).clamp(0.0, 1.0);
        if diversity < 0.4 {
            MetricScore::flagged(score, "vocabulary repetitive")
        } else {
            MetricScore::clean(score)
        }
    }

    fn pattern_fit(text: &str, pattern_name: &str) -> MetricScore {
        let found = match pattern_name {
            "StepwiseInsightSynthesis" => text.contains("Step 1:"),
            "PatternCritiqueThenRewrite" => {
                text.contains("Critique:") && text.contains("Rewrite:")
            }
            "ContrastiveExpansion" => {
                text.contains("On one hand") && text.contains("On the other hand")
            }
            "AudienceReframe" => text.contains("In plain terms"),
            "PlainLanguageRewrite" => {
                !["utilize", "leverage", "facilitate", "commence"]
                    .iter()
                    .any(|w| text.to_lowercase().contains(w))
            }
            "StructuredOutline" => text.lines().any(|l| l.trim_start().starts_with("- ")),
            "EvidenceAnnotation" => text.contains("[evidence:"),
            "TerseSummary" => split_sentences(text).len() <= 3 && text.chars().count() <= 400,
            _ => return MetricScore::clean(0.7),
        };
        if found {
            MetricScore::clean(0.9)
        } else {
            MetricScore::flagged(
                0.55,
                format!("expected markers of {} not found", pattern_name),
            )
        }
    }

    fn effectiveness(pattern_name: &str) -> MetricScore {
        let base = EFFECTIVENESS_TABLE
            .iter()
            .find(|(name, _)| *name == pattern_name)
            .map(|(_, v)| *v)
            .unwrap_or(0.5);
        MetricScore::clean(base)
    }
}

impl Evaluator for QualityEvaluator {
    fn evaluate(&self, text: &str, pattern_name: &str) -> QualityReport {
        let mut metrics = BTreeMap::new();
        metrics.insert("clarity".to_string(), Self::clarity(text));
        metrics.insert("innovation".to_string(), Self::innovation(text));
        metrics.insert(
            "pattern_fit".to_string(),
            Self::pattern_fit(text, pattern_name),
        );
        metrics.insert(
            "pattern_effectiveness".to_string(),
            Self::effectiveness(pattern_name),
        );
        QualityReport::from_metrics(metrics)
    }
}

// ---------------------------------------------------------------------------
// ConstantEvaluator — fabricates one flat score for every dimension
// ---------------------------------------------------------------------------

/// An evaluator that reports the same score on every dimension.  Used for
/// gate calibration and as a deterministic stand-in under test.
pub struct ConstantEvaluator(pub f64);

impl Evaluator for ConstantEvaluator {
    fn evaluate(&self, _text: &str, _pattern_name: &str) -> QualityReport {
        let mut metrics = BTreeMap::new();
        for name in ["clarity", "innovation", "pattern_fit", "pattern_effectiveness"] {
            metrics.insert(name.to_string(), MetricScore::clean(self.0));
        }
        QualityReport::from_metrics(metrics)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternKind;

    fn evaluate(text: &str, pattern: &str) -> QualityReport {
        QualityEvaluator.evaluate(text, pattern)
    }

    // -- MetricScore --

    #[test]
    fn test_metric_score_serializes_null_score() {
        let m = MetricScore::unscorable("no output produced");
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"score\":null"));
        assert!(json.contains("no output produced"));
    }

    #[test]
    fn test_metric_score_clean_omits_reason() {
        let json = serde_json::to_string(&MetricScore::clean(0.8)).unwrap();
        assert!(!json.contains("reason"));
    }

    // -- confidence aggregation --

    #[test]
    fn test_confidence_is_minimum_of_numeric_scores() {
        let mut metrics = BTreeMap::new();
        metrics.insert("a".to_string(), MetricScore::clean(0.9));
        metrics.insert("b".to_string(), MetricScore::clean(0.4));
        metrics.insert("c".to_string(), MetricScore::clean(0.7));
        let report = QualityReport::from_metrics(metrics);
        assert!((report.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_ignores_null_scores() {
        let mut metrics = BTreeMap::new();
        metrics.insert("a".to_string(), MetricScore::clean(0.8));
        metrics.insert("b".to_string(), MetricScore::unscorable("n/a"));
        let report = QualityReport::from_metrics(metrics);
        assert!((report.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_zero_when_nothing_numeric() {
        let mut metrics = BTreeMap::new();
        metrics.insert("a".to_string(), MetricScore::unscorable("n/a"));
        let report = QualityReport::from_metrics(metrics);
        assert_eq!(report.confidence, 0.0);
    }

    // -- fallback_reason --

    #[test]
    fn test_fallback_reason_absent_when_clean() {
        let report = evaluate(
            "A short clear draft. It reads well. Nothing repeats here today.",
            "UnknownPattern",
        );
        // pattern_fit for unknown patterns is clean 0.7
        assert!(report.fallback_reason.is_none());
    }

    #[test]
    fn test_fallback_reason_concatenates_all_reasons() {
        let report = evaluate("", "StepwiseInsightSynthesis");
        let reason = report.fallback_reason.unwrap();
        assert!(reason.contains("no output produced"));
        assert!(reason.contains(";"), "multiple reasons joined: {}", reason);
    }

    // -- clarity --

    #[test]
    fn test_clarity_null_on_empty() {
        let report = evaluate("", "TerseSummary");
        assert!(report.metrics["clarity"].score.is_none());
    }

    #[test]
    fn test_clarity_flags_very_short_output() {
        let report = evaluate("two words", "TerseSummary");
        let clarity = &report.metrics["clarity"];
        assert_eq!(clarity.score, Some(0.5));
        assert!(clarity.reason.as_deref().unwrap().contains("short"));
    }

    #[test]
    fn test_clarity_flags_run_on_sentences() {
        let run_on = "word ".repeat(40);
        let report = evaluate(run_on.trim(), "TerseSummary");
        let clarity = &report.metrics["clarity"];
        assert!(clarity.score.unwrap() < 0.7);
        assert!(clarity.reason.as_deref().unwrap().contains("run long"));
    }

    #[test]
    fn test_clarity_clean_on_ordinary_prose() {
        let report = evaluate("The plan is ready. We ship on Friday.", "TerseSummary");
        let clarity = &report.metrics["clarity"];
        assert!(clarity.score.unwrap() > 0.85);
        assert!(clarity.reason.is_none());
    }

    // -- innovation --

    #[test]
    fn test_innovation_rewards_diverse_vocabulary() {
        let diverse = evaluate("Every single word here differs from all others.", "X");
        let repetitive = evaluate("same same same same same same same same same word.", "X");
        assert!(
            diverse.metrics["innovation"].score.unwrap()
                > repetitive.metrics["innovation"].score.unwrap()
        );
    }

    #[test]
    fn test_innovation_flags_repetition() {
        let report = evaluate("go go go go go go go go go go go go", "X");
        let innovation = &report.metrics["innovation"];
        assert_eq!(innovation.reason.as_deref(), Some("vocabulary repetitive"));
    }

    // -- pattern_fit --

    #[test]
    fn test_pattern_fit_recognizes_own_output() {
        for (pattern, kind) in [
            ("StepwiseInsightSynthesis", PatternKind::StepwiseInsightSynthesis),
            ("PatternCritiqueThenRewrite", PatternKind::PatternCritiqueThenRewrite),
            ("ContrastiveExpansion", PatternKind::ContrastiveExpansion),
            ("AudienceReframe", PatternKind::AudienceReframe),
            ("StructuredOutline", PatternKind::StructuredOutline),
            ("TerseSummary", PatternKind::TerseSummary),
        ] {
            let out = kind.apply("First point. Second point. Third point.");
            let report = evaluate(&out, pattern);
            assert_eq!(
                report.metrics["pattern_fit"].score,
                Some(0.9),
                "fit not recognized for {}",
                pattern
            );
        }
    }

    #[test]
    fn test_pattern_fit_flags_missing_markers() {
        let report = evaluate("Plain text with no structure.", "StepwiseInsightSynthesis");
        let fit = &report.metrics["pattern_fit"];
        assert_eq!(fit.score, Some(0.55));
        assert!(fit
            .reason
            .as_deref()
            .unwrap()
            .contains("StepwiseInsightSynthesis"));
    }

    #[test]
    fn test_pattern_fit_unknown_pattern_neutral() {
        let report = evaluate("anything", "NoSuchPattern");
        assert_eq!(report.metrics["pattern_fit"].score, Some(0.7));
        assert!(report.metrics["pattern_fit"].reason.is_none());
    }

    // -- effectiveness --

    #[test]
    fn test_effectiveness_depends_on_pattern() {
        let a = evaluate("text here now", "PatternCritiqueThenRewrite");
        let b = evaluate("text here now", "EvidenceAnnotation");
        assert!(
            a.metrics["pattern_effectiveness"].score.unwrap()
                > b.metrics["pattern_effectiveness"].score.unwrap()
        );
    }

    #[test]
    fn test_effectiveness_unknown_pattern_is_half() {
        let report = evaluate("text here now", "NoSuchPattern");
        assert_eq!(report.metrics["pattern_effectiveness"].score, Some(0.5));
    }

    // -- purity --

    #[test]
    fn test_evaluate_is_deterministic() {
        let a = evaluate("The same input. Twice over.", "TerseSummary");
        let b = evaluate("The same input. Twice over.", "TerseSummary");
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.confidence, b.confidence);
    }

    // -- any_below --

    #[test]
    fn test_any_below_true_when_one_metric_low() {
        let mut metrics = BTreeMap::new();
        metrics.insert("a".to_string(), MetricScore::clean(0.9));
        metrics.insert("b".to_string(), MetricScore::clean(0.6));
        let report = QualityReport::from_metrics(metrics);
        assert!(report.any_below(0.7));
        assert!(!report.any_below(0.5));
    }

    #[test]
    fn test_any_below_ignores_null_scores() {
        let mut metrics = BTreeMap::new();
        metrics.insert("a".to_string(), MetricScore::unscorable("n/a"));
        metrics.insert("b".to_string(), MetricScore::clean(0.9));
        let report = QualityReport::from_metrics(metrics);
        assert!(!report.any_below(0.7));
    }

    // -- ConstantEvaluator --

    #[test]
    fn test_constant_evaluator_flat_scores() {
        let report = ConstantEvaluator(0.95).evaluate("anything", "AnyPattern");
        assert_eq!(report.metrics.len(), 4);
        assert!(report
            .metrics
            .values()
            .all(|m| m.score == Some(0.95) && m.reason.is_none()));
        assert!((report.confidence - 0.95).abs() < 1e-9);
        assert!(report.fallback_reason.is_none());
    }

    #[test]
    fn test_constant_evaluator_below_threshold_gates() {
        let report = ConstantEvaluator(0.3).evaluate("anything", "AnyPattern");
        assert!(report.any_below(0.7));
    }
}
