//! Execution-mode profiles.
//!
//! A mode reweights pattern and agent scoring and sets the critique threshold
//! the executor gates against.  Configs are immutable once defined; unknown
//! mode names resolve to a neutral default rather than failing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// ---------------------------------------------------------------------------
// ModeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub tone: String,
    pub innovation_weight: f64,
    pub clarity_weight: f64,
    pub critique_threshold: f64,
    /// pattern name → multiplicative effectiveness modifier.
    pub pattern_modifiers: HashMap<String, f64>,
    /// agent name → { bias name → multiplier }.
    pub agent_biases: HashMap<String, HashMap<String, f64>>,
}

impl ModeConfig {
    /// The neutral default: unit weights, 0.7 threshold, no modifiers.
    pub fn neutral() -> Self {
        Self {
            tone: "even".to_string(),
            innovation_weight: 1.0,
            clarity_weight: 1.0,
            critique_threshold: 0.7,
            pattern_modifiers: HashMap::new(),
            agent_biases: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionModeMap
// ---------------------------------------------------------------------------

pub struct ExecutionModeMap {
    modes: HashMap<String, ModeConfig>,
    neutral: ModeConfig,
}

impl ExecutionModeMap {
    /// The builtin mode table: simulate / ship / critique / balanced.
    pub fn standard() -> Self {
        let mut modes = HashMap::new();

        modes.insert(
            "simulate".to_string(),
            ModeConfig {
                tone: "exploratory".to_string(),
                innovation_weight: 1.3,
                clarity_weight: 0.9,
                critique_threshold: 0.6,
                pattern_modifiers: HashMap::from([
                    ("ContrastiveExpansion".to_string(), 1.3),
                    ("StepwiseInsightSynthesis".to_string(), 1.1),
                ]),
                agent_biases: HashMap::from([
                    (
                        "StrategyPilot".to_string(),
                        HashMap::from([("exploration".to_string(), 1.4)]),
                    ),
                    (
                        "ResearchScout".to_string(),
                        HashMap::from([("breadth".to_string(), 1.3)]),
                    ),
                ]),
            },
        );

        modes.insert(
            "ship".to_string(),
            ModeConfig {
                tone: "decisive".to_string(),
                innovation_weight: 0.8,
                clarity_weight: 1.2,
                critique_threshold: 0.8,
                pattern_modifiers: HashMap::from([
                    ("TerseSummary".to_string(), 1.2),
                    ("ContrastiveExpansion".to_string(), 0.8),
                ]),
                agent_biases: HashMap::from([
                    (
                        "StrategyPilot".to_string(),
                        HashMap::from([
                            ("risk_weight".to_string(), 1.2),
                            ("detail_weight".to_string(), 0.9),
                        ]),
                    ),
                    (
                        "EvaluatorAgent".to_string(),
                        HashMap::from([("strictness".to_string(), 1.25)]),
                    ),
                ]),
            },
        );

        modes.insert(
            "critique".to_string(),
            ModeConfig {
                tone: "exacting".to_string(),
                innovation_weight: 1.0,
                clarity_weight: 1.1,
                critique_threshold: 0.9,
                pattern_modifiers: HashMap::from([
                    ("PatternCritiqueThenRewrite".to_string(), 1.25),
                    ("EvidenceAnnotation".to_string(), 1.15),
                ]),
                agent_biases: HashMap::from([(
                    "EvaluatorAgent".to_string(),
                    HashMap::from([("strictness".to_string(), 1.5)]),
                )]),
            },
        );

        modes.insert("balanced".to_string(), ModeConfig::neutral());

        Self {
            modes,
            neutral: ModeConfig::neutral(),
        }
    }

    /// Look up a mode, falling back to the neutral default for unknown names.
    pub fn get(&self, mode: &str) -> &ModeConfig {
        self.modes.get(mode).unwrap_or(&self.neutral)
    }

    /// Reweight an agent's base configuration for a mode: multiply every
    /// numeric field whose key matches a configured bias name, then stamp the
    /// mode name, tone, and critique threshold onto the result.
    pub fn apply_to_agent(
        &self,
        agent: &str,
        mode: &str,
        base: &Map<String, Value>,
    ) -> Map<String, Value> {
        let config = self.get(mode);
        let biases = config.agent_biases.get(agent);
        let mut result = base.clone();
        if let Some(biases) = biases {
            for (key, value) in base {
                if let (Some(multiplier), Some(number)) = (biases.get(key), value.as_f64()) {
                    if let Some(scaled) = Number::from_f64(number * multiplier) {
                        result.insert(key.clone(), Value::Number(scaled));
                    }
                }
            }
        }
        result.insert(
            "execution_mode".to_string(),
            Value::String(mode.to_string()),
        );
        result.insert("tone".to_string(), Value::String(config.tone.clone()));
        if let Some(threshold) = Number::from_f64(config.critique_threshold) {
            result.insert("critique_threshold".to_string(), Value::Number(threshold));
        }
        result
    }

    /// Reweight a pattern's base configuration for a mode: multiply its
    /// `effectiveness_weight` (when present and numeric) by the mode's
    /// pattern-specific modifier, then stamp the global weights.
    pub fn apply_to_pattern(
        &self,
        pattern: &str,
        mode: &str,
        base: &Map<String, Value>,
    ) -> Map<String, Value> {
        let config = self.get(mode);
        let mut result = base.clone();
        if let Some(modifier) = config.pattern_modifiers.get(pattern) {
            if let Some(weight) = base.get("effectiveness_weight").and_then(Value::as_f64) {
                if let Some(scaled) = Number::from_f64(weight * modifier) {
                    result.insert("effectiveness_weight".to_string(), Value::Number(scaled));
                }
            }
        }
        if let Some(n) = Number::from_f64(config.innovation_weight) {
            result.insert("innovation_weight".to_string(), Value::Number(n));
        }
        if let Some(n) = Number::from_f64(config.clarity_weight) {
            result.insert("clarity_weight".to_string(), Value::Number(n));
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
