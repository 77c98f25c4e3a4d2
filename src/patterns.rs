//! Pattern definitions and the catalog that owns them.
//!
//! A pattern is a named, side-effect-free text transformation.  The catalog
//! additionally stores a static fallback-successor table: when a pattern's
//! output fails quality gating, the executor may substitute its configured
//! successor exactly once.  The table is plain data and may contain cycles;
//! bounding traversal is the executor's job, not the catalog's.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Sentence splitting (shared with the quality heuristics)
// ---------------------------------------------------------------------------

/// Split text into trimmed, non-empty sentences on `.`, `!`, and `?`.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// PatternKind
// ---------------------------------------------------------------------------

/// The builtin text transformations, one per registered pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    StepwiseInsightSynthesis,
    PatternCritiqueThenRewrite,
    ContrastiveExpansion,
    AudienceReframe,
    PlainLanguageRewrite,
    StructuredOutline,
    EvidenceAnnotation,
    TerseSummary,
}

/// Formal-to-plain word substitutions used by `PlainLanguageRewrite`.
const PLAIN_LANGUAGE_TABLE: &[(&str, &str)] = &[
    ("utilize", "use"),
    ("leverage", "use"),
    ("facilitate", "help"),
    ("approximately", "about"),
    ("commence", "start"),
    ("terminate", "end"),
    ("subsequently", "then"),
    ("demonstrate", "show"),
];

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

impl PatternKind {
    /// Apply the transformation.  Pure with respect to the catalog: applying
    /// a pattern never mutates registry state.
    pub fn apply(&self, text: &str) -> String {
        match self {
            PatternKind::StepwiseInsightSynthesis => {
                let sentences = split_sentences(text);
                if sentences.is_empty() {
                    return String::new();
                }
                let mut out = String::from("Synthesis, step by step:\n");
                for (i, s) in sentences.iter().enumerate() {
                    out.push_str(&format!("Step {}: {}.\n", i + 1, s));
                }
                out
            }
            PatternKind::PatternCritiqueThenRewrite => {
                let sentences = split_sentences(text);
                let longest = sentences
                    .iter()
                    .map(|s| s.split_whitespace().count())
                    .max()
                    .unwrap_or(0);
                let observation = if longest > 25 {
                    format!("- Longest sentence runs {} words; tighten it.", longest)
                } else if sentences.is_empty() {
                    "- The draft is empty.".to_string()
                } else {
                    "- No structural issues detected.".to_string()
                };
                let rewrite = text.split_whitespace().collect::<Vec<_>>().join(" ");
                format!(
                    "Critique:\n- Sentence count: {}\n{}\n\nRewrite:\n{}",
                    sentences.len(),
                    observation,
                    rewrite
                )
            }
            PatternKind::ContrastiveExpansion => {
                let sentences = split_sentences(text);
                let mid = sentences.len().div_ceil(2);
                let first: Vec<String> = sentences.iter().take(mid).cloned().collect();
                let second: Vec<String> = sentences.iter().skip(mid).cloned().collect();
                let other = if second.is_empty() {
                    "the draft offers no counterpoint yet".to_string()
                } else {
                    second.join(". ")
                };
                format!(
                    "On one hand: {}.\n\nOn the other hand: {}.",
                    first.join(". "),
                    other
                )
            }
            PatternKind::AudienceReframe => {
                format!("In plain terms: {}", text.trim())
            }
            PatternKind::PlainLanguageRewrite => {
                let mut out = text.to_string();
                for (from, to) in PLAIN_LANGUAGE_TABLE {
                    out = out.replace(from, to);
                    out = out.replace(&capitalize(from), &capitalize(to));
                }
                out
            }
            PatternKind::StructuredOutline => {
                let sentences = split_sentences(text);
                let mut out = String::from("Outline:\n");
                for s in &sentences {
                    out.push_str(&format!("- {}\n", s));
                }
                out
            }
            PatternKind::EvidenceAnnotation => {
                let sentences = split_sentences(text);
                let annotated: Vec<String> = sentences
                    .iter()
                    .map(|s| {
                        let claim_like = s.chars().any(|c| c.is_ascii_digit())
                            || s.contains('%')
                            || s.to_lowercase().contains("increase")
                            || s.to_lowercase().contains("decrease");
                        if claim_like {
                            format!("{}. [evidence: pending citation]", s)
                        } else {
                            format!("{}.", s)
                        }
                    })
                    .collect();
                annotated.join(" ")
            }
            PatternKind::TerseSummary => {
                let sentences = split_sentences(text);
                let mut out: String = sentences
                    .iter()
                    .take(2)
                    .map(|s| format!("{}.", s))
                    .collect::<Vec<_>>()
                    .join(" ");
                if out.chars().count() > 300 {
                    out = out.chars().take(300).collect();
                }
                out
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A named text-transformation template.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub description: String,
    pub example: String,
    /// Whether output of this pattern must pass through the safety filter.
    /// All builtins set this; the executor sanitizes unconditionally anyway.
    pub requires_safety_check: bool,
    pub kind: PatternKind,
}

impl Pattern {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        example: impl Into<String>,
        kind: PatternKind,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            example: example.into(),
            requires_safety_check: true,
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback adjacency — static data, one edge per pattern, cycles allowed
// ---------------------------------------------------------------------------

const FALLBACK_EDGES: &[(&str, &str)] = &[
    ("StepwiseInsightSynthesis", "PatternCritiqueThenRewrite"),
    ("PatternCritiqueThenRewrite", "StepwiseInsightSynthesis"),
    ("ContrastiveExpansion", "StepwiseInsightSynthesis"),
    ("AudienceReframe", "PlainLanguageRewrite"),
    ("PlainLanguageRewrite", "AudienceReframe"),
    ("StructuredOutline", "StepwiseInsightSynthesis"),
    ("EvidenceAnnotation", "PatternCritiqueThenRewrite"),
    ("TerseSummary", "PlainLanguageRewrite"),
];

// ---------------------------------------------------------------------------
// PatternCatalog
// ---------------------------------------------------------------------------

/// Registry of patterns plus the fallback-successor table.
pub struct PatternCatalog {
    patterns: HashMap<String, Pattern>,
    fallbacks: HashMap<String, String>,
}

impl PatternCatalog {
    /// An empty catalog with no fallback edges.
    pub fn new() -> Self {
        Self {
            patterns: HashMap::new(),
            fallbacks: HashMap::new(),
        }
    }

    /// The stock catalog: all builtin patterns and the static fallback map.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(Pattern::new(
            "StepwiseInsightSynthesis",
            "Re-present the draft as an explicitly numbered sequence of steps.",
            "Step 1: The launch needs a budget.",
            PatternKind::StepwiseInsightSynthesis,
        ));
        catalog.register(Pattern::new(
            "PatternCritiqueThenRewrite",
            "Prefix a short structural critique, then a whitespace-tightened rewrite.",
            "Critique:\n- Sentence count: 3\n\nRewrite:\n...",
            PatternKind::PatternCritiqueThenRewrite,
        ));
        catalog.register(Pattern::new(
            "ContrastiveExpansion",
            "Split the draft into a thesis half and a counterpoint half.",
            "On one hand: ... On the other hand: ...",
            PatternKind::ContrastiveExpansion,
        ));
        catalog.register(Pattern::new(
            "AudienceReframe",
            "Reframe the draft for a non-specialist reader.",
            "In plain terms: the release slips a week.",
            PatternKind::AudienceReframe,
        ));
        catalog.register(Pattern::new(
            "PlainLanguageRewrite",
            "Substitute formal vocabulary with everyday equivalents.",
            "\"utilize\" becomes \"use\"",
            PatternKind::PlainLanguageRewrite,
        ));
        catalog.register(Pattern::new(
            "StructuredOutline",
            "Bulletize each sentence of the draft under an Outline heading.",
            "Outline:\n- First point\n- Second point",
            PatternKind::StructuredOutline,
        ));
        catalog.register(Pattern::new(
            "EvidenceAnnotation",
            "Tag quantitative claims with a pending-citation marker.",
            "Revenue grew 40%. [evidence: pending citation]",
            PatternKind::EvidenceAnnotation,
        ));
        catalog.register(Pattern::new(
            "TerseSummary",
            "Keep only the first two sentences, capped at 300 characters.",
            "The plan ships Friday. Risks are low.",
            PatternKind::TerseSummary,
        ));
        for (from, to) in FALLBACK_EDGES {
            catalog.set_fallback(*from, *to);
        }
        catalog
    }

    /// Insert or overwrite a pattern, keyed by its unique name.
    pub fn register(&mut self, pattern: Pattern) {
        self.patterns.insert(pattern.name.clone(), pattern);
    }

    /// Configure (or overwrite) the fallback successor for a pattern.
    pub fn set_fallback(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.fallbacks.insert(from.into(), to.into());
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.get(name)
    }

    /// The configured fallback successor, if any.  A hint only: the edge may
    /// point at an unregistered pattern or form a cycle.
    pub fn fallback_of(&self, name: &str) -> Option<&str> {
        self.fallbacks.get(name).map(String::as_str)
    }

    /// All registered pattern names in stable (sorted) order.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.patterns.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
