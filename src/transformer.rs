//! Inter-step input shaping.
//!
//! Reshapes one step's output into the structured input the next step's agent
//! role expects.  Known roles get regex section extraction plus a role
//! template; missing sections are filled with an explicit placeholder so the
//! downstream template always receives every required key, and a template
//! mismatch degrades to a generic "Section Title: content" concatenation,
//! so the step never aborts.  Unknown roles get a simpler mode-selected default
//! transform.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::patterns::split_sentences;

/// Filled in for any section the extractors could not locate.
pub const MISSING_SECTION: &str = "No content found";

/// Cap applied to the summary default transform when no explicit maximum is
/// given.
const DEFAULT_SUMMARY_CHARS: usize = 400;
/// Bullet extraction never returns more than this many items.
const MAX_BULLETS: usize = 5;

// ---------------------------------------------------------------------------
// Role profiles
// ---------------------------------------------------------------------------

pub struct SectionRule {
    pub name: String,
    /// Ordered extraction patterns; the first non-empty capture wins.
    pub extractors: Vec<Regex>,
}

pub struct RoleProfile {
    pub role: String,
    pub sections: Vec<SectionRule>,
    pub template: String,
}

fn rule(name: &str, extractors: &[&str]) -> SectionRule {
    SectionRule {
        name: name.to_string(),
        extractors: extractors
            .iter()
            .map(|p| Regex::new(p).expect("section extractor regex is valid"))
            .collect(),
    }
}

fn builtin_profiles() -> Vec<RoleProfile> {
    vec![
        RoleProfile {
            role: "StrategyPilot".to_string(),
            sections: vec![
                rule(
                    "objective",
                    &[
                        r"(?im)^(?:objective|goal)s?\s*:\s*(.+)$",
                        r"(?i)\b(?:we aim to|the aim is to|the goal is to)\s+([^.\n]+)",
                        r"\A\s*([^.!?\n]{10,200})",
                    ],
                ),
                rule(
                    "risks",
                    &[
                        r"(?im)^risks?\s*:\s*(.+)$",
                        r"(?i)\brisks?\b[^.\n]*?(?:is|are|include[s]?)\s+([^.\n]+)",
                    ],
                ),
                rule(
                    "next_steps",
                    &[
                        r"(?im)^next\s+steps?\s*:\s*(.+)$",
                        r"(?i)\bnext,?\s+(?:we|the team)\s+([^.\n]+)",
                    ],
                ),
            ],
            template: "Objective:\n{objective}\n\nRisks:\n{risks}\n\nNext steps:\n{next_steps}"
                .to_string(),
        },
        RoleProfile {
            role: "DesignMaster".to_string(),
            sections: vec![
                rule(
                    "direction",
                    &[
                        r"(?im)^direction\s*:\s*(.+)$",
                        r"\A\s*([^.!?\n]{10,200})",
                    ],
                ),
                rule(
                    "constraints",
                    &[
                        r"(?im)^constraints?\s*:\s*(.+)$",
                        r"(?i)\bmust\s+([^.\n]+)",
                    ],
                ),
            ],
            template: "Design direction:\n{direction}\n\nConstraints:\n{constraints}".to_string(),
        },
        RoleProfile {
            role: "ComponentLibrarian".to_string(),
            sections: vec![
                rule(
                    "components",
                    &[
                        r"(?im)^components?\s*:\s*(.+)$",
                        r"(?m)^\s*[-*]\s+(.+)$",
                    ],
                ),
                rule(
                    "usage_notes",
                    &[r"(?im)^(?:usage|notes?)\s*:\s*(.+)$"],
                ),
            ],
            template: "Components:\n{components}\n\nUsage notes:\n{usage_notes}".to_string(),
        },
        RoleProfile {
            role: "EvaluatorAgent".to_string(),
            sections: vec![
                rule(
                    "summary",
                    &[
                        r"(?im)^summary\s*:\s*(.+)$",
                        r"(?s)\A\s*(.+?)(?:\n\s*\n|\z)",
                    ],
                ),
                rule(
                    "weaknesses",
                    &[
                        r"(?im)^(?:weakness(?:es)?|concerns?)\s*:\s*(.+)$",
                        r"(?i)\b(?:however|but|unfortunately),?\s+([^.\n]+)",
                    ],
                ),
            ],
            template: "Summary:\n{summary}\n\nWeaknesses:\n{weaknesses}".to_string(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Default transforms for unknown roles
// ---------------------------------------------------------------------------

/// The mode-selected transform used when the destination role has no profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultTransform {
    Summary,
    Bullets,
    Decisions,
    Passthrough,
}

impl DefaultTransform {
    /// Execution modes map onto default transforms; anything unrecognized
    /// passes the text through unchanged.
    pub fn from_mode(mode: &str) -> Self {
        match mode {
            "ship" | "summary" => DefaultTransform::Summary,
            "simulate" | "bullets" => DefaultTransform::Bullets,
            "critique" | "decisions" => DefaultTransform::Decisions,
            _ => DefaultTransform::Passthrough,
        }
    }
}

static BULLET_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+(.+)$").expect("bullet regex is valid")
});
static LEFTOVER_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[a-z_]+\}").expect("placeholder regex is valid"));

const DECISION_KEYWORDS: &[&str] = &["decided", "decision", "chose", "selected", "will"];
const RATIONALE_KEYWORDS: &[&str] = &["because", "since", "so that", "rationale"];

// ---------------------------------------------------------------------------
// InputTransformer
// ---------------------------------------------------------------------------

pub struct InputTransformer {
    profiles: Vec<RoleProfile>,
}

impl InputTransformer {
    pub fn new() -> Self {
        Self {
            profiles: builtin_profiles(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_profiles(profiles: Vec<RoleProfile>) -> Self {
        Self { profiles }
    }

    /// Reshape `output` into the input expected by `destination_role`.
    pub fn transform(
        &self,
        output: &str,
        destination_role: &str,
        mode: &str,
        max_section_len: Option<usize>,
    ) -> String {
        match self.profiles.iter().find(|p| p.role == destination_role) {
            Some(profile) => Self::apply_profile(profile, output, max_section_len),
            None => Self::default_transform(output, DefaultTransform::from_mode(mode), max_section_len),
        }
    }

    fn apply_profile(
        profile: &RoleProfile,
        output: &str,
        max_section_len: Option<usize>,
    ) -> String {
        let mut extracted: Vec<(String, String)> = Vec::new();
        for section in &profile.sections {
            let mut value = section
                .extractors
                .iter()
                .find_map(|re| {
                    re.captures(output)
                        .and_then(|c| c.get(1))
                        .map(|m| m.as_str().trim().to_string())
                        .filter(|s| !s.is_empty())
                })
                .unwrap_or_else(|| MISSING_SECTION.to_string());
            if let Some(max) = max_section_len {
                if value.chars().count() > max {
                    value = value.chars().take(max).collect();
                }
            }
            extracted.push((section.name.clone(), value));
        }

        let mut filled = profile.template.clone();
        for (name, value) in &extracted {
            filled = filled.replace(&format!("{{{}}}", name), value);
        }
        if LEFTOVER_PLACEHOLDER.is_match(&filled) {
            // Template references a section the profile never extracted; fall
            // back to plain titled concatenation rather than aborting the step.
            return extracted
                .iter()
                .map(|(name, value)| format!("{}:\n{}", title_case(name), value))
                .collect::<Vec<_>>()
                .join("\n\n");
        }
        filled
    }

    fn default_transform(
        output: &str,
        transform: DefaultTransform,
        max_section_len: Option<usize>,
    ) -> String {
        match transform {
            DefaultTransform::Summary => {
                let cap = max_section_len.unwrap_or(DEFAULT_SUMMARY_CHARS);
                let paragraph = output
                    .split("\n\n")
                    .map(str::trim)
                    .find(|p| !p.is_empty())
                    .unwrap_or("");
                paragraph.chars().take(cap).collect()
            }
            DefaultTransform::Bullets => {
                let bullets: Vec<String> = BULLET_LINE
                    .captures_iter(output)
                    .take(MAX_BULLETS)
                    .map(|c| format!("- {}", c[1].trim()))
                    .collect();
                if bullets.is_empty() {
                    match split_sentences(output).first() {
                        Some(first) => format!("- {}", first),
                        None => String::new(),
                    }
                } else {
                    bullets.join("\n")
                }
            }
            DefaultTransform::Decisions => {
                let sentences = split_sentences(output);
                let lower = |s: &str| s.to_lowercase();
                let decisions: Vec<&String> = sentences
                    .iter()
                    .filter(|s| DECISION_KEYWORDS.iter().any(|k| lower(s).contains(*k)))
                    .collect();
                let rationales: Vec<&String> = sentences
                    .iter()
                    .filter(|s| RATIONALE_KEYWORDS.iter().any(|k| lower(s).contains(*k)))
                    .collect();
                if decisions.is_empty() && rationales.is_empty() {
                    return Self::default_transform(
                        output,
                        DefaultTransform::Summary,
                        max_section_len,
                    );
                }
                let mut out = String::new();
                for (i, d) in decisions.iter().enumerate() {
                    out.push_str(&format!("Decision: {}.\n", d));
                    if let Some(r) = rationales.get(i) {
                        out.push_str(&format!("Rationale: {}.\n", r));
                    }
                }
                if decisions.is_empty() {
                    for r in &rationales {
                        out.push_str(&format!("Rationale: {}.\n", r));
                    }
                }
                out.trim_end().to_string()
            }
            DefaultTransform::Passthrough => output.to_string(),
        }
    }
}

impl Default for InputTransformer {
    fn default() -> Self {
        Self::new()
    }
}

fn title_case(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
