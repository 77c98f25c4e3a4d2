//! Output sanitizer.
//!
//! Every pattern invocation's output runs through `sanitize` before it is
//! evaluated or handed to the next step.  Rules apply in a fixed order, each
//! independently triggerable and independently logged; a rule that finds
//! nothing to change produces no event.  The filter never fails; worst case
//! it returns a maximally truncated or empty string.
//!
//! Removing a blocked fragment can splice together new trigger text (a script
//! tag assembled from the halves around a stripped inner tag, a horizontal
//! rule assembled from joined lines), so the rule sequence runs to a fixed
//! point.  That is also what makes `sanitize` idempotent.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;
use crate::memory::atomic_write;

/// Hard cap on sanitized output, in characters.
pub const MAX_OUTPUT_CHARS: usize = 12_000;
/// Longest permitted run of blank lines.
pub const MAX_BLANK_RUN: usize = 2;
/// Characters of the original text kept in each event's preview.
const PREVIEW_CHARS: usize = 80;
/// Upper bound on fixed-point passes.  Two passes settle everything seen in
/// practice; the bound exists so hostile input cannot loop the filter.
const MAX_PASSES: usize = 5;

// ---------------------------------------------------------------------------
// SafetyEvent
// ---------------------------------------------------------------------------

/// One rule application that actually changed the text.  Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyEvent {
    pub pattern: String,
    pub rule: String,
    pub original_len: usize,
    pub modified_len: usize,
    pub preview: String,
}

// ---------------------------------------------------------------------------
// Blocked-content rules
// ---------------------------------------------------------------------------

struct BlockedRule {
    name: &'static str,
    regex: Regex,
}

static BLOCKED_RULES: Lazy<Vec<BlockedRule>> = Lazy::new(|| {
    let rule = |name, pattern: &str| BlockedRule {
        name,
        regex: Regex::new(pattern).expect("blocked-content regex is valid"),
    };
    vec![
        rule("script_tag", r"(?si)<script\b[^>]*>.*?</script\s*>"),
        rule(
            "event_handler",
            r#"(?i)\bon\w+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#,
        ),
        rule(
            "data_uri",
            r"(?i)data:[\w.+-]+/[\w.+-]+;base64,[A-Za-z0-9+/=]+",
        ),
        rule("eval_call", r"(?i)\beval\s*\("),
        rule(
            "import_stmt",
            r"(?im)^[ \t]*(?:import\s+[^\n]+|from\s+\S+\s+import[^\n]*)$",
        ),
        rule("javascript_uri", r#"(?i)javascript:[^\s"'<>]*"#),
    ]
});

static HR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:-{3,}|\*{3,}|_{3,})[ \t]*$").expect("hr regex is valid"));

// ---------------------------------------------------------------------------
// SafetyFilter
// ---------------------------------------------------------------------------

/// Sanitizes pattern output and records every mutation.
pub struct SafetyFilter {
    events: Vec<SafetyEvent>,
    log_path: Option<PathBuf>,
}

impl SafetyFilter {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            log_path: None,
        }
    }

    /// A filter that can flush its event log to a JSON file (rewritten in
    /// full on every flush).
    pub fn with_log_file(path: impl Into<PathBuf>) -> Self {
        Self {
            events: Vec::new(),
            log_path: Some(path.into()),
        }
    }

    /// All events recorded so far, in application order.
    pub fn events(&self) -> &[SafetyEvent] {
        &self.events
    }

    /// Sanitize pattern output.  Never errors.
    pub fn sanitize(&mut self, text: &str, pattern_name: &str) -> String {
        let preview: String = text.chars().take(PREVIEW_CHARS).collect();
        let mut invocation: Vec<SafetyEvent> = Vec::new();
        let mut current = text.to_string();

        for _ in 0..MAX_PASSES {
            let next = run_rules(&current, pattern_name, &preview, &mut invocation);
            if next == current {
                break;
            }
            current = next;
        }

        for event in &invocation {
            warn!(
                rule = %event.rule,
                pattern = %event.pattern,
                original_len = event.original_len,
                modified_len = event.modified_len,
                "sanitizer modified pattern output"
            );
        }
        self.events.extend(invocation);
        current
    }

    /// Rewrite the event log file in full.  No-op without a log path; write
    /// failures propagate.
    pub fn flush(&self) -> Result<(), PipelineError> {
        if let Some(path) = &self.log_path {
            let json = serde_json::to_string_pretty(&self.events)?;
            atomic_write(path, &json)?;
        }
        Ok(())
    }
}

impl Default for SafetyFilter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Rule application
// ---------------------------------------------------------------------------

/// One pass over the full rule sequence.
fn run_rules(
    text: &str,
    pattern_name: &str,
    preview: &str,
    invocation: &mut Vec<SafetyEvent>,
) -> String {
    let mut current = text.to_string();

    // 1. Length cap.
    let truncated = truncate_chars(&current, MAX_OUTPUT_CHARS);
    current = record_if_changed(current, truncated, "max_length", pattern_name, preview, invocation);

    // 2. Blank-line runs.
    let collapsed = collapse_blank_runs(&current, MAX_BLANK_RUN);
    current = record_if_changed(
        current,
        collapsed,
        "blank_line_collapse",
        pattern_name,
        preview,
        invocation,
    );

    // 3. Structural token escape.  The replacement alphabet is disjoint from
    //    the trigger alphabet, so a second application finds nothing.
    let escaped = escape_structural_tokens(&current);
    current = record_if_changed(
        current,
        escaped,
        "token_escape",
        pattern_name,
        preview,
        invocation,
    );

    // 4. Blocked-content strips, one rule name per regex.
    for rule in BLOCKED_RULES.iter() {
        let stripped = rule.regex.replace_all(&current, "").into_owned();
        current = record_if_changed(
            current,
            stripped,
            &format!("blocked_pattern_{}", rule.name),
            pattern_name,
            preview,
            invocation,
        );
    }

    current
}

/// Record one event per rule per invocation.  A later pass that changes the
/// text again under the same rule only refreshes the modified length.
fn record_if_changed(
    before: String,
    after: String,
    rule: &str,
    pattern_name: &str,
    preview: &str,
    invocation: &mut Vec<SafetyEvent>,
) -> String {
    if before == after {
        return before;
    }
    if let Some(existing) = invocation.iter_mut().find(|e| e.rule == rule) {
        existing.modified_len = after.len();
    } else {
        invocation.push(SafetyEvent {
            pattern: pattern_name.to_string(),
            rule: rule.to_string(),
            original_len: before.len(),
            modified_len: after.len(),
            preview: preview.to_string(),
        });
    }
    after
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Cap runs of blank lines at `max`.  Operates on `\n` segments so a trailing
/// newline survives untouched.
fn collapse_blank_runs(text: &str, max: usize) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;
    for segment in text.split('\n') {
        if segment.trim().is_empty() {
            blank_run += 1;
            if blank_run > max {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(segment);
    }
    out.join("\n")
}

fn escape_structural_tokens(text: &str) -> String {
    let braced = text.replace('{', "⟦").replace('}', "⟧");
    HR_LINE.replace_all(&braced, "- - -").into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
