//! The agent capability.
//!
//! Agents are nominal roles: a name, a uniform `process` contract, and
//! fabricated constant scores.  The executor depends on nothing else; custom
//! implementations can be registered and the core never looks inside them.

use std::collections::{BTreeMap, HashMap};

use crate::patterns::Pattern;

// ---------------------------------------------------------------------------
// Contract types
// ---------------------------------------------------------------------------

/// Per-step context handed to an agent.
pub struct AgentContext<'a> {
    /// The pattern the step is executing (post-fallback when substituted).
    pub pattern: &'a Pattern,
    pub execution_mode: &'a str,
}

/// The uniform agent output shape: rewritten text, named scores in [0, 1],
/// and a single scalar confidence summary.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub output: String,
    pub metrics: BTreeMap<String, f64>,
    pub confidence: f64,
}

pub trait Agent {
    fn name(&self) -> &str;
    fn process(&self, input: &str, ctx: &AgentContext<'_>) -> AgentResponse;
}

// ---------------------------------------------------------------------------
// TemplateAgent — the stock implementation
// ---------------------------------------------------------------------------

/// Applies the step's pattern to the input and reports constant scores
/// derived from a per-role base confidence.
pub struct TemplateAgent {
    name: String,
    base_confidence: f64,
}

impl TemplateAgent {
    pub fn new(name: impl Into<String>, base_confidence: f64) -> Self {
        Self {
            name: name.into(),
            base_confidence: base_confidence.clamp(0.0, 1.0),
        }
    }
}

impl Agent for TemplateAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, input: &str, ctx: &AgentContext<'_>) -> AgentResponse {
        let output = ctx.pattern.kind.apply(input);
        let base = self.base_confidence;
        let mut metrics = BTreeMap::new();
        metrics.insert("relevance".to_string(), base);
        metrics.insert("coherence".to_string(), (base - 0.02).clamp(0.0, 1.0));
        metrics.insert("completeness".to_string(), (base + 0.01).clamp(0.0, 1.0));
        AgentResponse {
            output,
            metrics,
            confidence: base,
        }
    }
}

// ---------------------------------------------------------------------------
// AgentRoster
// ---------------------------------------------------------------------------

/// The set of agents a chain configuration may name.
pub struct AgentRoster {
    agents: HashMap<String, Box<dyn Agent>>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// The stock roster of named template agents.
    pub fn standard() -> Self {
        let mut roster = Self::new();
        for (name, confidence) in [
            ("StrategyPilot", 0.92),
            ("DesignMaster", 0.9),
            ("ComponentLibrarian", 0.88),
            ("EvaluatorAgent", 0.93),
            ("NarrativeArchitect", 0.9),
            ("ResearchScout", 0.87),
        ] {
            roster.register(Box::new(TemplateAgent::new(name, confidence)));
        }
        roster
    }

    /// Insert or overwrite an agent, keyed by its name.
    pub fn register(&mut self, agent: Box<dyn Agent>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Agent> {
        self.agents.get(name).map(Box::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// All registered agent names in stable (sorted) order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternCatalog;

    fn ctx_for<'a>(catalog: &'a PatternCatalog, pattern: &str) -> AgentContext<'a> {
        AgentContext {
            pattern: catalog.get(pattern).expect("builtin pattern"),
            execution_mode: "balanced",
        }
    }

    #[test]
    fn test_template_agent_applies_pattern() {
        let catalog = PatternCatalog::with_builtins();
        let agent = TemplateAgent::new("StrategyPilot", 0.92);
        let ctx = ctx_for(&catalog, "StructuredOutline");
        let response = agent.process("First point. Second point.", &ctx);
        assert!(response.output.contains("- First point"));
    }

    #[test]
    fn test_template_agent_metrics_are_constant() {
        let catalog = PatternCatalog::with_builtins();
        let agent = TemplateAgent::new("StrategyPilot", 0.92);
        let ctx = ctx_for(&catalog, "TerseSummary");
        let a = agent.process("Input one.", &ctx);
        let b = agent.process("Entirely different input text.", &ctx);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_template_agent_metrics_in_unit_range() {
        let catalog = PatternCatalog::with_builtins();
        let agent = TemplateAgent::new("X", 1.0);
        let ctx = ctx_for(&catalog, "TerseSummary");
        let response = agent.process("Some text.", &ctx);
        assert!(response
            .metrics
            .values()
            .all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_template_agent_confidence_clamped() {
        let agent = TemplateAgent::new("X", 7.0);
        let catalog = PatternCatalog::with_builtins();
        let ctx = ctx_for(&catalog, "TerseSummary");
        assert_eq!(agent.process("t.", &ctx).confidence, 1.0);
    }

    #[test]
    fn test_standard_roster_contains_known_agents() {
        let roster = AgentRoster::standard();
        for name in [
            "StrategyPilot",
            "DesignMaster",
            "ComponentLibrarian",
            "EvaluatorAgent",
            "NarrativeArchitect",
            "ResearchScout",
        ] {
            assert!(roster.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_roster_unknown_agent_absent() {
        let roster = AgentRoster::standard();
        assert!(!roster.contains("GhostAgent"));
        assert!(roster.get("GhostAgent").is_none());
    }

    #[test]
    fn test_roster_names_sorted() {
        let roster = AgentRoster::standard();
        let names = roster.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_roster_register_overwrites_by_name() {
        let mut roster = AgentRoster::standard();
        roster.register(Box::new(TemplateAgent::new("StrategyPilot", 0.1)));
        let catalog = PatternCatalog::with_builtins();
        let ctx = ctx_for(&catalog, "TerseSummary");
        let response = roster.get("StrategyPilot").unwrap().process("t.", &ctx);
        assert!((response.confidence - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_custom_agent_via_trait() {
        struct EchoAgent;
        impl Agent for EchoAgent {
            fn name(&self) -> &str {
                "EchoAgent"
            }
            fn process(&self, input: &str, _ctx: &AgentContext<'_>) -> AgentResponse {
                AgentResponse {
                    output: input.to_string(),
                    metrics: BTreeMap::new(),
                    confidence: 1.0,
                }
            }
        }
        let mut roster = AgentRoster::new();
        roster.register(Box::new(EchoAgent));
        let catalog = PatternCatalog::with_builtins();
        let ctx = ctx_for(&catalog, "TerseSummary");
        let response = roster.get("EchoAgent").unwrap().process("verbatim", &ctx);
        assert_eq!(response.output, "verbatim");
    }
}
