//! Chain execution.
//!
//! The orchestrator runs an ordered list of (agent, pattern) steps over the
//! current text.  Per step: the agent applies the pattern, the safety filter
//! sanitizes the output, the evaluator scores it, and the mode's critique
//! threshold decides acceptance.  In adaptive mode a failing step substitutes
//! the catalog's single fallback pattern exactly once; the fallback map may
//! cycle, so the one-hop bound lives here, not in the catalog.  Quality
//! gating is advisory: a step that still fails after fallback is accepted
//! as-is, and only configuration errors abort the run.
//!
//! Execution walks Pending → Running(step) → {accepted | fallback} → …
//! → Completed; every step and every substitution lands in the memory store
//! in strict order.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::agents::{Agent, AgentContext, AgentRoster};
use crate::error::PipelineError;
use crate::memory::{now_ms, ChainExecutionRecord, MemoryStore, PatternUseRecord};
use crate::modes::ExecutionModeMap;
use crate::patterns::PatternCatalog;
use crate::quality::{Evaluator, MetricScore, QualityEvaluator, QualityReport};
use crate::safety::SafetyFilter;
use crate::transformer::InputTransformer;

/// Characters of step output kept in previews.
const PREVIEW_CHARS: usize = 120;
/// Section cap handed to the transformer between steps.
const SECTION_CHARS: usize = 600;

// ---------------------------------------------------------------------------
// Chain configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub agent: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub execution_mode: String,
    pub chain: Vec<ChainStep>,
}

impl ChainConfig {
    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let config: ChainConfig = serde_json::from_str(raw)
            .map_err(|e| PipelineError::MalformedConfig(e.to_string()))?;
        if config.chain.is_empty() {
            return Err(PipelineError::MalformedConfig(
                "chain has no steps".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PipelineError::Storage {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Named builtin chains for the CLI `--template` flag.
    pub fn template(name: &str) -> Option<Self> {
        let steps: Vec<(&str, &str)> = match name {
            "refine" => vec![
                ("StrategyPilot", "StepwiseInsightSynthesis"),
                ("EvaluatorAgent", "PatternCritiqueThenRewrite"),
            ],
            "explain" => vec![
                ("NarrativeArchitect", "AudienceReframe"),
                ("EvaluatorAgent", "PlainLanguageRewrite"),
            ],
            "brief" => vec![
                ("StrategyPilot", "StructuredOutline"),
                ("EvaluatorAgent", "TerseSummary"),
            ],
            _ => return None,
        };
        Some(Self {
            execution_mode: "balanced".to_string(),
            chain: steps
                .into_iter()
                .map(|(agent, pattern)| ChainStep {
                    agent: agent.to_string(),
                    pattern: pattern.to_string(),
                })
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// How a step's output made it into the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    /// First output passed the gate (or gating was disabled).
    Accepted,
    /// The fallback pattern's output passed the gate.
    AcceptedAfterFallback,
    /// Gate failed and no further substitution was available; accepted as-is.
    AcceptedDespiteShortfall,
}

/// One entry of the reasoning trail.  Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub agent: String,
    /// The pattern that produced the accepted output (post-fallback).
    pub pattern: String,
    pub output: String,
    pub metrics: BTreeMap<String, MetricScore>,
    pub preview: String,
    pub outcome: StepOutcome,
}

/// Recorded when and only when quality gating rejected the first output and a
/// fallback pattern was substituted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackEvent {
    pub agent: String,
    pub failed_pattern: String,
    pub fallback_pattern: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct ChainResult {
    pub execution_id: String,
    pub final_output: String,
    pub trail: Vec<StepResult>,
    /// Aggregate metrics: the last step's, by convention.
    pub metrics: BTreeMap<String, MetricScore>,
    pub fallback_events: Vec<FallbackEvent>,
}

fn preview_of(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// ChainExecutor
// ---------------------------------------------------------------------------

/// Owns its collaborating services; everything is constructed and passed in
/// explicitly so tests can substitute in-memory fakes.
pub struct ChainExecutor {
    catalog: PatternCatalog,
    roster: AgentRoster,
    evaluator: Box<dyn Evaluator>,
    modes: ExecutionModeMap,
    transformer: InputTransformer,
    filter: SafetyFilter,
    memory: MemoryStore,
    adaptive: bool,
}

impl ChainExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: PatternCatalog,
        roster: AgentRoster,
        evaluator: Box<dyn Evaluator>,
        modes: ExecutionModeMap,
        transformer: InputTransformer,
        filter: SafetyFilter,
        memory: MemoryStore,
    ) -> Self {
        Self {
            catalog,
            roster,
            evaluator,
            modes,
            transformer,
            filter,
            memory,
            adaptive: true,
        }
    }

    /// Stock services around the given memory store.
    pub fn standard(memory: MemoryStore) -> Self {
        Self::new(
            PatternCatalog::with_builtins(),
            AgentRoster::standard(),
            Box::new(QualityEvaluator),
            ExecutionModeMap::standard(),
            InputTransformer::new(),
            SafetyFilter::new(),
            memory,
        )
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_filter(mut self, filter: SafetyFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> &SafetyFilter {
        &self.filter
    }

    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    /// Run one chain over `input`.
    pub fn execute(
        &mut self,
        config: &ChainConfig,
        input: &str,
    ) -> Result<ChainResult, PipelineError> {
        if config.chain.is_empty() {
            return Err(PipelineError::MalformedConfig(
                "chain has no steps".to_string(),
            ));
        }
        // Unknown names are fatal before any step runs.
        for step in &config.chain {
            if self.catalog.get(&step.pattern).is_none() {
                return Err(PipelineError::UnknownPattern(step.pattern.clone()));
            }
            if !self.roster.contains(&step.agent) {
                return Err(PipelineError::UnknownAgent(step.agent.clone()));
            }
        }

        let threshold = self.modes.get(&config.execution_mode).critique_threshold;
        let execution_id = Uuid::new_v4().to_string();
        info!(
            execution_id = %execution_id,
            mode = %config.execution_mode,
            steps = config.chain.len(),
            adaptive = self.adaptive,
            "chain execution started"
        );

        let mut current = input.to_string();
        let mut trail: Vec<StepResult> = Vec::new();
        let mut fallback_events: Vec<FallbackEvent> = Vec::new();

        for (index, step) in config.chain.iter().enumerate() {
            debug!(step = index, agent = %step.agent, pattern = %step.pattern, "running step");
            let (output, report, used_pattern, outcome) = self.run_step(
                step,
                &current,
                &config.execution_mode,
                threshold,
                &mut fallback_events,
            );

            self.memory.record_pattern_use(PatternUseRecord {
                timestamp_ms: now_ms(),
                agent: step.agent.clone(),
                pattern: used_pattern.clone(),
                metrics: report.metrics.clone(),
                critique_threshold: threshold,
                was_fallback: used_pattern != step.pattern,
            })?;

            // Reshape the accepted output into the next step's expected input.
            current = match config.chain.get(index + 1) {
                Some(next) => self.transformer.transform(
                    &output,
                    &next.agent,
                    &config.execution_mode,
                    Some(SECTION_CHARS),
                ),
                None => output.clone(),
            };

            trail.push(StepResult {
                agent: step.agent.clone(),
                pattern: used_pattern,
                preview: preview_of(&output, PREVIEW_CHARS),
                metrics: report.metrics,
                output,
                outcome,
            });
        }

        let last = trail.last().expect("chain validated non-empty");
        let metrics = last.metrics.clone();
        let final_output = last.output.clone();

        self.memory.record_chain_execution(ChainExecutionRecord {
            timestamp_ms: now_ms(),
            execution_id: execution_id.clone(),
            execution_mode: config.execution_mode.clone(),
            chain: config.chain.clone(),
            metrics: metrics.clone(),
            critique_threshold: threshold,
            output_preview: preview_of(&final_output, 200),
        })?;
        self.filter.flush()?;

        info!(
            execution_id = %execution_id,
            fallbacks = fallback_events.len(),
            "chain execution completed"
        );
        Ok(ChainResult {
            execution_id,
            final_output,
            trail,
            metrics,
            fallback_events,
        })
    }

    /// Apply / sanitize / evaluate, with at most one fallback substitution.
    fn run_step(
        &mut self,
        step: &ChainStep,
        input: &str,
        mode: &str,
        threshold: f64,
        fallback_events: &mut Vec<FallbackEvent>,
    ) -> (String, QualityReport, String, StepOutcome) {
        let (output, report) = self.apply_once(&step.pattern, &step.agent, input, mode);

        if !(self.adaptive && report.any_below(threshold)) {
            return (output, report, step.pattern.clone(), StepOutcome::Accepted);
        }

        // The fallback edge is a hint: it may be absent, or point at a
        // pattern that was never registered.
        let fallback_name = self
            .catalog
            .fallback_of(&step.pattern)
            .filter(|name| self.catalog.get(name).is_some())
            .map(str::to_string);
        let Some(fallback_name) = fallback_name else {
            return (
                output,
                report,
                step.pattern.clone(),
                StepOutcome::AcceptedDespiteShortfall,
            );
        };

        let reason = report
            .fallback_reason
            .clone()
            .unwrap_or_else(|| "metrics below critique threshold".to_string());
        info!(
            agent = %step.agent,
            failed = %step.pattern,
            fallback = %fallback_name,
            reason = %reason,
            "substituting fallback pattern"
        );
        fallback_events.push(FallbackEvent {
            agent: step.agent.clone(),
            failed_pattern: step.pattern.clone(),
            fallback_pattern: fallback_name.clone(),
            reason,
        });

        let (fb_output, fb_report) = self.apply_once(&fallback_name, &step.agent, input, mode);
        let outcome = if fb_report.any_below(threshold) {
            // No further recursion: still-failing output is accepted as-is.
            StepOutcome::AcceptedDespiteShortfall
        } else {
            StepOutcome::AcceptedAfterFallback
        };
        (fb_output, fb_report, fallback_name, outcome)
    }

    /// One process → sanitize → evaluate round for a single pattern.  The
    /// report merges the evaluator's metrics with the agent's fabricated
    /// scores so gating sees both.
    fn apply_once(
        &mut self,
        pattern_name: &str,
        agent_name: &str,
        input: &str,
        mode: &str,
    ) -> (String, QualityReport) {
        let pattern = self
            .catalog
            .get(pattern_name)
            .expect("pattern validated before execution");
        let agent = self
            .roster
            .get(agent_name)
            .expect("agent validated before execution");
        let ctx = AgentContext {
            pattern,
            execution_mode: mode,
        };
        let response = agent.process(input, &ctx);
        let sanitized = self.filter.sanitize(&response.output, pattern_name);
        let report = self.evaluator.evaluate(&sanitized, pattern_name);

        let mut metrics = report.metrics;
        for (name, value) in response.metrics {
            metrics.insert(name, MetricScore::clean(value));
        }
        (sanitized, QualityReport::from_metrics(metrics))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::ConstantEvaluator;

    fn executor() -> ChainExecutor {
        ChainExecutor::standard(MemoryStore::in_memory())
    }

    fn config(mode: &str, steps: &[(&str, &str)]) -> ChainConfig {
        ChainConfig {
            execution_mode: mode.to_string(),
            chain: steps
                .iter()
                .map(|(a, p)| ChainStep {
                    agent: a.to_string(),
                    pattern: p.to_string(),
                })
                .collect(),
        }
    }

    fn refine(mode: &str) -> ChainConfig {
        config(
            mode,
            &[
                ("StrategyPilot", "StepwiseInsightSynthesis"),
                ("EvaluatorAgent", "PatternCritiqueThenRewrite"),
            ],
        )
    }

    // -- configuration parsing --

    #[test]
    fn test_config_from_json() {
        let cfg = ChainConfig::from_json(
            r#"{"execution_mode":"ship","chain":[{"agent":"StrategyPilot","pattern":"TerseSummary"}]}"#,
        )
        .unwrap();
        assert_eq!(cfg.execution_mode, "ship");
        assert_eq!(cfg.chain.len(), 1);
    }

    #[test]
    fn test_config_from_json_rejects_bad_json() {
        let err = ChainConfig::from_json("{broken").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedConfig(_)));
    }

    #[test]
    fn test_config_from_json_rejects_empty_chain() {
        let err =
            ChainConfig::from_json(r#"{"execution_mode":"ship","chain":[]}"#).unwrap_err();
        assert!(err.to_string().contains("no steps"));
    }

    #[test]
    fn test_config_from_missing_file_is_storage_error() {
        let err = ChainConfig::from_file(Path::new("/nonexistent/chain.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Storage { .. }));
    }

    #[test]
    fn test_templates_resolve() {
        for name in ["refine", "explain", "brief"] {
            let cfg = ChainConfig::template(name).unwrap();
            assert_eq!(cfg.chain.len(), 2, "template {}", name);
        }
        assert!(ChainConfig::template("nope").is_none());
    }

    // -- fatal configuration errors --

    #[test]
    fn test_unknown_pattern_aborts() {
        let mut exec = executor();
        let cfg = config("ship", &[("StrategyPilot", "GhostPattern")]);
        let err = exec.execute(&cfg, "text").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownPattern(name) if name == "GhostPattern"));
    }

    #[test]
    fn test_unknown_agent_aborts() {
        let mut exec = executor();
        let cfg = config("ship", &[("GhostAgent", "TerseSummary")]);
        let err = exec.execute(&cfg, "text").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownAgent(name) if name == "GhostAgent"));
    }

    #[test]
    fn test_unknown_name_in_later_step_aborts_before_any_step_runs() {
        let mut exec = executor();
        let cfg = config(
            "ship",
            &[
                ("StrategyPilot", "TerseSummary"),
                ("StrategyPilot", "GhostPattern"),
            ],
        );
        assert!(exec.execute(&cfg, "text").is_err());
        assert!(exec.memory_mut().pattern_uses_since(60).is_empty());
    }

    #[test]
    fn test_empty_chain_aborts() {
        let mut exec = executor();
        let cfg = config("ship", &[]);
        assert!(matches!(
            exec.execute(&cfg, "text"),
            Err(PipelineError::MalformedConfig(_))
        ));
    }

    // -- happy path --

    #[test]
    fn test_two_step_chain_produces_two_entry_trail() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.95)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        assert_eq!(result.trail.len(), 2);
        assert!(!result.final_output.trim().is_empty());
        assert!(result.fallback_events.is_empty());
    }

    #[test]
    fn test_trail_records_agents_in_order() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.95)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        assert_eq!(result.trail[0].agent, "StrategyPilot");
        assert_eq!(result.trail[1].agent, "EvaluatorAgent");
        assert!(result
            .trail
            .iter()
            .all(|s| s.outcome == StepOutcome::Accepted));
    }

    #[test]
    fn test_final_output_is_last_step_output() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.95)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        assert_eq!(result.final_output, result.trail[1].output);
    }

    #[test]
    fn test_aggregate_metrics_are_last_steps() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.95)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        assert_eq!(result.metrics, result.trail[1].metrics);
    }

    #[test]
    fn test_preview_is_capped() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.95)));
        let long_input = "A sentence. ".repeat(100);
        let result = exec.execute(&refine("ship"), &long_input).unwrap();
        assert!(result.trail[0].preview.chars().count() <= 120);
    }

    #[test]
    fn test_step_metrics_include_agent_scores() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.95)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        let metrics = &result.trail[0].metrics;
        assert!(metrics.contains_key("relevance"));
        assert!(metrics.contains_key("clarity"));
    }

    // -- memory recording --

    #[test]
    fn test_every_step_records_pattern_use() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.95)));
        exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        let uses = exec.memory_mut().pattern_uses_since(60);
        assert_eq!(uses.len(), 2);
        assert!((uses[0].critique_threshold - 0.8).abs() < 1e-9);
        assert!(!uses[0].was_fallback);
    }

    #[test]
    fn test_completion_records_chain_execution() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.95)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        let execs = exec.memory_mut().chain_executions_since(60);
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].execution_id, result.execution_id);
        assert_eq!(execs[0].execution_mode, "ship");
        assert_eq!(execs[0].chain.len(), 2);
    }

    // -- fallback gating --

    #[test]
    fn test_all_low_metrics_one_fallback_per_step() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.1)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        // One substitution per step, never more, even though the fallback
        // also scores below threshold.
        assert_eq!(result.fallback_events.len(), 2);
        assert!(result
            .trail
            .iter()
            .all(|s| s.outcome == StepOutcome::AcceptedDespiteShortfall));
    }

    #[test]
    fn test_fallback_event_names_both_patterns() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.1)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        let event = &result.fallback_events[0];
        assert_eq!(event.agent, "StrategyPilot");
        assert_eq!(event.failed_pattern, "StepwiseInsightSynthesis");
        assert_eq!(event.fallback_pattern, "PatternCritiqueThenRewrite");
        assert!(!event.reason.is_empty());
    }

    #[test]
    fn test_fallback_recorded_in_memory_with_flag() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.1)));
        exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        let uses = exec.memory_mut().pattern_uses_since(60);
        assert!(uses.iter().all(|u| u.was_fallback));
        assert_eq!(uses[0].pattern, "PatternCritiqueThenRewrite");
    }

    #[test]
    fn test_trail_pattern_is_post_fallback() {
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.1)));
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        assert_eq!(result.trail[0].pattern, "PatternCritiqueThenRewrite");
    }

    #[test]
    fn test_adaptive_disabled_never_falls_back() {
        let mut exec = executor()
            .with_evaluator(Box::new(ConstantEvaluator(0.1)))
            .with_adaptive(false);
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        assert!(result.fallback_events.is_empty());
        assert_eq!(result.trail[0].pattern, "StepwiseInsightSynthesis");
        assert!(result
            .trail
            .iter()
            .all(|s| s.outcome == StepOutcome::Accepted));
    }

    #[test]
    fn test_no_fallback_edge_accepts_shortfall_without_event() {
        let mut catalog = PatternCatalog::with_builtins();
        // Rebuild without edges: a fresh catalog re-registering the builtins.
        let mut bare = PatternCatalog::new();
        for name in catalog.list() {
            bare.register(catalog.get(name).unwrap().clone());
        }
        catalog = bare;
        let mut exec = ChainExecutor::new(
            catalog,
            AgentRoster::standard(),
            Box::new(ConstantEvaluator(0.1)),
            ExecutionModeMap::standard(),
            InputTransformer::new(),
            SafetyFilter::new(),
            MemoryStore::in_memory(),
        );
        let result = exec.execute(&refine("ship"), "Launch plan draft").unwrap();
        assert!(result.fallback_events.is_empty());
        assert_eq!(
            result.trail[0].outcome,
            StepOutcome::AcceptedDespiteShortfall
        );
    }

    #[test]
    fn test_dangling_fallback_edge_treated_as_none() {
        let mut catalog = PatternCatalog::with_builtins();
        catalog.set_fallback("StepwiseInsightSynthesis", "NeverRegistered");
        let mut exec = ChainExecutor::new(
            catalog,
            AgentRoster::standard(),
            Box::new(ConstantEvaluator(0.1)),
            ExecutionModeMap::standard(),
            InputTransformer::new(),
            SafetyFilter::new(),
            MemoryStore::in_memory(),
        );
        let cfg = config("ship", &[("StrategyPilot", "StepwiseInsightSynthesis")]);
        let result = exec.execute(&cfg, "Launch plan draft").unwrap();
        assert!(result.fallback_events.is_empty());
        assert_eq!(result.trail[0].pattern, "StepwiseInsightSynthesis");
    }

    #[test]
    fn test_borderline_score_at_threshold_passes() {
        // ship threshold is 0.8; a flat 0.8 is not below it.
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.8)));
        let cfg = config("ship", &[("EvaluatorAgent", "TerseSummary")]);
        let result = exec.execute(&cfg, "Launch plan draft. More detail.").unwrap();
        assert!(result.fallback_events.is_empty());
    }

    #[test]
    fn test_simulate_threshold_is_looser() {
        // 0.65 fails ship (0.8) but passes simulate (0.6).
        let cfg_ship = config("ship", &[("EvaluatorAgent", "TerseSummary")]);
        let cfg_sim = config("simulate", &[("EvaluatorAgent", "TerseSummary")]);
        let mut ship = executor().with_evaluator(Box::new(ConstantEvaluator(0.65)));
        let mut sim = executor().with_evaluator(Box::new(ConstantEvaluator(0.65)));
        assert_eq!(
            ship.execute(&cfg_ship, "Draft.").unwrap().fallback_events.len(),
            1
        );
        assert!(sim.execute(&cfg_sim, "Draft.").unwrap().fallback_events.is_empty());
    }

    // -- sanitization in the loop --

    #[test]
    fn test_step_output_is_sanitized() {
        use crate::agents::{Agent, AgentResponse};
        struct HostileAgent;
        impl Agent for HostileAgent {
            fn name(&self) -> &str {
                "HostileAgent"
            }
            fn process(&self, _input: &str, _ctx: &AgentContext<'_>) -> AgentResponse {
                AgentResponse {
                    output: "ok <script>alert(1)</script> done".to_string(),
                    metrics: BTreeMap::new(),
                    confidence: 1.0,
                }
            }
        }
        let mut roster = AgentRoster::standard();
        roster.register(Box::new(HostileAgent));
        let mut exec = ChainExecutor::new(
            PatternCatalog::with_builtins(),
            roster,
            Box::new(ConstantEvaluator(0.95)),
            ExecutionModeMap::standard(),
            InputTransformer::new(),
            SafetyFilter::new(),
            MemoryStore::in_memory(),
        );
        let cfg = config("ship", &[("HostileAgent", "TerseSummary")]);
        let result = exec.execute(&cfg, "input").unwrap();
        assert!(!result.final_output.contains("<script>"));
        assert_eq!(exec.filter().events().len(), 1);
        assert_eq!(exec.filter().events()[0].rule, "blocked_pattern_script_tag");
    }

    // -- mode fallthrough --

    #[test]
    fn test_unknown_mode_uses_neutral_threshold() {
        // 0.65 is below neutral 0.7, so one fallback fires.
        let mut exec = executor().with_evaluator(Box::new(ConstantEvaluator(0.65)));
        let cfg = config("mystery", &[("EvaluatorAgent", "TerseSummary")]);
        let result = exec.execute(&cfg, "Draft.").unwrap();
        assert_eq!(result.fallback_events.len(), 1);
        let uses = exec.memory_mut().pattern_uses_since(60);
        assert!((uses[0].critique_threshold - 0.7).abs() < 1e-9);
    }
}
