//! Derived statistics.
//!
//! Rolls the memory log into per-pattern, per-agent, and per-mode summaries
//! over a configurable time window.  The snapshot is non-authoritative and is
//! recomputed from scratch on every refresh; nothing is patched
//! incrementally across sessions.  Each refresh fully replaces the in-memory
//! snapshot and then rewrites the stats file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::memory::{atomic_write, now_ms, MemoryStore, PatternUseRecord};

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternStats {
    pub uses: u64,
    pub success_rate: f64,
    pub fallback_rate: f64,
    pub metric_averages: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentStats {
    pub uses: u64,
    pub success_rate: f64,
    pub fallback_rate: f64,
    pub metric_averages: BTreeMap<String, f64>,
    /// Per-pattern breakdown within this agent.
    pub patterns: BTreeMap<String, PatternStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModeStats {
    pub executions: u64,
    pub success_rate: f64,
    pub metric_averages: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub patterns: BTreeMap<String, PatternStats>,
    pub agents: BTreeMap<String, AgentStats>,
    pub modes: BTreeMap<String, ModeStats>,
    pub last_updated: u64,
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Accumulator {
    uses: u64,
    successes: u64,
    fallbacks: u64,
    metric_sums: BTreeMap<String, (f64, u64)>,
}

impl Accumulator {
    fn add_use(&mut self, record: &PatternUseRecord) {
        self.uses += 1;
        if record.is_success() {
            self.successes += 1;
        }
        if record.was_fallback {
            self.fallbacks += 1;
        }
        for (name, metric) in &record.metrics {
            if let Some(score) = metric.score {
                let entry = self.metric_sums.entry(name.clone()).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }
    }

    fn averages(&self) -> BTreeMap<String, f64> {
        self.metric_sums
            .iter()
            .map(|(name, (sum, count))| (name.clone(), sum / *count as f64))
            .collect()
    }

    fn rate(numerator: u64, denominator: u64) -> f64 {
        if denominator == 0 {
            0.0
        } else {
            numerator as f64 / denominator as f64
        }
    }

    fn into_pattern_stats(self) -> PatternStats {
        PatternStats {
            uses: self.uses,
            success_rate: Self::rate(self.successes, self.uses),
            fallback_rate: Self::rate(self.fallbacks, self.uses),
            metric_averages: self.averages(),
        }
    }
}

// ---------------------------------------------------------------------------
// StatsAggregator
// ---------------------------------------------------------------------------

pub struct StatsAggregator {
    path: Option<PathBuf>,
    snapshot: StatsSnapshot,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            path: None,
            snapshot: StatsSnapshot::default(),
        }
    }

    /// An aggregator that persists each snapshot to a JSON file, fully
    /// replaced per recomputation.
    pub fn with_stats_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            snapshot: StatsSnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> &StatsSnapshot {
        &self.snapshot
    }

    /// Recompute everything from the memory window and replace the snapshot.
    pub fn refresh(
        &mut self,
        memory: &mut MemoryStore,
        window_minutes: u64,
    ) -> Result<&StatsSnapshot, PipelineError> {
        let uses = memory.pattern_uses_since(window_minutes);
        let executions = memory.chain_executions_since(window_minutes);

        let mut per_pattern: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut per_agent: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut per_agent_pattern: BTreeMap<String, BTreeMap<String, Accumulator>> =
            BTreeMap::new();
        for record in &uses {
            per_pattern
                .entry(record.pattern.clone())
                .or_default()
                .add_use(record);
            per_agent
                .entry(record.agent.clone())
                .or_default()
                .add_use(record);
            per_agent_pattern
                .entry(record.agent.clone())
                .or_default()
                .entry(record.pattern.clone())
                .or_default()
                .add_use(record);
        }

        let patterns: BTreeMap<String, PatternStats> = per_pattern
            .into_iter()
            .map(|(name, acc)| (name, acc.into_pattern_stats()))
            .collect();

        let mut agents: BTreeMap<String, AgentStats> = BTreeMap::new();
        for (agent, acc) in per_agent {
            let breakdown = per_agent_pattern
                .remove(&agent)
                .unwrap_or_default()
                .into_iter()
                .map(|(pattern, acc)| (pattern, acc.into_pattern_stats()))
                .collect();
            let stats = acc.into_pattern_stats();
            agents.insert(
                agent,
                AgentStats {
                    uses: stats.uses,
                    success_rate: stats.success_rate,
                    fallback_rate: stats.fallback_rate,
                    metric_averages: stats.metric_averages,
                    patterns: breakdown,
                },
            );
        }

        let mut per_mode: BTreeMap<String, (u64, u64, BTreeMap<String, (f64, u64)>)> =
            BTreeMap::new();
        for record in &executions {
            let entry = per_mode.entry(record.execution_mode.clone()).or_default();
            entry.0 += 1;
            if record.is_success() {
                entry.1 += 1;
            }
            for (name, metric) in &record.metrics {
                if let Some(score) = metric.score {
                    let sums = entry.2.entry(name.clone()).or_insert((0.0, 0));
                    sums.0 += score;
                    sums.1 += 1;
                }
            }
        }
        let modes: BTreeMap<String, ModeStats> = per_mode
            .into_iter()
            .map(|(mode, (count, successes, sums))| {
                (
                    mode,
                    ModeStats {
                        executions: count,
                        success_rate: Accumulator::rate(successes, count),
                        metric_averages: sums
                            .into_iter()
                            .map(|(name, (sum, n))| (name, sum / n as f64))
                            .collect(),
                    },
                )
            })
            .collect();

        self.snapshot = StatsSnapshot {
            patterns,
            agents,
            modes,
            last_updated: now_ms(),
        };
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&self.snapshot)?;
            atomic_write(path, &json)?;
        }
        Ok(&self.snapshot)
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
