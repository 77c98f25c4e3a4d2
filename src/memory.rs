//! Durable usage memory.
//!
//! ## Responsibility
//! Append-only, time-windowed log of pattern uses and chain executions.  The
//! store is the durable owner of all historical records across executions:
//! loaded lazily on first access, rewritten in full (by temp-file-and-rename
//! replacement) after every append.  An unreadable or malformed file is
//! treated as an empty store; write failures propagate, since silent data
//! loss would corrupt historical statistics.
//!
//! ## Guarantees
//! - Records are immutable once written and never reordered.
//! - Single-threaded by design; a multi-threaded embedding must serialize
//!   access around the load-mutate-persist cycle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::executor::ChainStep;
use crate::quality::MetricScore;

// ---------------------------------------------------------------------------
// Clock and storage helpers
// ---------------------------------------------------------------------------

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Write `contents` to `path` by replacement: write a sibling temp file, then
/// rename it over the target.
pub(crate) fn atomic_write(path: &Path, contents: &str) -> Result<(), PipelineError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents).map_err(|source| PipelineError::Storage {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| PipelineError::Storage {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// One pattern invocation inside one chain step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternUseRecord {
    pub timestamp_ms: u64,
    pub agent: String,
    pub pattern: String,
    pub metrics: BTreeMap<String, MetricScore>,
    /// The critique threshold active when this use was recorded.  Statistics
    /// judge success against this value, not a hard-coded constant.
    pub critique_threshold: f64,
    /// True when this use was a substituted fallback pattern.
    pub was_fallback: bool,
}

impl PatternUseRecord {
    /// Sum of the numeric metric values.
    pub fn total_score(&self) -> f64 {
        self.metrics.values().filter_map(|m| m.score).sum()
    }

    /// All numeric metrics at or above the recorded threshold.
    pub fn is_success(&self) -> bool {
        self.metrics
            .values()
            .filter_map(|m| m.score)
            .all(|s| s >= self.critique_threshold)
    }
}

/// One completed chain execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExecutionRecord {
    pub timestamp_ms: u64,
    pub execution_id: String,
    pub execution_mode: String,
    pub chain: Vec<ChainStep>,
    /// Aggregate metrics: the last step's, by convention.
    pub metrics: BTreeMap<String, MetricScore>,
    pub critique_threshold: f64,
    pub output_preview: String,
}

impl ChainExecutionRecord {
    pub fn is_success(&self) -> bool {
        self.metrics
            .values()
            .filter_map(|m| m.score)
            .all(|s| s >= self.critique_threshold)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryData {
    pattern_uses: Vec<PatternUseRecord>,
    chain_executions: Vec<ChainExecutionRecord>,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    path: Option<PathBuf>,
    /// None until first access (lazy load).
    data: Option<MemoryData>,
}

impl MemoryStore {
    /// A store backed by a JSON file, loaded on first access.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            data: None,
        }
    }

    /// A store with no durable backing; the test substitute.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Some(MemoryData::default()),
        }
    }

    fn data_mut(&mut self) -> &mut MemoryData {
        if self.data.is_none() {
            let loaded = match &self.path {
                Some(path) => Self::load(path),
                None => MemoryData::default(),
            };
            self.data = Some(loaded);
        }
        self.data.as_mut().expect("memory data just initialized")
    }

    fn load(path: &Path) -> MemoryData {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => {
                    debug!(path = %path.display(), "loaded memory file");
                    data
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed memory file, starting empty");
                    MemoryData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryData::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable memory file, starting empty");
                MemoryData::default()
            }
        }
    }

    fn persist(&mut self) -> Result<(), PipelineError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let data = self.data_mut();
        let json = serde_json::to_string_pretty(data)?;
        atomic_write(&path, &json)
    }

    // -----------------------------------------------------------------------
    // Appends
    // -----------------------------------------------------------------------

    pub fn record_pattern_use(&mut self, record: PatternUseRecord) -> Result<(), PipelineError> {
        self.data_mut().pattern_uses.push(record);
        self.persist()
    }

    pub fn record_chain_execution(
        &mut self,
        record: ChainExecutionRecord,
    ) -> Result<(), PipelineError> {
        self.data_mut().chain_executions.push(record);
        self.persist()
    }

    // -----------------------------------------------------------------------
    // Time-windowed queries
    // -----------------------------------------------------------------------

    fn cutoff(minutes: u64) -> u64 {
        now_ms().saturating_sub(minutes.saturating_mul(60_000))
    }

    /// Pattern uses from the last `minutes`, in append order.
    pub fn pattern_uses_since(&mut self, minutes: u64) -> Vec<PatternUseRecord> {
        let cutoff = Self::cutoff(minutes);
        self.data_mut()
            .pattern_uses
            .iter()
            .filter(|r| r.timestamp_ms >= cutoff)
            .cloned()
            .collect()
    }

    /// Chain executions from the last `minutes`, in append order.
    pub fn chain_executions_since(&mut self, minutes: u64) -> Vec<ChainExecutionRecord> {
        let cutoff = Self::cutoff(minutes);
        self.data_mut()
            .chain_executions
            .iter()
            .filter(|r| r.timestamp_ms >= cutoff)
            .cloned()
            .collect()
    }

    /// The pattern this agent scored best with inside the window, ranked by
    /// total numeric metric score averaged over uses.  Ties resolve to the
    /// first pattern to reach the maximum; `None` when the agent has no
    /// recent history.
    pub fn best_pattern_for(&mut self, agent: &str, minutes: u64) -> Option<String> {
        let uses = self.pattern_uses_since(minutes);
        // (pattern, total, count) in encounter order.
        let mut totals: Vec<(String, f64, u32)> = Vec::new();
        for record in uses.iter().filter(|r| r.agent == agent) {
            match totals.iter_mut().find(|(p, _, _)| *p == record.pattern) {
                Some((_, total, count)) => {
                    *total += record.total_score();
                    *count += 1;
                }
                None => totals.push((record.pattern.clone(), record.total_score(), 1)),
            }
        }
        let mut best: Option<(String, f64)> = None;
        for (pattern, total, count) in totals {
            let average = total / f64::from(count);
            // Strict comparison: a later equal score does not replace the
            // first pattern to reach the maximum.
            if best.as_ref().map_or(true, |(_, b)| average > *b) {
                best = Some((pattern, average));
            }
        }
        best.map(|(pattern, _)| pattern)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
