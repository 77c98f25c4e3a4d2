//! Adaptive pattern-chain post-processing for drafted text.
//!
//! A chain is an ordered list of (agent, pattern) steps.  Each step applies a
//! named text-transformation pattern, sanitizes the result, scores it, and,
//! when adaptive gating is on, substitutes the pattern's single configured
//! fallback if any metric falls below the execution mode's critique
//! threshold.  Every step and every substitution is recorded into a durable
//! memory log that the stats aggregator rolls up on demand.

pub mod agents;
pub mod cli;
pub mod error;
pub mod executor;
pub mod memory;
pub mod modes;
pub mod patterns;
pub mod quality;
pub mod safety;
pub mod stats;
pub mod transformer;

pub use error::PipelineError;
pub use executor::{ChainConfig, ChainExecutor, ChainResult, ChainStep, FallbackEvent, StepResult};
