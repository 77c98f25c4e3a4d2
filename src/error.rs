use std::path::PathBuf;

use thiserror::Error;

/// Crate-level error type.
///
/// Configuration problems (unknown pattern or agent names, malformed chain
/// files) are fatal and abort an execution.  Quality shortfalls and safety
/// violations are *events*, not errors, and never appear here.  Storage
/// write failures propagate; load failures are downgraded to warnings inside
/// the memory store.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown pattern '{0}' in chain configuration")]
    UnknownPattern(String),

    #[error("unknown agent '{0}' in chain configuration")]
    UnknownAgent(String),

    #[error("malformed chain configuration: {0}")]
    MalformedConfig(String),

    #[error("storage failure for {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
