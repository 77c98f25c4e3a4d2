use std::path::Path;

use clap::Parser;

use crate::error::PipelineError;
use crate::executor::ChainConfig;

#[derive(Parser)]
#[command(name = "patternflow")]
#[command(version = "1.3.0")]
#[command(about = "Adaptive pattern-chain post-processor for drafted text")]
pub struct Args {
    /// Execution mode: simulate, ship, critique, or balanced
    #[arg(default_value = "balanced")]
    pub mode: String,

    /// Input file containing the draft text to process
    #[arg(long)]
    pub input: Option<String>,

    /// Output file for the final text (stdout when omitted)
    #[arg(long)]
    pub output: Option<String>,

    /// Chain configuration JSON file (overrides --template)
    #[arg(long)]
    pub chain_config: Option<String>,

    /// Named builtin chain template (refine, explain, brief)
    #[arg(long, default_value = "refine")]
    pub template: String,

    /// Disable adaptive fallback substitution
    #[arg(long)]
    pub no_adaptive: bool,

    /// Directory for the memory, stats, and safety log files
    #[arg(long, default_value = ".patternflow")]
    pub state_dir: String,

    /// Time window in minutes for statistics queries
    #[arg(long, default_value = "60")]
    pub window_minutes: u64,

    /// Print refreshed statistics for the window and exit
    #[arg(long)]
    pub stats: bool,
}

/// Resolve the chain to run: an explicit config file wins over the template
/// name.  The positional mode overrides the file's `execution_mode` when it
/// differs from the default.
pub fn resolve_chain(args: &Args) -> Result<ChainConfig, PipelineError> {
    let mut config = match &args.chain_config {
        Some(path) => ChainConfig::from_file(Path::new(path))?,
        None => ChainConfig::template(&args.template).ok_or_else(|| {
            PipelineError::MalformedConfig(format!("unknown template '{}'", args.template))
        })?,
    };
    if args.mode != "balanced" {
        config.execution_mode = args.mode.clone();
    }
    Ok(config)
}
