use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use patternflow::cli::{self, Args};
use patternflow::error::PipelineError;
use patternflow::executor::ChainExecutor;
use patternflow::memory::MemoryStore;
use patternflow::safety::SafetyFilter;
use patternflow::stats::StatsAggregator;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), PipelineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let state_dir = PathBuf::from(&args.state_dir);
    fs::create_dir_all(&state_dir)?;
    let mut memory = MemoryStore::at_path(state_dir.join("memory.json"));

    if args.stats {
        let mut aggregator = StatsAggregator::with_stats_file(state_dir.join("stats.json"));
        let snapshot = aggregator.refresh(&mut memory, args.window_minutes)?;
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let input_path = args.input.as_deref().ok_or_else(|| {
        PipelineError::MalformedConfig(
            "--input <file> is required unless --stats is set".to_string(),
        )
    })?;
    let text = fs::read_to_string(input_path)?;
    let config = cli::resolve_chain(&args)?;

    let mut executor = ChainExecutor::standard(memory)
        .with_filter(SafetyFilter::with_log_file(state_dir.join("safety_log.json")))
        .with_adaptive(!args.no_adaptive);
    let result = executor.execute(&config, &text)?;

    match &args.output {
        Some(path) => fs::write(path, &result.final_output)?,
        None => println!("{}", result.final_output),
    }

    eprintln!("{}", "=".repeat(50).bright_blue());
    eprintln!(
        "{} {} steps in {} mode, {} fallback substitution(s).",
        "Complete!".bright_green(),
        result.trail.len(),
        config.execution_mode.bright_yellow(),
        result.fallback_events.len()
    );
    for event in &result.fallback_events {
        eprintln!(
            "  {} {} -> {} ({})",
            event.agent.bright_yellow(),
            event.failed_pattern,
            event.fallback_pattern.bright_cyan(),
            event.reason
        );
    }
    Ok(())
}
