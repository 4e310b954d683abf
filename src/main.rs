//! csvdrop command-line entry point
//!
//! Usage: `csvdrop [config.json] [query ...]`
//!
//! With no query names, every stored query in the configured directory
//! is exported and delivered. Exit code 0 means every item succeeded,
//! 1 means at least one item failed, 2 means the pipeline aborted
//! before processing (bad configuration, unreachable delivery target).

use csvdrop::{Config, Pipeline, Result, RunSummary, logging};
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("csvdrop.json"));
    let names: Vec<String> = args.collect();

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("csvdrop: {e}");
            return ExitCode::from(2);
        }
    };
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("csvdrop: {e}");
        return ExitCode::from(2);
    }

    match run(&config, names).await {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(summary) => {
            tracing::error!(failed = summary.failed, "batch finished with failures");
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::error!(error = %e, "pipeline aborted");
            ExitCode::from(2)
        }
    }
}

async fn run(config: &Config, names: Vec<String>) -> Result<RunSummary> {
    let mut pipeline = Pipeline::prepare(config).await?;
    let names = if names.is_empty() {
        pipeline.discover_queries().await?
    } else {
        names
    };
    tracing::info!(count = names.len(), "starting batch");
    pipeline.run(&names).await
}
