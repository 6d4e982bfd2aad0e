//! foodform-replay - replay a recorded form session
//!
//! Reads a JSON session script (scan results and user actions), runs it
//! through the reconciliation engine and prints the resulting form snapshot
//! followed by the submission validation report.

use anyhow::{Context, Result};
use clap::Parser;
use foodform_common::config::ConfigResolver;
use foodform_engine::replay::{self, ReplayScript};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "foodform-replay", version, about = "Replay a food form session script")]
struct Args {
    /// JSON session script
    script: PathBuf,

    /// Configuration file (overrides FOODFORM_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print the snapshot
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new()
        .with_cli_path(args.config.clone())
        .load()
        .context("Failed to load configuration")?;
    foodform_common::logging::init(&config.logging).context("Failed to initialize logging")?;

    info!("Starting foodform-replay");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script {}", args.script.display()))?;
    let script = ReplayScript::from_json(&text)
        .with_context(|| format!("Invalid script {}", args.script.display()))?;

    let session = replay::replay(&script, config.engine).context("Replay failed")?;

    let snapshot = session.snapshot();
    let json = if args.pretty {
        snapshot.to_json_pretty()
    } else {
        snapshot.to_json()
    }
    .context("Failed to serialize snapshot")?;
    println!("{}", json);

    let report = session.validate();
    if report.is_valid() {
        info!("Form is complete");
    } else {
        for issue in &report.issues {
            eprintln!("{}: {:?}", issue.attribute, issue.issue);
        }
    }

    Ok(())
}
