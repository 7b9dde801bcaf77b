//! Alhazen experiment runner CLI
//!
//! Run a reference experiment across a pool of workers and print or export
//! its per-round aggregates.

use alhazen_sim::{ExperimentId, RunExport, RunOptions};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Alhazen parallel experiment runner
#[derive(Parser, Debug)]
#[command(name = "alhazen-sim")]
#[command(about = "Run simulated experiments in parallel", long_about = None)]
struct Args {
    /// Experiment to run (safe_risky, logistic_walk, all)
    #[arg(short, long, default_value = "safe_risky")]
    experiment: String,

    /// Participants per condition
    #[arg(short, long, default_value = "1000")]
    participants: usize,

    /// Rounds per participant
    #[arg(short, long, default_value = "100")]
    rounds: usize,

    /// Worker threads (0 = one per core)
    #[arg(short, long, default_value = "0")]
    workers: usize,

    /// Comma-separated condition sweep (default depends on the experiment)
    #[arg(short, long)]
    conditions: Option<String>,

    /// Master seed for reproducible runs
    #[arg(short, long)]
    seed: Option<u64>,

    /// Write a structured experiment log to this file
    #[arg(long)]
    log: Option<PathBuf>,

    /// Export the run summary as JSON to this file
    #[arg(long)]
    export: Option<PathBuf>,

    /// JSON output on stdout
    #[arg(long)]
    json: bool,

    /// No progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let experiments: Vec<ExperimentId> = if args.experiment == "all" {
        ExperimentId::all()
    } else {
        vec![args.experiment.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available experiments: safe_risky, logistic_walk, all");
            std::process::exit(1);
        })]
    };

    if experiments.len() > 1 && (args.conditions.is_some() || args.log.is_some() || args.export.is_some()) {
        eprintln!("Error: --conditions, --log and --export need a single experiment, not 'all'");
        std::process::exit(1);
    }

    let options = RunOptions {
        participants: args.participants,
        rounds: args.rounds,
        workers: args.workers,
        conditions: args.conditions.clone(),
        seed: args.seed,
        log: args.log.clone(),
        show_progress: !(args.quiet || args.json),
    };

    let mut exports: Vec<RunExport> = Vec::new();
    for experiment in &experiments {
        if !args.json {
            info!("{} - {}", experiment, experiment.description());
        }

        match experiment.run(&options) {
            Ok(export) => {
                if !args.json {
                    print_summary(&export);
                }
                exports.push(export);
            }
            Err(e) => {
                error!("✗ {} failed: {:#}", experiment, e);
                std::process::exit(1);
            }
        }
    }

    if let Some(path) = &args.export {
        if let Some(export) = exports.first() {
            if let Err(e) = export.write_to_file(path) {
                error!("Failed to write export: {}", e);
                std::process::exit(1);
            }
            info!("Exported {} conditions to {}", export.conditions.len(), path.display());
        }
    }

    if args.json {
        match serde_json::to_string_pretty(&exports) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to encode results: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn print_summary(export: &RunExport) {
    info!(
        "✓ {} finished: {} participants × {} conditions on {} workers in {} ms",
        export.experiment,
        export.participants,
        export.conditions.len(),
        export.workers_used,
        export.elapsed_ms
    );
    for series in &export.conditions {
        let first = series.values.first().copied().unwrap_or(f64::NAN);
        let last = series.values.last().copied().unwrap_or(f64::NAN);
        info!(
            "  condition {:>8}: {} round 1 = {:.4}, round {} = {:.4}",
            series.condition,
            export.metric,
            first,
            series.values.len(),
            last
        );
    }
}
