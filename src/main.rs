mod archive;
mod cluster;
mod models;
mod normalize;
mod orchestrator;
mod report;
mod resolve;
mod similarity;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};

use cluster::{DedupParams, DEFAULT_THRESHOLD, DEFAULT_WINDOW_HOURS};
use orchestrator::{run_dedup, RunOptions};
use report::render_summary;

/// Detect and remove near-duplicate posts from an archive file
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input post archive
    input_file: PathBuf,

    /// Output file for cleaned posts (same layout as the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file for the duplicate report (JSON)
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Content similarity threshold (0.0-1.0)
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Date window in hours for comparison
    #[arg(short, long, default_value_t = DEFAULT_WINDOW_HOURS)]
    window: i64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    let args = Args::parse();
    debug!("Arguments parsed - {:?}", args);

    let params = DedupParams::new(args.threshold, args.window)?;
    let opts = RunOptions {
        input: args.input_file,
        output: args.output,
        report: args.report,
        params,
    };

    info!("Starting post_dedup");
    let outcome = run_dedup(&opts)?;
    println!("{}", render_summary(&outcome.report, 3));
    Ok(())
}
