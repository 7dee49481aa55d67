//! quake-campaign: run a simulation campaign from the command line
//!
//! ```text
//! quake-campaign --config campaign.json \
//!     --samples inputs/samples.csv \
//!     --ground-motions groundMotions/gmList.csv \
//!     --workers 4
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use quake_campaign::campaign::{Campaign, CampaignSummary};
use quake_campaign::config::CampaignConfig;
use quake_campaign::ground_motion::{GroundMotionTable, TableMatcher};
use quake_campaign::sample::load_samples_csv;
use quake_campaign::solver::ProcessSolver;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Drive the structural solver over sampled designs until enough usable runs
/// are collected.
#[derive(Debug, Parser)]
#[command(name = "quake-campaign", version, about)]
struct Cli {
    /// Campaign configuration (JSON). Defaults apply when omitted.
    #[arg(long, env = "QUAKE_CAMPAIGN_CONFIG")]
    config: Option<PathBuf>,

    /// Parameter sample table (CSV, one column per parameter).
    #[arg(long)]
    samples: PathBuf,

    /// Ground-motion record table (CSV with filename, scaleFactorS1, scaledSa1).
    #[arg(long)]
    ground_motions: PathBuf,

    /// Override the usable-run target.
    #[arg(long)]
    target: Option<usize>,

    /// Override the number of parallel workers.
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let samples = load_samples_csv(&cli.samples)
        .with_context(|| format!("reading samples from {}", cli.samples.display()))?;
    let table = GroundMotionTable::load_csv(&cli.ground_motions)
        .with_context(|| format!("reading ground motions from {}", cli.ground_motions.display()))?;
    let matcher = TableMatcher::new(table, config.ground_motion.clone())
        .context("building ground-motion matcher")?;
    let solver = ProcessSolver::new(&config.solver);

    let workers = config.workers;
    let campaign = Campaign::new(config, Arc::new(solver), Arc::new(matcher));
    let result = if workers > 1 {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("starting runtime")?;
        runtime.block_on(campaign.run_parallel(samples))
    } else {
        campaign.run(samples)
    };
    let summary = result.context("campaign failed")?;

    print_summary(&summary);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<CampaignConfig> {
    let mut config = match &cli.config {
        Some(path) => CampaignConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CampaignConfig::default(),
    };
    if let Some(target) = cli.target {
        config.target_usable = target;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.validate().context("validating config")?;
    Ok(config)
}

fn print_summary(summary: &CampaignSummary) {
    println!(
        "{:?}: {} usable / {} recorded / {} processed ({} skipped, {} dropped, {} checkpoints) in {}s",
        summary.stop,
        summary.usable,
        summary.recorded,
        summary.processed,
        summary.skipped,
        summary.dropped,
        summary.checkpoints,
        (summary.finished_at - summary.started_at).num_seconds()
    );
}
