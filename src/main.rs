//! Next-day return forecaster.
//!
//! # Usage
//!
//! ```bash
//! # Full run: peers, features, stacking, test-window forecasts
//! mahler-forecast run --config config/aapl.toml --output results/aapl.json
//!
//! # Show the sector peers chosen on the training window
//! mahler-forecast peers --config config/aapl.toml
//!
//! # Check the loaded price files
//! mahler-forecast validate --config config/aapl.toml
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mahler_forecast::progress::ProgressHook;
use mahler_forecast::validation::DataIntegrityValidator;
use mahler_forecast::{ForecastPipeline, PipelineConfig};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "mahler-forecast")]
#[command(about = "Leakage-safe next-day return forecasting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the config's data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full forecasting pipeline
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Where to write the JSON report
        #[arg(short, long, default_value = "results/report.json")]
        output: PathBuf,
    },

    /// Select and print sector peers
    Peers {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run data integrity checks
    Validate {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Progress bar driven by pipeline stage updates.
struct BarHook {
    bar: ProgressBar,
}

impl BarHook {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                .progress_chars("=>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressHook for BarHook {
    fn on_progress(&self, stage: &str, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
        self.bar.set_message(stage.to_string());
    }
}

fn load_pipeline(config: &Path, data_dir: Option<PathBuf>) -> Result<ForecastPipeline> {
    let mut cfg = PipelineConfig::load_toml(config)
        .with_context(|| format!("Failed to load config {}", config.display()))?;
    if let Some(dir) = data_dir {
        cfg.data_dir = dir;
    }
    Ok(ForecastPipeline::new(cfg)?)
}

fn cmd_run(pipeline: &ForecastPipeline, output: PathBuf) -> Result<()> {
    let universe = pipeline
        .load_universe()
        .context("Failed to load price data")?;

    let hook = BarHook::new()?;
    let result = pipeline.run_with(&universe, &hook);
    hook.bar.finish_and_clear();
    let result = result?;
    let report = &result.report;

    println!("{}", SEPARATOR);
    println!("Forecast: {}", report.target);
    println!("{}", SEPARATOR);
    println!("\nSector peers:");
    for peer in &report.peers {
        println!("  {:<8} corr {:.3}", peer.ticker, peer.correlation);
    }
    if report.reduced_peer_count {
        println!("  (fewer peers than requested)");
    }
    println!("\nMeta weights:");
    for (id, w) in &report.meta_weights {
        println!("  {:<20} {:.4}", id, w);
    }
    println!("  {:<20} {:.6}", "intercept", report.meta_intercept);
    println!("\n{}", report.metrics.summary());

    let (buy, hold, sell) = report.decision_counts();
    println!("Decisions: {} buy, {} hold, {} sell", buy, hold, sell);

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, report.to_json()?)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("\nReport written to {}", output.display());
    println!("{}", SEPARATOR);
    Ok(())
}

fn cmd_peers(pipeline: &ForecastPipeline) -> Result<()> {
    let universe = pipeline
        .load_universe()
        .context("Failed to load price data")?;
    let sector = pipeline.select_peers(&universe)?;
    let cfg = pipeline.config();

    println!(
        "Peers for {} (train {}, k = {}):",
        cfg.target, cfg.windows.train, sector.requested_k
    );
    for (rank, peer) in sector.peers.iter().enumerate() {
        println!("  {}. {:<8} corr {:.3}", rank + 1, peer.ticker, peer.correlation);
    }
    if sector.reduced_peer_count {
        println!("Only {} candidates qualified.", sector.peers.len());
    }
    Ok(())
}

fn cmd_validate(pipeline: &ForecastPipeline) -> Result<()> {
    let universe = pipeline
        .load_universe()
        .context("Failed to load price data")?;
    let validator = DataIntegrityValidator::new(pipeline.config().price_field);

    let mut failures = 0;
    for report in validator.validate_universe(&universe) {
        println!("{}", report.summary());
        for check in report.failed_checks() {
            failures += 1;
            println!("  FAIL {}: {}", check.name, check.message);
            if let Some(details) = &check.details {
                println!("       {}", details);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{} integrity checks failed", failures);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mahler_forecast=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            let pipeline = load_pipeline(&config, cli.data_dir)?;
            cmd_run(&pipeline, output)?;
        }
        Commands::Peers { config } => {
            let pipeline = load_pipeline(&config, cli.data_dir)?;
            cmd_peers(&pipeline)?;
        }
        Commands::Validate { config } => {
            let pipeline = load_pipeline(&config, cli.data_dir)?;
            cmd_validate(&pipeline)?;
        }
    }

    Ok(())
}
