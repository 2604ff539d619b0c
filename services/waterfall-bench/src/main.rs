//! Scroll-simulation benchmark for the tile scheduler.
//!
//! Drives a scheduler with the synthetic sonar source and waterfall
//! renderer the way a viewer would: a window of port and starboard tiles
//! advancing along-track, committed under a new epoch every step.

mod config;
mod report;
mod runner;

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use config::BenchConfig;

#[derive(Parser, Debug)]
#[command(name = "waterfall-bench")]
#[command(about = "Scroll simulation against the waterfall tile scheduler")]
struct Args {
    /// Path to scenario YAML file
    #[arg(short, long, env = "BENCH_SCENARIO")]
    scenario: Option<PathBuf>,

    /// Override the number of generator slots
    #[arg(short, long)]
    generators: Option<usize>,

    /// Override the number of scroll steps
    #[arg(long)]
    steps: Option<u64>,

    /// Output format: table (default), json
    #[arg(short, long, default_value = "table")]
    output: String,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,

    /// Log level
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    if args.json_logs {
        fmt().with_env_filter(filter).with_target(true).json().init();
    } else {
        fmt().with_env_filter(filter).with_target(true).init();
    }

    let prometheus = PrometheusBuilder::new().install_recorder()?;

    let mut config = match &args.scenario {
        Some(path) => {
            info!(path = %path.display(), "Loading scenario");
            BenchConfig::from_file(path)?
        }
        None => BenchConfig::default(),
    };

    // Apply overrides
    if let Some(n) = args.generators {
        config.scheduler.max_generators = n;
    }
    if let Some(steps) = args.steps {
        config.view.steps = steps;
    }
    config.validate()?;

    let results = runner::run(&config)?;

    match args.output.as_str() {
        "json" => println!("{}", report::format_json(&results)?),
        _ => println!("{}", report::format_table(&results)),
    }

    if args.metrics {
        println!("{}", prometheus.render());
    }

    Ok(())
}
