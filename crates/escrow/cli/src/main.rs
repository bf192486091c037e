//! escrowctl - loan escrow scenario replay
//!
//! Replays YAML scenario files against an in-memory escrow host with a
//! manual clock, printing every notification and the final loan state.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod output;
mod runner;
mod scenario;

use config::EscrowCtlConfig;
use output::OutputFormat;
use runner::Runner;
use scenario::Scenario;

/// escrowctl CLI
#[derive(Parser)]
#[command(name = "escrowctl")]
#[command(about = "Replay multi-lender loan escrow scenarios", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ESCROW_CONFIG", global = true)]
    config: Option<String>,

    /// Log level (overrides configuration)
    #[arg(long, env = "ESCROW_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file
    Run {
        /// Scenario YAML file
        scenario: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = EscrowCtlConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }

    init_tracing(&config);

    match cli.command {
        Commands::Run { scenario, output: format } => run(&config, &scenario, format),
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(config: &EscrowCtlConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn run(config: &EscrowCtlConfig, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let scenario = Scenario::from_path(path)
        .with_context(|| format!("failed to load scenario {}", path.display()))?;

    tracing::info!(
        scenario = scenario.name.as_deref().unwrap_or("-"),
        steps = scenario.steps.len(),
        "Replaying scenario"
    );

    let report = Runner::new(config.time.clone(), scenario.start).run(&scenario)?;

    println!("{}", output::render(&report, format)?);

    let mismatches = report.mismatches();
    if mismatches > 0 {
        anyhow::bail!("{} step(s) did not match their expectation", mismatches);
    }
    Ok(())
}
