//! oracle-updater - scheduled oracle reporter
//!
//! Usage:
//! ```bash
//! oracle-updater                 # one round, or loop if run.interval_secs is set
//! oracle-updater --once          # exactly one round
//! oracle-updater --dry-run       # read and decide, send nothing
//! oracle-updater --config deploy.yaml
//! ```
//!
//! Exit codes: 0 round completed, 1 rebase failed, 2 configuration or
//! startup error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use oracle_updater::config::{AppConfig, LoggingConfig};
use oracle_updater::oracle::EthersLedger;
use oracle_updater::random::RngRandomness;
use oracle_updater::updater::OracleUpdater;
use oracle_updater::walk::PriceWalk;

const EXIT_STARTUP: u8 = 2;

/// Walks oracle prices and triggers the treasury rebase
#[derive(Parser)]
#[command(name = "oracle-updater")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file layered over config/default and config/local
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single round even if run.interval_secs is set
    #[arg(long)]
    once: bool,

    /// Compute and log reports without sending transactions
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };
    if cli.dry_run {
        config.run.dry_run = true;
    }

    init_tracing(&config.logging);

    match run(&cli, &config).await {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Startup failed");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

async fn run(cli: &Cli, config: &AppConfig) -> Result<u8> {
    config.validate()?;
    config.validate_env()?;
    info!(config = %config, "Starting oracle updater");

    let private_key = std::env::var("PRIVATE_KEY").ok();
    let rebase_target = config.rebase_target()?;

    // One connection serves both the oracles and the rebase target
    let ledger = Arc::new(
        EthersLedger::connect(&config.network, rebase_target, private_key.as_deref()).await?,
    );

    let updater = OracleUpdater::new(
        config.endpoints()?,
        ledger.clone(),
        ledger,
        PriceWalk::new(config.walk_policy()),
    )
    .with_update_probability(config.policy.update_probability)
    .with_dry_run(config.run.dry_run)
    .with_deadline(config.deadline());

    let mut rng = RngRandomness::from_entropy();

    let interval = match (cli.once, config.run.interval_secs) {
        (false, Some(secs)) if secs > 0 => Duration::from_secs(secs),
        _ => {
            let report = updater.execute(&mut rng).await;
            info!(report = %report.to_json(), "Round finished");
            return Ok(report.status_code());
        }
    };

    info!(interval_secs = interval.as_secs(), "Running on interval");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for ctrl-c, stop the process to exit");
            std::future::pending::<()>().await;
        }
    };

    Ok(updater.run_on_interval(&mut rng, interval, shutdown).await)
}
