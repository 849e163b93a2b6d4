//! Configuration management for the oracle updater
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use config::{Config, Environment, File};
use ethers::types::Address;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::OracleEndpoint;
use crate::walk::WalkPolicy;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub oracles: Vec<OracleEntry>,
    pub rebase: RebaseConfig,
    pub policy: PolicyConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Expected chain id, checked on connect
    pub chain_id: u64,
    /// Confirmations to wait for on each transaction
    pub confirmations: usize,
    /// Give up waiting for a receipt after this many seconds
    pub tx_timeout_secs: u64,
}

/// One configured oracle
#[derive(Debug, Clone, Deserialize)]
pub struct OracleEntry {
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebaseConfig {
    /// Contract exposing `rebase()`
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Chance a fresh oracle is updated in a round
    pub update_probability: f64,
    /// Chance of the volatility shock regime
    pub spike_probability: f64,
    pub spike_multiplier: Decimal,
    /// Prices at or below this are treated as low-priced
    pub low_price_threshold: Decimal,
    pub base_band: Decimal,
    pub low_price_band: Decimal,
    /// Decimal places of reported prices
    pub decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Compute and log, but send no transactions
    pub dry_run: bool,
    /// Re-run on this cadence instead of exiting after one round
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Abandon remaining oracles once a round has run this long
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(extra: Option<&Path>) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let mut builder = Config::builder()
            // Network defaults (local anvil node)
            .set_default("network.rpc_url", "http://localhost:8545")?
            .set_default("network.chain_id", 31337)?
            .set_default("network.confirmations", 1)?
            .set_default("network.tx_timeout_secs", 120)?
            // Rebase target
            .set_default("rebase.address", "")?
            // Policy defaults
            .set_default("policy.update_probability", 0.75)?
            .set_default("policy.spike_probability", 0.15)?
            .set_default("policy.spike_multiplier", 4)?
            .set_default("policy.low_price_threshold", 2)?
            .set_default("policy.base_band", 0.05)?
            .set_default("policy.low_price_band", 0.10)?
            .set_default("policy.decimals", 2)?
            // Run defaults
            .set_default("run.dry_run", false)?
            // Logging defaults
            .set_default("logging.json", false)?
            .set_default("logging.level", "info")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Override with environment variables (ORACLE_UPDATER__*)
            .add_source(Environment::with_prefix("ORACLE_UPDATER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Check ranges and addresses
    pub fn validate(&self) -> Result<()> {
        let p = &self.policy;
        ensure!(
            (0.0..=1.0).contains(&p.update_probability),
            "policy.update_probability must be within [0, 1], got {}",
            p.update_probability
        );
        ensure!(
            (0.0..=1.0).contains(&p.spike_probability),
            "policy.spike_probability must be within [0, 1], got {}",
            p.spike_probability
        );
        ensure!(
            p.base_band > Decimal::ZERO && p.low_price_band > Decimal::ZERO,
            "policy bands must be positive"
        );
        ensure!(
            p.spike_multiplier >= Decimal::ONE,
            "policy.spike_multiplier must be at least 1"
        );
        // Down-moves in the shock regime must keep prices positive
        let widest = p.base_band.max(p.low_price_band) * p.spike_multiplier;
        ensure!(
            widest < Decimal::ONE,
            "widest band ({}) must stay below 100%",
            widest
        );
        ensure!(p.decimals <= 18, "policy.decimals must be at most 18");

        if self.oracles.is_empty() {
            bail!("No oracles configured");
        }
        self.endpoints()?;
        self.rebase_target()?;
        Ok(())
    }

    pub fn endpoints(&self) -> Result<Vec<OracleEndpoint>> {
        self.oracles
            .iter()
            .map(|entry| {
                let address: Address = entry
                    .address
                    .parse()
                    .with_context(|| format!("Invalid oracle address '{}'", entry.address))?;
                let endpoint = OracleEndpoint::new(address);
                Ok(match &entry.label {
                    Some(label) => endpoint.with_label(label.clone()),
                    None => endpoint,
                })
            })
            .collect()
    }

    pub fn rebase_target(&self) -> Result<Address> {
        self.rebase
            .address
            .parse()
            .with_context(|| format!("Invalid rebase address '{}'", self.rebase.address))
    }

    pub fn walk_policy(&self) -> WalkPolicy {
        WalkPolicy {
            low_price_threshold: self.policy.low_price_threshold,
            base_band: self.policy.base_band,
            low_price_band: self.policy.low_price_band,
            spike_probability: self.policy.spike_probability,
            spike_multiplier: self.policy.spike_multiplier,
            decimals: self.policy.decimals,
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.run.deadline_secs.map(Duration::from_secs)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "rpc={} chain_id={} oracles={} rebase={} p_update={:.2} p_spike={:.2} dry_run={}",
            self.network.rpc_url,
            self.network.chain_id,
            self.oracles.len(),
            self.rebase.address,
            self.policy.update_probability,
            self.policy.spike_probability,
            self.run.dry_run
        )
    }

    /// Validate required environment variables
    pub fn validate_env(&self) -> Result<()> {
        if self.run.dry_run {
            return Ok(());
        }

        let pk = std::env::var("PRIVATE_KEY")
            .context("Required environment variable PRIVATE_KEY is not set")?;
        if !pk.starts_with("0x") || pk.len() != 66 {
            bail!("PRIVATE_KEY must be a hex string with 0x prefix (66 chars total)");
        }

        Ok(())
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
