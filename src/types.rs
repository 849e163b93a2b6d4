//! Core types used throughout the updater
//!
//! Endpoints, oracle snapshots, walk state and per-endpoint decisions.

use ethers::types::{Address, H256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A remote price oracle reachable by address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OracleEndpoint {
    pub address: Address,
    /// Human readable name used in logs only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl OracleEndpoint {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Display for OracleEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({:#x})", label, self.address),
            None => write!(f, "{:#x}", self.address),
        }
    }
}

/// Snapshot returned by an oracle's `getData()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleReadResult {
    /// Last aggregated price, 18-decimal fixed point
    pub last_price: U256,
    /// Whether the oracle considers its aggregated report valid
    pub is_fresh: bool,
}

/// Direction of one walk step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Transient parameters of a single walk step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceWalkState {
    pub previous_price: Decimal,
    pub direction: Direction,
    /// Fractional band after the spike multiplier (if any) was applied
    pub volatility_band: Decimal,
    pub spiked: bool,
}

/// What happens to one endpoint this round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateDecision {
    /// Oracle reported itself stale; never written
    Stale,
    /// Fresh, but the update draw said skip
    Throttled,
    Update,
}

/// Minimal view of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxSummary {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
}

impl fmt::Display for TxSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_number {
            Some(block) => write!(f, "{:#x}@{}", self.tx_hash, block),
            None => write!(f, "{:#x}", self.tx_hash),
        }
    }
}
