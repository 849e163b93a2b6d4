//! Run report - what happened to each endpoint and to the rebase

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Direction, OracleEndpoint, TxSummary};

/// Status code of a run that completed, rebase included
pub const STATUS_OK: u8 = 0;
/// Status code of a run whose rebase failed
pub const STATUS_REBASE_FAILED: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EndpointOutcome {
    Stale,
    Throttled,
    Updated {
        previous_price: Decimal,
        next_price: Decimal,
        direction: Direction,
        volatility_band: Decimal,
        spiked: bool,
        receipt: TxSummary,
    },
    /// Dry run: the report was computed but not sent
    Simulated {
        previous_price: Decimal,
        next_price: Decimal,
        direction: Direction,
        volatility_band: Decimal,
        spiked: bool,
    },
    WriteFailed {
        previous_price: Decimal,
        next_price: Decimal,
        reason: String,
    },
    ReadFailed {
        reason: String,
    },
    /// Not attempted because the run deadline passed
    Abandoned,
}

impl EndpointOutcome {
    pub fn is_update(&self) -> bool {
        matches!(self, EndpointOutcome::Updated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointReport {
    pub endpoint: OracleEndpoint,
    #[serde(flatten)]
    pub outcome: EndpointOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RebaseOutcome {
    Confirmed { receipt: TxSummary },
    /// Dry run: not sent
    Simulated,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub dry_run: bool,
    pub endpoints: Vec<EndpointReport>,
    pub rebase: RebaseOutcome,
}

impl RunReport {
    pub fn updated(&self) -> usize {
        self.count(|o| o.is_update())
    }

    pub fn simulated(&self) -> usize {
        self.count(|o| matches!(o, EndpointOutcome::Simulated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, EndpointOutcome::Stale | EndpointOutcome::Throttled))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                EndpointOutcome::WriteFailed { .. } | EndpointOutcome::ReadFailed { .. }
            )
        })
    }

    pub fn abandoned(&self) -> usize {
        self.count(|o| matches!(o, EndpointOutcome::Abandoned))
    }

    fn count(&self, f: impl Fn(&EndpointOutcome) -> bool) -> usize {
        self.endpoints.iter().filter(|r| f(&r.outcome)).count()
    }

    pub fn status_code(&self) -> u8 {
        match self.rebase {
            RebaseOutcome::Failed { .. } => STATUS_REBASE_FAILED,
            _ => STATUS_OK,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code() == STATUS_OK
    }

    /// One-line JSON rendering for logs
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}
