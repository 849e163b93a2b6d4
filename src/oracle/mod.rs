//! Oracle module - access to the on-chain price oracles and rebase target
//!
//! The updater talks to the ledger only through [`OracleClient`] and
//! [`RebaseClient`]; [`EthersLedger`] implements both over JSON-RPC.

mod contract;

pub use contract::{EthersLedger, SignerClient};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::U256;

use crate::types::{OracleEndpoint, OracleReadResult, TxSummary};

/// Read/write access to price oracles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OracleClient: Send + Sync {
    /// Current `(price, isFresh)` of the oracle
    async fn read(&self, endpoint: &OracleEndpoint) -> Result<OracleReadResult>;

    /// Submit a new 18-decimal report and wait for it to be mined
    async fn push_report(&self, endpoint: &OracleEndpoint, price: U256) -> Result<TxSummary>;
}

/// The parameterless downstream rebase
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RebaseClient: Send + Sync {
    async fn rebase(&self) -> Result<TxSummary>;
}

#[async_trait]
impl<T: OracleClient + ?Sized> OracleClient for Arc<T> {
    async fn read(&self, endpoint: &OracleEndpoint) -> Result<OracleReadResult> {
        (**self).read(endpoint).await
    }

    async fn push_report(&self, endpoint: &OracleEndpoint, price: U256) -> Result<TxSummary> {
        (**self).push_report(endpoint, price).await
    }
}

#[async_trait]
impl<T: RebaseClient + ?Sized> RebaseClient for Arc<T> {
    async fn rebase(&self) -> Result<TxSummary> {
        (**self).rebase().await
    }
}
