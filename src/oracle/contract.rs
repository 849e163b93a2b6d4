//! Ethers-backed ledger client
//!
//! Binds the oracle (`getData`, `pushReport`) and the treasury (`rebase`)
//! through `abigen!` and sends transactions via a local signer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ethers::contract::{abigen, parse_log};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, U256, U64};
use tracing::{debug, info, warn};

use super::{OracleClient, RebaseClient};
use crate::config::NetworkConfig;
use crate::types::{OracleEndpoint, OracleReadResult, TxSummary};

abigen!(
    OracleContract,
    r#"[
        function getData() external view returns (uint256, bool)
        function pushReport(uint256 payload) external
        event ProviderReportPushed(address indexed provider, uint256 payload, uint256 timestamp)
    ]"#
);

abigen!(
    RebaseContract,
    r#"[
        function rebase() external
    ]"#
);

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// JSON-RPC client for the oracles and the rebase target
pub struct EthersLedger {
    client: Arc<SignerClient>,
    rebase_target: Address,
    confirmations: usize,
    tx_timeout: Duration,
}

impl EthersLedger {
    /// Connect to `network.rpc_url` and verify the chain id.
    ///
    /// Without a private key an ephemeral wallet is used; it can read but
    /// any write will be rejected by the oracle's provider whitelist.
    pub async fn connect(
        network: &NetworkConfig,
        rebase_target: Address,
        private_key: Option<&str>,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(network.rpc_url.as_str())
            .with_context(|| format!("Invalid rpc_url '{}'", network.rpc_url))?;

        let chain_id = provider
            .get_chainid()
            .await
            .context("Failed to query chain id")?;
        if chain_id != U256::from(network.chain_id) {
            bail!(
                "Connected to chain {} but configuration expects {}",
                chain_id,
                network.chain_id
            );
        }

        let wallet: LocalWallet = match private_key {
            Some(pk) => pk.parse().context("Invalid PRIVATE_KEY")?,
            None => {
                warn!("No PRIVATE_KEY provided, using an ephemeral read-only wallet");
                LocalWallet::new(&mut rand::thread_rng())
            }
        };
        let signer = wallet.with_chain_id(network.chain_id);
        info!(
            reporter = %format!("{:#x}", signer.address()),
            chain_id = network.chain_id,
            "Ledger connected"
        );

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, signer)),
            rebase_target,
            confirmations: network.confirmations,
            tx_timeout: Duration::from_secs(network.tx_timeout_secs),
        })
    }

    pub fn reporter(&self) -> Address {
        self.client.address()
    }

    async fn confirm(
        &self,
        pending: PendingTransaction<'_, Http>,
        method: &str,
    ) -> Result<TransactionReceipt> {
        let tx_hash = pending.tx_hash();
        let receipt = tokio::time::timeout(self.tx_timeout, pending.confirmations(self.confirmations))
            .await
            .map_err(|_| anyhow!("Timed out waiting for {} tx {:#x}", method, tx_hash))?
            .with_context(|| format!("{} tx {:#x} failed", method, tx_hash))?
            .ok_or_else(|| anyhow!("{} tx {:#x} dropped before confirmation", method, tx_hash))?;

        if receipt.status != Some(U64::from(1)) {
            bail!("{} tx {:#x} reverted", method, tx_hash);
        }
        Ok(receipt)
    }
}

fn summarize(receipt: &TransactionReceipt) -> TxSummary {
    TxSummary {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number.map(|b| b.as_u64()),
    }
}

#[async_trait]
impl OracleClient for EthersLedger {
    async fn read(&self, endpoint: &OracleEndpoint) -> Result<OracleReadResult> {
        let contract = OracleContract::new(endpoint.address, self.client.clone());
        let (last_price, is_fresh) = contract
            .get_data()
            .call()
            .await
            .with_context(|| format!("getData() failed on {}", endpoint))?;

        Ok(OracleReadResult {
            last_price,
            is_fresh,
        })
    }

    async fn push_report(&self, endpoint: &OracleEndpoint, price: U256) -> Result<TxSummary> {
        let contract = OracleContract::new(endpoint.address, self.client.clone());
        let call = contract.push_report(price);
        let pending = call
            .send()
            .await
            .with_context(|| format!("Failed to submit pushReport to {}", endpoint))?;
        let receipt = self.confirm(pending, "pushReport").await?;

        for log in receipt.logs.iter().cloned() {
            if let Ok(event) = parse_log::<ProviderReportPushedFilter>(log) {
                debug!(
                    oracle = %endpoint,
                    provider = %format!("{:#x}", event.provider),
                    payload = %event.payload,
                    timestamp = %event.timestamp,
                    "ProviderReportPushed"
                );
            }
        }

        Ok(summarize(&receipt))
    }
}

#[async_trait]
impl RebaseClient for EthersLedger {
    async fn rebase(&self) -> Result<TxSummary> {
        let contract = RebaseContract::new(self.rebase_target, self.client.clone());
        let call = contract.rebase();
        let pending = call
            .send()
            .await
            .with_context(|| format!("Failed to submit rebase to {:#x}", self.rebase_target))?;
        let receipt = self.confirm(pending, "rebase").await?;
        Ok(summarize(&receipt))
    }
}
