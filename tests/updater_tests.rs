//! End-to-end rounds against an in-memory ledger

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use rust_decimal_macros::dec;

use oracle_updater::fixed_point::{from_wei, to_wei};
use oracle_updater::oracle::{OracleClient, RebaseClient};
use oracle_updater::random::{RngRandomness, ScriptedRandomness};
use oracle_updater::types::{OracleEndpoint, OracleReadResult, TxSummary};
use oracle_updater::updater::{EndpointOutcome, OracleUpdater, RebaseOutcome, RunError};
use oracle_updater::walk::PriceWalk;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeOracles {
    state: Mutex<HashMap<Address, OracleReadResult>>,
    writes: Mutex<Vec<(Address, U256)>>,
    rejecting: Mutex<Vec<Address>>,
}

impl FakeOracles {
    fn with(entries: &[(Address, &str, bool)]) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            for (address, price, is_fresh) in entries {
                state.insert(
                    *address,
                    OracleReadResult {
                        last_price: to_wei(price.parse().unwrap()).unwrap(),
                        is_fresh: *is_fresh,
                    },
                );
            }
        }
        fake
    }

    fn reject(&self, address: Address) {
        self.rejecting.lock().unwrap().push(address);
    }

    fn writes(&self) -> Vec<(Address, U256)> {
        self.writes.lock().unwrap().clone()
    }

    fn writes_to(&self, address: Address) -> usize {
        self.writes().iter().filter(|(a, _)| *a == address).count()
    }
}

#[async_trait]
impl OracleClient for FakeOracles {
    async fn read(&self, endpoint: &OracleEndpoint) -> Result<OracleReadResult> {
        self.state
            .lock()
            .unwrap()
            .get(&endpoint.address)
            .copied()
            .ok_or_else(|| anyhow!("no contract at {:#x}", endpoint.address))
    }

    async fn push_report(&self, endpoint: &OracleEndpoint, price: U256) -> Result<TxSummary> {
        if self.rejecting.lock().unwrap().contains(&endpoint.address) {
            return Err(anyhow!("Oracle__InvalidProvider"));
        }
        let mut writes = self.writes.lock().unwrap();
        writes.push((endpoint.address, price));
        Ok(TxSummary {
            tx_hash: H256::from_low_u64_be(writes.len() as u64),
            block_number: Some(writes.len() as u64),
        })
    }
}

#[derive(Default)]
struct FakeRebase {
    calls: Mutex<usize>,
    fail: bool,
}

impl FakeRebase {
    fn failing() -> Self {
        Self {
            calls: Mutex::new(0),
            fail: true,
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RebaseClient for FakeRebase {
    async fn rebase(&self) -> Result<TxSummary> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(anyhow!("execution reverted"));
        }
        Ok(TxSummary {
            tx_hash: H256::repeat_byte(0xee),
            block_number: Some(100),
        })
    }
}

fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

fn endpoints(ns: &[u8]) -> Vec<OracleEndpoint> {
    ns.iter().map(|n| OracleEndpoint::new(addr(*n))).collect()
}

fn updater(
    ns: &[u8],
    oracles: FakeOracles,
    rebase: FakeRebase,
) -> OracleUpdater<FakeOracles, FakeRebase> {
    OracleUpdater::new(endpoints(ns), oracles, rebase, PriceWalk::default())
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn fresh_oracle_skipped_when_throttle_draw_is_high() {
    let oracles = FakeOracles::with(&[(addr(0xA), "10.00", true)]);
    let u = updater(&[0xA], oracles, FakeRebase::default());

    let mut rng = ScriptedRandomness::new(vec![0.80]);
    let report = u.run_once(&mut rng).await.unwrap();

    assert_eq!(report.endpoints[0].outcome, EndpointOutcome::Throttled);
    assert_eq!(u.oracle_client().writes_to(addr(0xA)), 0);
    assert_eq!(u.rebase_client().calls(), 1);
}

#[tokio::test]
async fn throttle_boundary_is_exclusive() {
    let oracles = FakeOracles::with(&[(addr(0xA), "10.00", true)]);
    let u = updater(&[0xA], oracles, FakeRebase::default());

    let mut rng = ScriptedRandomness::new(vec![0.75]);
    let report = u.run_once(&mut rng).await.unwrap();
    assert_eq!(report.updated(), 0);
}

#[tokio::test]
async fn low_priced_oracle_walks_up_within_ten_percent() {
    let oracles = FakeOracles::with(&[(addr(0xB), "1.50", true)]);
    let u = updater(&[0xB], oracles, FakeRebase::default());

    // update, up, no spike, position
    let mut rng = ScriptedRandomness::new(vec![0.10, 0.20, 0.90, 0.37]);
    let report = u.run_once(&mut rng).await.unwrap();

    match &report.endpoints[0].outcome {
        EndpointOutcome::Updated {
            previous_price,
            next_price,
            volatility_band,
            spiked,
            receipt,
            ..
        } => {
            assert_eq!(*previous_price, dec!(1.5));
            assert_eq!(*volatility_band, dec!(0.10));
            assert!(!spiked);
            assert!(*next_price >= dec!(1.50) && *next_price <= dec!(1.65));
            assert_eq!(next_price.scale(), 2);
            assert_eq!(receipt.block_number, Some(1));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let writes = u.oracle_client().writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, addr(0xB));
    // 1.50 + 0.15 * 0.37 = 1.5555 -> 1.56
    assert_eq!(from_wei(writes[0].1).unwrap(), dec!(1.56));
    assert_eq!(
        writes[0].1,
        U256::from_dec_str("1560000000000000000").unwrap()
    );
}

#[tokio::test]
async fn stale_oracle_is_never_written() {
    let oracles = FakeOracles::with(&[(addr(0xC), "42.00", false)]);
    let u = updater(&[0xC], oracles, FakeRebase::default());

    let mut rng = RngRandomness::seeded(3);
    for _ in 0..200 {
        let report = u.run_once(&mut rng).await.unwrap();
        assert_eq!(report.endpoints[0].outcome, EndpointOutcome::Stale);
    }

    assert_eq!(u.oracle_client().writes_to(addr(0xC)), 0);
    assert_eq!(u.rebase_client().calls(), 200);
}

#[tokio::test]
async fn exactly_one_rebase_per_round() {
    let oracles = FakeOracles::with(&[
        (addr(1), "10.00", true),
        (addr(2), "1.50", true),
        (addr(3), "7.00", false),
    ]);
    let u = updater(&[1, 2, 3], oracles, FakeRebase::default());

    // oracle 1 throttled; oracle 2 updated (up, no spike, mid); oracle 3 stale
    let mut rng = ScriptedRandomness::new(vec![0.9, 0.1, 0.2, 0.9, 0.5]);
    let report = u.run_once(&mut rng).await.unwrap();

    assert_eq!(report.updated(), 1);
    assert_eq!(report.skipped(), 2);
    assert_eq!(rng.consumed(), 5);
    assert!(matches!(report.rebase, RebaseOutcome::Confirmed { .. }));
    assert_eq!(u.rebase_client().calls(), 1);
}

#[tokio::test]
async fn rebase_runs_even_when_nothing_was_updated() {
    let oracles = FakeOracles::with(&[(addr(1), "10.00", false), (addr(2), "3.00", true)]);
    let u = updater(&[1, 2], oracles, FakeRebase::default());

    let mut rng = ScriptedRandomness::new(vec![0.99]);
    let report = u.run_once(&mut rng).await.unwrap();

    assert_eq!(report.updated(), 0);
    assert_eq!(u.rebase_client().calls(), 1);
    assert_eq!(report.status_code(), 0);
}

#[tokio::test]
async fn empty_endpoint_list_is_an_error() {
    let u = updater(&[], FakeOracles::default(), FakeRebase::default());
    let err = u
        .run_once(&mut ScriptedRandomness::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::NoEndpoints));
    assert_eq!(u.rebase_client().calls(), 0);
}

#[tokio::test]
async fn rebase_failure_fails_run_but_keeps_writes() {
    let oracles = FakeOracles::with(&[(addr(1), "10.00", true), (addr(2), "20.00", true)]);
    let u = updater(&[1, 2], oracles, FakeRebase::failing());

    let mut rng = ScriptedRandomness::new(vec![0.1, 0.2, 0.9, 0.5]);
    let err = u.run_once(&mut rng).await.unwrap_err();

    match &err {
        RunError::RebaseFailed { reason, report } => {
            assert!(reason.contains("execution reverted"));
            assert_eq!(report.updated(), 2);
            assert_eq!(report.status_code(), 1);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.report().map(|r| r.endpoints.len()), Some(2));

    assert_eq!(u.oracle_client().writes().len(), 2);
    assert_eq!(u.rebase_client().calls(), 1);
}

#[tokio::test]
async fn rejected_write_does_not_stop_the_round() {
    let oracles = FakeOracles::with(&[(addr(1), "10.00", true), (addr(2), "20.00", true)]);
    oracles.reject(addr(1));
    let u = updater(&[1, 2], oracles, FakeRebase::default());

    let mut rng = ScriptedRandomness::new(vec![0.1, 0.2, 0.9, 0.5]);
    let report = u.run_once(&mut rng).await.unwrap();

    assert!(matches!(
        report.endpoints[0].outcome,
        EndpointOutcome::WriteFailed { .. }
    ));
    assert!(report.endpoints[1].outcome.is_update());
    assert_eq!(u.oracle_client().writes_to(addr(2)), 1);
    assert_eq!(u.rebase_client().calls(), 1);
}

#[tokio::test]
async fn unreachable_oracle_is_contained() {
    // addr(9) has no contract in the fake
    let oracles = FakeOracles::with(&[(addr(1), "10.00", true)]);
    let u = updater(&[9, 1], oracles, FakeRebase::default());

    let mut rng = ScriptedRandomness::new(vec![0.1, 0.2, 0.9, 0.5]);
    let report = u.run_once(&mut rng).await.unwrap();

    assert!(matches!(
        report.endpoints[0].outcome,
        EndpointOutcome::ReadFailed { .. }
    ));
    assert!(report.endpoints[1].outcome.is_update());
}

#[tokio::test]
async fn expired_deadline_abandons_remaining_oracles() {
    let oracles = FakeOracles::with(&[(addr(1), "10.00", true), (addr(2), "20.00", true)]);
    let u = updater(&[1, 2], oracles, FakeRebase::default()).with_deadline(Some(Duration::ZERO));

    let mut rng = ScriptedRandomness::new(vec![0.1]);
    let report = u.run_once(&mut rng).await.unwrap();

    assert_eq!(report.abandoned(), 2);
    assert!(u.oracle_client().writes().is_empty());
    assert_eq!(u.rebase_client().calls(), 1);
    assert!(report.is_success());
}

#[tokio::test]
async fn dry_run_reports_simulated_writes() {
    let oracles = FakeOracles::with(&[(addr(1), "10.00", true), (addr(2), "5.00", false)]);
    let u = updater(&[1, 2], oracles, FakeRebase::default()).with_dry_run(true);

    let mut rng = ScriptedRandomness::new(vec![0.1, 0.2, 0.9, 0.5]);
    let report = u.run_once(&mut rng).await.unwrap();

    assert!(matches!(
        report.endpoints[0].outcome,
        EndpointOutcome::Simulated { .. }
    ));
    assert_eq!(report.endpoints[1].outcome, EndpointOutcome::Stale);
    assert_eq!(report.updated(), 0);
    assert_eq!(report.simulated(), 1);
    assert_eq!(report.rebase, RebaseOutcome::Simulated);
    assert!(u.oracle_client().writes().is_empty());
    assert_eq!(u.rebase_client().calls(), 0);
}

#[tokio::test]
async fn update_probability_is_configurable() {
    let oracles = FakeOracles::with(&[(addr(1), "10.00", true)]);
    let u = updater(&[1], oracles, FakeRebase::default()).with_update_probability(0.0);

    let mut rng = RngRandomness::seeded(11);
    for _ in 0..100 {
        u.run_once(&mut rng).await.unwrap();
    }
    assert!(u.oracle_client().writes().is_empty());
}

// ============================================================================
// Statistics
// ============================================================================

#[tokio::test]
async fn fresh_oracle_is_updated_about_three_quarters_of_runs() {
    let oracles = FakeOracles::with(&[(addr(1), "100.00", true)]);
    let u = updater(&[1], oracles, FakeRebase::default());

    let runs = 10_000;
    let mut rng = RngRandomness::seeded(2024);
    let mut updated = 0;
    for _ in 0..runs {
        updated += u.run_once(&mut rng).await.unwrap().updated();
    }

    let ratio = updated as f64 / runs as f64;
    assert!((0.73..0.77).contains(&ratio), "ratio = {}", ratio);
}
