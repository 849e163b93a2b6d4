//! Oracle Updater - one scheduled reporting round
//!
//! For each configured oracle, in order: read, gate on freshness, draw the
//! update throttle, walk the price and push it. Then trigger the rebase
//! exactly once. Per-endpoint failures are contained; only a failed rebase
//! fails the run, and earlier writes are never rolled back.

mod report;

pub use report::{
    EndpointOutcome, EndpointReport, RebaseOutcome, RunReport, STATUS_OK, STATUS_REBASE_FAILED,
};

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::fixed_point;
use crate::oracle::{OracleClient, RebaseClient};
use crate::random::Randomness;
use crate::types::{OracleEndpoint, OracleReadResult, UpdateDecision};
use crate::walk::PriceWalk;

/// Default chance that a fresh oracle is updated in a round
pub const DEFAULT_UPDATE_PROBABILITY: f64 = 0.75;

#[derive(Debug, Error)]
pub enum RunError {
    /// Nothing was read, written or rebased
    #[error("no oracle endpoints configured")]
    NoEndpoints,
    /// Oracle writes in `report` stay committed
    #[error("rebase failed after processing {} oracles: {reason}", .report.endpoints.len())]
    RebaseFailed {
        reason: String,
        report: Box<RunReport>,
    },
}

impl RunError {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunError::NoEndpoints => None,
            RunError::RebaseFailed { report, .. } => Some(report),
        }
    }
}

pub struct OracleUpdater<O, R> {
    endpoints: Vec<OracleEndpoint>,
    oracles: O,
    rebase: R,
    walk: PriceWalk,
    update_probability: f64,
    dry_run: bool,
    deadline: Option<Duration>,
}

impl<O: OracleClient, R: RebaseClient> OracleUpdater<O, R> {
    pub fn new(endpoints: Vec<OracleEndpoint>, oracles: O, rebase: R, walk: PriceWalk) -> Self {
        Self {
            endpoints,
            oracles,
            rebase,
            walk,
            update_probability: DEFAULT_UPDATE_PROBABILITY,
            dry_run: false,
            deadline: None,
        }
    }

    pub fn with_update_probability(mut self, probability: f64) -> Self {
        self.update_probability = probability;
        self
    }

    /// Read and decide, but send nothing
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Stop starting new endpoints once `deadline` has elapsed in a run
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn endpoints(&self) -> &[OracleEndpoint] {
        &self.endpoints
    }

    pub fn oracle_client(&self) -> &O {
        &self.oracles
    }

    pub fn rebase_client(&self) -> &R {
        &self.rebase
    }

    /// Freshness is a hard gate; the throttle is drawn only for fresh oracles.
    pub fn decide<G: Randomness + ?Sized>(
        &self,
        read: &OracleReadResult,
        rng: &mut G,
    ) -> UpdateDecision {
        if !read.is_fresh {
            return UpdateDecision::Stale;
        }
        if rng.draw() < self.update_probability {
            UpdateDecision::Update
        } else {
            UpdateDecision::Throttled
        }
    }

    /// Run one round and fail if the rebase failed.
    ///
    /// An empty endpoint list is rejected before any call is made.
    pub async fn run_once<G: Randomness + ?Sized>(&self, rng: &mut G) -> Result<RunReport, RunError> {
        if self.endpoints.is_empty() {
            return Err(RunError::NoEndpoints);
        }
        let report = self.execute(rng).await;
        match &report.rebase {
            RebaseOutcome::Failed { reason } => Err(RunError::RebaseFailed {
                reason: reason.clone(),
                report: Box::new(report),
            }),
            _ => Ok(report),
        }
    }

    /// Run a round every `interval` until `shutdown` resolves, returning the
    /// last round's status code.
    ///
    /// `shutdown` is polled across rounds, so a signal that arrives while a
    /// round is in flight ends the loop once that round has finished.
    pub async fn run_on_interval<G, F>(&self, rng: &mut G, interval: Duration, shutdown: F) -> u8
    where
        G: Randomness + ?Sized,
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        let mut last_status = STATUS_OK;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.execute(rng).await;
                    info!(report = %report.to_json(), "Round finished");
                    last_status = report.status_code();
                }
            }
        }

        last_status
    }

    /// Run one round and return the full report regardless of outcome
    pub async fn execute<G: Randomness + ?Sized>(&self, rng: &mut G) -> RunReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut endpoints = Vec::with_capacity(self.endpoints.len());

        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    warn!(
                        remaining = self.endpoints.len() - idx,
                        deadline_ms = deadline.as_millis() as u64,
                        "Run deadline reached, abandoning remaining oracles"
                    );
                    endpoints.extend(self.endpoints[idx..].iter().map(|e| EndpointReport {
                        endpoint: e.clone(),
                        outcome: EndpointOutcome::Abandoned,
                    }));
                    break;
                }
            }

            let outcome = self.process_endpoint(endpoint, rng).await;
            endpoints.push(EndpointReport {
                endpoint: endpoint.clone(),
                outcome,
            });
        }

        let rebase = self.trigger_rebase().await;

        let report = RunReport {
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            dry_run: self.dry_run,
            endpoints,
            rebase,
        };

        info!(
            updated = report.updated(),
            simulated = report.simulated(),
            skipped = report.skipped(),
            failed = report.failed(),
            abandoned = report.abandoned(),
            status = report.status_code(),
            elapsed_ms = report.elapsed_ms,
            "Oracle round complete"
        );

        report
    }

    async fn process_endpoint<G: Randomness + ?Sized>(
        &self,
        endpoint: &OracleEndpoint,
        rng: &mut G,
    ) -> EndpointOutcome {
        let read = match self.oracles.read(endpoint).await {
            Ok(read) => read,
            Err(e) => {
                warn!(oracle = %endpoint, error = %format!("{:#}", e), "Oracle read failed");
                return EndpointOutcome::ReadFailed {
                    reason: format!("{:#}", e),
                };
            }
        };

        match self.decide(&read, rng) {
            UpdateDecision::Stale => {
                info!(oracle = %endpoint, "Oracle is stale, skipping");
                return EndpointOutcome::Stale;
            }
            UpdateDecision::Throttled => {
                debug!(oracle = %endpoint, "Update throttled this round");
                return EndpointOutcome::Throttled;
            }
            UpdateDecision::Update => {}
        }

        let previous_price = match fixed_point::from_wei(read.last_price) {
            Ok(p) if p.is_sign_positive() && !p.is_zero() => p,
            Ok(_) => {
                warn!(oracle = %endpoint, "Oracle reported a zero price, not walking");
                return EndpointOutcome::ReadFailed {
                    reason: "oracle reported a zero price".to_string(),
                };
            }
            Err(e) => {
                warn!(oracle = %endpoint, error = %e, "Unreadable oracle price");
                return EndpointOutcome::ReadFailed {
                    reason: e.to_string(),
                };
            }
        };

        info!(oracle = %endpoint, "Processing");
        let step = self.walk.next_price(previous_price, rng);
        let next_price = step.next_price;
        info!(
            oracle = %endpoint,
            old_price = %previous_price,
            new_price = %next_price,
            direction = %step.state.direction,
            band = %step.state.volatility_band,
            spiked = step.state.spiked,
            "Price walked"
        );

        let payload = match fixed_point::to_wei(next_price) {
            Ok(payload) => payload,
            Err(e) => {
                return EndpointOutcome::WriteFailed {
                    previous_price,
                    next_price,
                    reason: e.to_string(),
                };
            }
        };

        if self.dry_run {
            info!(oracle = %endpoint, payload = %payload, "Dry run: pushReport not sent");
            return EndpointOutcome::Simulated {
                previous_price,
                next_price,
                direction: step.state.direction,
                volatility_band: step.state.volatility_band,
                spiked: step.state.spiked,
            };
        }

        match self.oracles.push_report(endpoint, payload).await {
            Ok(receipt) => {
                info!(oracle = %endpoint, tx = %receipt, "Report pushed");
                EndpointOutcome::Updated {
                    previous_price,
                    next_price,
                    direction: step.state.direction,
                    volatility_band: step.state.volatility_band,
                    spiked: step.state.spiked,
                    receipt,
                }
            }
            Err(e) => {
                error!(oracle = %endpoint, error = %format!("{:#}", e), "pushReport failed");
                EndpointOutcome::WriteFailed {
                    previous_price,
                    next_price,
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    async fn trigger_rebase(&self) -> RebaseOutcome {
        if self.dry_run {
            info!("Dry run: rebase not sent");
            return RebaseOutcome::Simulated;
        }

        match self.rebase.rebase().await {
            Ok(receipt) => {
                info!(tx = %receipt, "Rebase confirmed");
                RebaseOutcome::Confirmed { receipt }
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Rebase failed");
                RebaseOutcome::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }
}
