//! Oracle Updater Library
//!
//! Drives a set of on-chain price oracles with a bounded random walk and
//! triggers the treasury rebase once per run.

pub mod config;
pub mod fixed_point;
pub mod oracle;
pub mod random;
pub mod types;
pub mod updater;
pub mod walk;
