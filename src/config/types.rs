//! Configuration types and re-exports

pub use super::{
    AppConfig, LoggingConfig, NetworkConfig, OracleEntry, PolicyConfig, RebaseConfig, RunConfig,
};
