//! ExitLab Runner: replay orchestration, summary metrics, parameter sweeps.
//!
//! This crate builds on `exitlab-core` to provide:
//! - TOML run configuration with content-addressed run ids
//! - Single-replay runner producing a `RunReport`
//! - Ledger summary metrics
//! - Parallel parameter sweeps over profile and engine settings

pub mod config;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{ConfigError, ProfileConfig, ResolverConfig, RunComponents, RunConfig, RunId};
pub use metrics::LedgerSummary;
pub use runner::{run_replay, run_replay_observed, RunError, RunReport};
pub use sweep::{sweep, ParamGrid, SweepResults};
