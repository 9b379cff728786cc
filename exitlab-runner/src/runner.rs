//! Replay runner: wires configuration, engine and summary metrics.
//!
//! Two entry points:
//! - `run_replay()`: config + candles + signals in, `RunReport` out.
//! - `run_replay_observed()`: same, with a read-only observer attached
//!   (monitoring adapters, progress displays).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use exitlab_core::domain::{Candle, Signal, TradeRecord};
use exitlab_core::engine::{RejectionTally, Replay, ReplayFailure, ReplayObserver};

use crate::config::{ConfigError, RunConfig, RunId};
use crate::metrics::LedgerSummary;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Replay(#[from] ReplayFailure),
    #[error("failed to fingerprint ledger: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Current schema version for serialized reports.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single replay run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub trades: Vec<TradeRecord>,
    pub rejections: RejectionTally,
    pub summary: LedgerSummary,
    /// BLAKE3 of the serialized trade sequence.
    pub ledger_fingerprint: String,
    pub bars: usize,
    pub signal_count: usize,
}

/// Reports written before `schema_version` existed read as the current version.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run one replay from a `RunConfig`.
pub fn run_replay(
    config: &RunConfig,
    candles: &[Candle],
    signals: &[Signal],
) -> Result<RunReport, RunError> {
    execute(config, candles, signals, None)
}

/// Run one replay, reporting every bar, record and rejection to `observer`.
pub fn run_replay_observed(
    config: &RunConfig,
    candles: &[Candle],
    signals: &[Signal],
    observer: &mut dyn ReplayObserver,
) -> Result<RunReport, RunError> {
    execute(config, candles, signals, Some(observer))
}

fn execute(
    config: &RunConfig,
    candles: &[Candle],
    signals: &[Signal],
    observer: Option<&mut dyn ReplayObserver>,
) -> Result<RunReport, RunError> {
    let run_id = config.run_id()?;
    let parts = config.build()?;

    info!(
        run_id = %short_id(&run_id),
        profiles = parts.resolver.row_count(),
        max_positions = parts.engine.max_positions,
        "run starting"
    );

    let mut driver = Replay::new(&parts.resolver, parts.costs, parts.engine.clone());
    if let Some(classifier) = &parts.classifier {
        driver = driver.with_classifier(classifier, parts.classifier_window);
    }
    let outcome = driver.run(candles, signals, observer)?;

    let ledger_fingerprint = outcome.ledger.fingerprint()?;
    let trades = outcome.ledger.into_records();
    let summary = LedgerSummary::compute(&trades);

    info!(
        run_id = %short_id(&run_id),
        trades = summary.trade_count,
        rejected = outcome.rejections.total(),
        net_points = summary.total_net_points,
        "run finished"
    );

    Ok(RunReport {
        schema_version: SCHEMA_VERSION,
        run_id,
        trades,
        rejections: outcome.rejections,
        summary,
        ledger_fingerprint,
        bars: outcome.bars,
        signal_count: signals.len(),
    })
}

fn short_id(run_id: &str) -> &str {
    run_id.get(..12).unwrap_or(run_id)
}
