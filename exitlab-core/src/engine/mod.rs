//! Position lifecycle engine: per-bar state machine and replay driver.
//!
//! The engine consumes a candle stream and opens positions from an aligned
//! signal stream. Each bar, every open position is evaluated in fixed
//! precedence:
//!
//! 1. Timeout: force-close at the close
//! 2. Trailing: update the favorable extreme, ratchet the stop
//! 3. Stop-loss (or group cascade)
//! 4. Take-profits TP1..TP3, dust close
//!
//! Steps 3 and 4 swap under `IntrabarPolicy::BestCase`.

pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod position;
pub mod ratchet;
pub mod replay;

pub use config::{EngineConfig, GapPolicy, IntrabarPolicy, TradingMode};
pub use error::{EngineError, RejectReason, Rejection, RejectionTally, SequenceError};
pub use ledger::TradeLedger;
pub use lifecycle::Engine;
pub use position::Position;
pub use ratchet::RatchetState;
pub use replay::{
    replay, Replay, ReplayFailure, ReplayObserver, ReplayOutcome, DEFAULT_CLASSIFIER_WINDOW,
};
