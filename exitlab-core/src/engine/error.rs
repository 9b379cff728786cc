//! Engine errors and signal rejections.
//!
//! Two families: `Rejection`s are recoverable (the signal is skipped and
//! counted, the run continues) while `EngineError`s abort the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::cost::CostModelError;
use crate::domain::{Direction, PositionId};

/// Why a signal was not opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Opening would exceed `max_positions`.
    CapacityReached,
    /// Trading mode excludes the signal's direction.
    DirectionDisabled,
    /// No profile row for the (direction, regime) key.
    ProfileDisabled,
    /// Stop-loss or entry price is NaN or infinite.
    NonFinitePrice,
    /// Stop-loss on the wrong side of entry, or at entry.
    InvalidStopDistance,
    /// No candle with the signal's timestamp has been advanced.
    Unaligned,
    /// Within the cooldown of the last accepted signal in the same direction.
    Cooldown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::CapacityReached => "CAPACITY_REACHED",
            RejectReason::DirectionDisabled => "DIRECTION_DISABLED",
            RejectReason::ProfileDisabled => "PROFILE_DISABLED",
            RejectReason::NonFinitePrice => "NON_FINITE_PRICE",
            RejectReason::InvalidStopDistance => "INVALID_STOP_DISTANCE",
            RejectReason::Unaligned => "UNALIGNED",
            RejectReason::Cooldown => "COOLDOWN",
        };
        f.write_str(s)
    }
}

/// A rejected signal.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{direction} signal at {timestamp} rejected: {reason}")]
pub struct Rejection {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub reason: RejectReason,
}

/// Rejection counts per reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionTally {
    counts: BTreeMap<RejectReason, usize>,
}

impl RejectionTally {
    pub fn record(&mut self, reason: RejectReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: RejectReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RejectReason, usize)> + '_ {
        self.counts.iter().map(|(reason, count)| (*reason, *count))
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

/// Input ordering violations. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("duplicate candle timestamp {0}")]
    DuplicateCandle(DateTime<Utc>),

    #[error("candle at {current} is earlier than previous candle at {previous}")]
    CandleOutOfOrder {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("signal at {current} is earlier than previous signal at {previous}")]
    SignalOutOfOrder {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// Fatal engine errors: the run aborts and its partial output is discarded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("malformed candle at {0}")]
    MalformedCandle(DateTime<Utc>),

    #[error("invariant violated for position {position}: {detail}")]
    Invariant { position: PositionId, detail: String },

    #[error("cost model: {0}")]
    Cost(#[from] CostModelError),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}
