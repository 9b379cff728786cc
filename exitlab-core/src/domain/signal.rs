//! Entry signals, trade direction and regime labels.
//!
//! `Direction` carries all of the mirroring between LONG and SHORT so the
//! lifecycle code is written once: every helper here answers a question in
//! the trader's frame ("is this stop touched?", "which way is favorable?").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::candle::Candle;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for longs, -1.0 for shorts.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Price `distance` units in the favorable direction from `from`.
    pub fn offset(self, from: f64, distance: f64) -> f64 {
        from + self.sign() * distance
    }

    /// Favorable move in price points from `from` to `to` (negative = adverse).
    pub fn points(self, from: f64, to: f64) -> f64 {
        self.sign() * (to - from)
    }

    /// The candle's most favorable price (high for longs, low for shorts).
    pub fn favorable_extreme(self, candle: &Candle) -> f64 {
        match self {
            Direction::Long => candle.high,
            Direction::Short => candle.low,
        }
    }

    /// The candle's most adverse price (low for longs, high for shorts).
    pub fn adverse_extreme(self, candle: &Candle) -> f64 {
        match self {
            Direction::Long => candle.low,
            Direction::Short => candle.high,
        }
    }

    /// The more favorable of two prices.
    pub fn better(self, a: f64, b: f64) -> f64 {
        match self {
            Direction::Long => a.max(b),
            Direction::Short => a.min(b),
        }
    }

    /// True if `candidate` is strictly tighter (less risk) than `current` as a stop.
    pub fn is_tighter(self, candidate: f64, current: f64) -> bool {
        self.sign() * (candidate - current) > 0.0
    }

    /// True if the candle's range reached `stop` on the adverse side.
    pub fn stop_touched(self, stop: f64, candle: &Candle) -> bool {
        match self {
            Direction::Long => candle.low <= stop,
            Direction::Short => candle.high >= stop,
        }
    }

    /// True if the candle's range reached `target` on the favorable side.
    pub fn target_touched(self, target: f64, candle: &Candle) -> bool {
        match self {
            Direction::Long => candle.high >= target,
            Direction::Short => candle.low <= target,
        }
    }

    /// True if the candle opened already beyond `stop` (gapped through it).
    pub fn gapped_through(self, stop: f64, candle: &Candle) -> bool {
        match self {
            Direction::Long => candle.open < stop,
            Direction::Short => candle.open > stop,
        }
    }

    /// Entry fill: the trader pays half the spread (longs buy higher, shorts sell lower).
    pub fn entry_fill(self, price: f64, half_spread: f64) -> f64 {
        price + self.sign() * half_spread
    }

    /// Exit fill: the trader pays half the spread (longs sell lower, shorts buy higher).
    pub fn exit_fill(self, price: f64, half_spread: f64) -> f64 {
        price - self.sign() * half_spread
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Coarse market-state label. Produced externally and treated as an opaque tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Trend,
    Range,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Trend => write!(f, "TREND"),
            Regime::Range => write!(f, "RANGE"),
        }
    }
}

/// Entry signal emitted by an external detector.
///
/// The signal is opened against the candle whose timestamp equals
/// `timestamp`; entry price is that candle's close adjusted for spread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub suggested_stop_loss: f64,
    /// Regime tag supplied with the signal, if any.
    #[serde(default)]
    pub regime: Option<Regime>,
}

impl Signal {
    pub fn new(timestamp: DateTime<Utc>, direction: Direction, suggested_stop_loss: f64) -> Self {
        Self {
            timestamp,
            direction,
            suggested_stop_loss,
            regime: None,
        }
    }

    pub fn with_regime(mut self, regime: Regime) -> Self {
        self.regime = Some(regime);
        self
    }
}
