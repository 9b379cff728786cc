//! Parameter profiles and the (direction, regime) resolver.
//!
//! A `ParameterProfile` is the exit plan frozen into every position at open:
//! three take-profit tiers, the trailing distance and the timeout. Profiles
//! are validated once at construction; an invalid table is a configuration
//! error, never a runtime surprise.
//!
//! Variants of an exit strategy are rows in the resolver table rather than
//! code paths. Several rows under the same key form a sibling ladder that is
//! opened as one group sharing the signal's stop-loss.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{Direction, Regime};
use crate::engine::RejectReason;

/// Tolerance for the close fractions summing to one.
pub const FRACTION_SUM_TOLERANCE: f64 = 1e-6;

/// Number of take-profit tiers per profile.
pub const TIERS: usize = 3;

/// Configuration errors raised while building profiles or the resolver table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("TP{tier} distance must be positive and finite, got {value}")]
    InvalidDistance { tier: usize, value: f64 },

    #[error("take-profit distances must be strictly ascending, got {tp1} / {tp2} / {tp3}")]
    TargetsNotAscending { tp1: f64, tp2: f64, tp3: f64 },

    #[error("TP{tier} fraction must be in (0, 1], got {value}")]
    FractionOutOfRange { tier: usize, value: f64 },

    #[error("close fractions must sum to 1.0, got {sum}")]
    FractionSum { sum: f64 },

    #[error("trailing distance must be positive and finite, got {0}")]
    InvalidTrailingDistance(f64),

    #[error("timeout must be positive, got {0} seconds")]
    InvalidTimeout(i64),

    #[error("resolver table has no rows")]
    EmptyTable,
}

/// Where TP1 anchors the first trailing stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailAnchor {
    /// Move the stop to the entry price.
    #[default]
    Breakeven,
    /// Move the stop to `tp1_price - trailing_distance` (mirrored for shorts).
    Tp1Offset,
}

/// Validated, immutable exit plan.
///
/// Fields are private: the only way to obtain a profile is through
/// [`ParameterProfile::new`], so every profile in circulation satisfies the
/// ordering and fraction-sum checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterProfile {
    tp_distances: [f64; TIERS],
    tp_fractions: [f64; TIERS],
    trailing_distance: f64,
    #[serde(with = "crate::domain::duration_secs")]
    timeout: Duration,
    trail_anchor: TrailAnchor,
}

impl ParameterProfile {
    /// Build and validate a profile.
    ///
    /// # Errors
    /// - any distance or the trailing distance not positive and finite
    /// - distances not strictly ascending (tp1 < tp2 < tp3)
    /// - a fraction outside (0, 1], or fractions not summing to 1.0
    /// - a non-positive timeout
    pub fn new(
        tp_distances: [f64; TIERS],
        tp_fractions: [f64; TIERS],
        trailing_distance: f64,
        timeout: Duration,
    ) -> Result<Self, ProfileError> {
        for (i, &d) in tp_distances.iter().enumerate() {
            if !d.is_finite() || d <= 0.0 {
                return Err(ProfileError::InvalidDistance {
                    tier: i + 1,
                    value: d,
                });
            }
        }
        let [tp1, tp2, tp3] = tp_distances;
        if !(tp1 < tp2 && tp2 < tp3) {
            return Err(ProfileError::TargetsNotAscending { tp1, tp2, tp3 });
        }

        for (i, &f) in tp_fractions.iter().enumerate() {
            if !f.is_finite() || f <= 0.0 || f > 1.0 {
                return Err(ProfileError::FractionOutOfRange {
                    tier: i + 1,
                    value: f,
                });
            }
        }
        let sum: f64 = tp_fractions.iter().sum();
        if (sum - 1.0).abs() > FRACTION_SUM_TOLERANCE {
            return Err(ProfileError::FractionSum { sum });
        }

        if !trailing_distance.is_finite() || trailing_distance <= 0.0 {
            return Err(ProfileError::InvalidTrailingDistance(trailing_distance));
        }
        if timeout <= Duration::zero() {
            return Err(ProfileError::InvalidTimeout(timeout.num_seconds()));
        }

        Ok(Self {
            tp_distances,
            tp_fractions,
            trailing_distance,
            timeout,
            trail_anchor: TrailAnchor::default(),
        })
    }

    pub fn with_trail_anchor(mut self, anchor: TrailAnchor) -> Self {
        self.trail_anchor = anchor;
        self
    }

    pub fn tp_distances(&self) -> [f64; TIERS] {
        self.tp_distances
    }

    pub fn tp_fractions(&self) -> [f64; TIERS] {
        self.tp_fractions
    }

    pub fn trailing_distance(&self) -> f64 {
        self.trailing_distance
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn trail_anchor(&self) -> TrailAnchor {
        self.trail_anchor
    }

    /// Absolute target prices for an entry, in tier order.
    pub fn tp_prices(&self, direction: Direction, entry_price: f64) -> [f64; TIERS] {
        self.tp_distances
            .map(|distance| direction.offset(entry_price, distance))
    }

    /// The stop TP1 moves to once it fills.
    pub fn trail_anchor_price(&self, direction: Direction, entry_price: f64) -> f64 {
        match self.trail_anchor {
            TrailAnchor::Breakeven => entry_price,
            TrailAnchor::Tp1Offset => {
                let tp1 = direction.offset(entry_price, self.tp_distances[0]);
                direction.offset(tp1, -self.trailing_distance)
            }
        }
    }
}

/// One row of the resolver table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileRow {
    pub direction: Direction,
    pub regime: Regime,
    pub profile: ParameterProfile,
}

/// Pure lookup `(direction, regime) -> profile ladder`.
///
/// Missing keys resolve to a rejection: a SHORT+RANGE row can simply be left
/// out to disable that combination.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileResolver {
    table: BTreeMap<(Direction, Regime), Vec<ParameterProfile>>,
    default_regime: Regime,
}

impl ProfileResolver {
    /// Build a resolver from validated rows. Rows sharing a key keep their
    /// input order and form that key's sibling ladder.
    pub fn from_rows<I>(rows: I, default_regime: Regime) -> Result<Self, ProfileError>
    where
        I: IntoIterator<Item = ProfileRow>,
    {
        let mut table: BTreeMap<(Direction, Regime), Vec<ParameterProfile>> = BTreeMap::new();
        for row in rows {
            table
                .entry((row.direction, row.regime))
                .or_default()
                .push(row.profile);
        }
        if table.is_empty() {
            return Err(ProfileError::EmptyTable);
        }
        Ok(Self {
            table,
            default_regime,
        })
    }

    /// A resolver that maps every (direction, regime) key to `profile`.
    pub fn uniform(profile: ParameterProfile) -> Self {
        let mut table = BTreeMap::new();
        for direction in [Direction::Long, Direction::Short] {
            for regime in [Regime::Trend, Regime::Range] {
                table.insert((direction, regime), vec![profile]);
            }
        }
        Self {
            table,
            default_regime: Regime::Trend,
        }
    }

    /// Regime used for signals that carry no tag.
    pub fn default_regime(&self) -> Regime {
        self.default_regime
    }

    pub fn with_default_regime(mut self, regime: Regime) -> Self {
        self.default_regime = regime;
        self
    }

    /// First profile of the key's ladder.
    pub fn resolve(
        &self,
        direction: Direction,
        regime: Regime,
    ) -> Result<&ParameterProfile, RejectReason> {
        self.resolve_group(direction, regime)
            .and_then(|ladder| ladder.first().ok_or(RejectReason::ProfileDisabled))
    }

    /// Full sibling ladder for a key.
    pub fn resolve_group(
        &self,
        direction: Direction,
        regime: Regime,
    ) -> Result<&[ParameterProfile], RejectReason> {
        self.table
            .get(&(direction, regime))
            .map(Vec::as_slice)
            .ok_or(RejectReason::ProfileDisabled)
    }

    pub fn is_enabled(&self, direction: Direction, regime: Regime) -> bool {
        self.table.contains_key(&(direction, regime))
    }

    /// Number of rows across all keys.
    pub fn row_count(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }
}
