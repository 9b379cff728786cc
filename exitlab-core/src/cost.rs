//! Cost model: commission and swap on top of gross P&L.
//!
//! Spread is already embedded in the entry/exit fill prices by the engine, so
//! this model only adds commission (per unit, per fill event) and overnight
//! swap. It is a pure function of its input; nothing here holds state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Direction;

/// Hours in one swap day.
const HOURS_PER_DAY: f64 = 24.0;

/// Default grace period before swap starts accruing.
pub const DEFAULT_SWAP_GRACE_HOURS: f64 = 24.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostModelError {
    #[error("entry price must be positive and finite, got {0}")]
    NonPositiveEntryPrice(f64),

    #[error("position size must be non-negative and finite, got {0}")]
    NegativeSize(f64),

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} is out of range: {value}")]
    InvalidParameter { field: &'static str, value: f64 },
}

/// Everything the cost model needs to know about one closed position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostInput {
    pub entry_price: f64,
    pub direction: Direction,
    /// Realized points per unit size, before costs.
    pub gross_points: f64,
    pub size: f64,
    pub hours_held: f64,
    /// Entry plus every partial and final exit.
    pub fill_events: u32,
}

/// Costs charged against one position, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub commission: f64,
    /// Positive is a charge, negative a credit.
    pub swap: f64,
    /// `gross_points * size - commission - swap`.
    pub net_points: f64,
}

/// Commission and swap schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Points charged per unit size at every fill.
    pub commission_per_unit: f64,
    /// Points per unit per day held long (positive = charge, negative = credit).
    pub swap_long_per_day: f64,
    /// Points per unit per day held short.
    pub swap_short_per_day: f64,
    /// Holding time below which no swap is charged.
    pub swap_grace_hours: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::frictionless()
    }
}

impl CostModel {
    pub fn new(commission_per_unit: f64, swap_long_per_day: f64, swap_short_per_day: f64) -> Self {
        Self {
            commission_per_unit,
            swap_long_per_day,
            swap_short_per_day,
            swap_grace_hours: DEFAULT_SWAP_GRACE_HOURS,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn with_grace_hours(mut self, hours: f64) -> Self {
        self.swap_grace_hours = hours;
        self
    }

    /// Check the schedule itself. Swap rates may be negative (credits);
    /// commission and grace may not.
    pub fn validate(&self) -> Result<(), CostModelError> {
        if !self.commission_per_unit.is_finite() || self.commission_per_unit < 0.0 {
            return Err(CostModelError::InvalidParameter {
                field: "commission_per_unit",
                value: self.commission_per_unit,
            });
        }
        for (field, value) in [
            ("swap_long_per_day", self.swap_long_per_day),
            ("swap_short_per_day", self.swap_short_per_day),
        ] {
            if !value.is_finite() {
                return Err(CostModelError::NonFinite { field, value });
            }
        }
        if !self.swap_grace_hours.is_finite() || self.swap_grace_hours < 0.0 {
            return Err(CostModelError::InvalidParameter {
                field: "swap_grace_hours",
                value: self.swap_grace_hours,
            });
        }
        Ok(())
    }

    /// Whole swap days charged for a holding period.
    ///
    /// Zero within the grace period; beyond it, every whole 24h day held.
    pub fn swap_days(&self, hours_held: f64) -> u32 {
        if hours_held <= self.swap_grace_hours {
            return 0;
        }
        (hours_held / HOURS_PER_DAY).floor() as u32
    }

    fn swap_rate(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.swap_long_per_day,
            Direction::Short => self.swap_short_per_day,
        }
    }

    /// Net a position's gross P&L.
    ///
    /// # Errors
    /// A non-positive entry price, a negative size or non-finite inputs
    /// indicate an upstream defect and are reported, never clamped.
    pub fn apply_costs(&self, input: &CostInput) -> Result<CostBreakdown, CostModelError> {
        if !input.entry_price.is_finite() || input.entry_price <= 0.0 {
            return Err(CostModelError::NonPositiveEntryPrice(input.entry_price));
        }
        if !input.size.is_finite() || input.size < 0.0 {
            return Err(CostModelError::NegativeSize(input.size));
        }
        for (field, value) in [
            ("gross_points", input.gross_points),
            ("hours_held", input.hours_held),
        ] {
            if !value.is_finite() {
                return Err(CostModelError::NonFinite { field, value });
            }
        }

        let commission = self.commission_per_unit * input.size * f64::from(input.fill_events);
        let days = self.swap_days(input.hours_held);
        let swap = self.swap_rate(input.direction) * f64::from(days) * input.size;
        let net_points = input.gross_points * input.size - commission - swap;

        Ok(CostBreakdown {
            commission,
            swap,
            net_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(gross_points: f64, hours_held: f64, fill_events: u32) -> CostInput {
        CostInput {
            entry_price: 1000.0,
            direction: Direction::Long,
            gross_points,
            size: 2.0,
            hours_held,
            fill_events,
        }
    }

    #[test]
    fn frictionless_passes_gross_through() {
        let out = CostModel::frictionless()
            .apply_costs(&input(12.5, 100.0, 4))
            .unwrap();
        assert_eq!(out.commission, 0.0);
        assert_eq!(out.swap, 0.0);
        assert_eq!(out.net_points, 25.0);
    }

    #[test]
    fn commission_charged_per_fill_and_unit() {
        let model = CostModel::new(0.1, 0.0, 0.0);
        let out = model.apply_costs(&input(10.0, 1.0, 3)).unwrap();
        // 0.1 * 2 units * 3 fills
        assert!((out.commission - 0.6).abs() < 1e-12);
        assert!((out.net_points - 19.4).abs() < 1e-12);
    }

    #[test]
    fn swap_respects_grace_period() {
        let model = CostModel::new(0.0, 1.5, -0.5);
        assert_eq!(model.swap_days(23.0), 0);
        assert_eq!(model.swap_days(24.0), 0);
        assert_eq!(model.swap_days(25.0), 1);
        assert_eq!(model.swap_days(72.5), 3);

        let out = model.apply_costs(&input(10.0, 49.0, 2)).unwrap();
        // 2 days * 1.5 * 2 units
        assert!((out.swap - 6.0).abs() < 1e-12);
        assert!((out.net_points - 14.0).abs() < 1e-12);
    }

    #[test]
    fn short_swap_credit_increases_net() {
        let model = CostModel::new(0.0, 1.5, -0.5);
        let mut short = input(10.0, 49.0, 2);
        short.direction = Direction::Short;
        let out = model.apply_costs(&short).unwrap();
        assert!((out.swap + 2.0).abs() < 1e-12);
        assert!((out.net_points - 22.0).abs() < 1e-12);
    }

    #[test]
    fn custom_grace_period() {
        let model = CostModel::new(0.0, 1.0, 1.0).with_grace_hours(0.0);
        assert_eq!(model.swap_days(24.0), 1);
        assert_eq!(model.swap_days(12.0), 0);
    }

    #[test]
    fn invalid_inputs_are_errors() {
        let model = CostModel::frictionless();
        let mut bad = input(1.0, 1.0, 2);
        bad.entry_price = 0.0;
        assert_eq!(
            model.apply_costs(&bad),
            Err(CostModelError::NonPositiveEntryPrice(0.0))
        );

        let mut bad = input(1.0, 1.0, 2);
        bad.size = -1.0;
        assert_eq!(model.apply_costs(&bad), Err(CostModelError::NegativeSize(-1.0)));

        let bad = input(f64::NAN, 1.0, 2);
        assert!(matches!(
            model.apply_costs(&bad),
            Err(CostModelError::NonFinite { field: "gross_points", .. })
        ));
    }

    #[test]
    fn validate_schedule() {
        assert!(CostModel::new(0.1, -0.3, 0.2).validate().is_ok());
        assert!(CostModel::new(-0.1, 0.0, 0.0).validate().is_err());
        assert!(CostModel::new(0.0, f64::INFINITY, 0.0).validate().is_err());
        assert!(CostModel::frictionless()
            .with_grace_hours(-1.0)
            .validate()
            .is_err());
    }
}
