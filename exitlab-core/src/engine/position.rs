//! Position: the engine's mutable per-trade state machine.
//!
//! A position is created OPEN, may be PARTIALLY_CLOSED any number of times by
//! take-profit fills, and is CLOSED exactly once. Callers only ever see it
//! through shared references; every mutation goes through the engine.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::{EngineConfig, GapPolicy, IntrabarPolicy};
use super::error::EngineError;
use super::ratchet::RatchetState;
use crate::cost::{CostInput, CostModel, CostModelError};
use crate::domain::{Candle, Direction, ExitReason, GroupId, PositionId, Regime, TradeRecord};
use crate::profile::{ParameterProfile, TIERS};

/// Tolerance on `realized_fraction + remaining == 1`. A remaining fraction
/// below it counts as fully closed.
const FRACTION_EPSILON: f64 = 1e-9;

/// An open (or partially closed) position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    // ── Identity ──
    id: PositionId,
    group_id: GroupId,
    direction: Direction,
    regime_at_entry: Regime,
    entry_time: DateTime<Utc>,
    entry_price: f64,
    size: f64,
    profile: ParameterProfile,
    tp_prices: [f64; TIERS],

    // ── Risk ──
    stop: RatchetState,
    original_stop_loss: f64,

    // ── Fill ──
    tp_hit: [bool; TIERS],
    remaining: f64,
    realized_points: f64,
    realized_fraction: f64,
    fill_count: u32,

    // ── Trailing ──
    trailing_active: bool,
    trailing_extreme: f64,
}

/// A decision to close the rest of a position on this bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Exit {
    pub reason: ExitReason,
    /// Raw level before spread.
    pub price: f64,
    /// The position was stopped out at the shared group stop.
    pub trips_group: bool,
}

impl Exit {
    fn new(reason: ExitReason, price: f64) -> Self {
        Self {
            reason,
            price,
            trips_group: false,
        }
    }
}

/// Final fill of a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ClosedFill {
    pub reason: ExitReason,
    pub exit_time: DateTime<Utc>,
    /// Fill price after spread.
    pub exit_price: f64,
}

/// The stop as it stood before this bar's TP fills.
#[derive(Debug, Clone, Copy)]
struct StopGuard {
    level: f64,
    sharing: bool,
    trailing: bool,
}

/// State captured at the start of a bar, compared after it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PositionMark {
    remaining: f64,
    stop: f64,
    tp_hit: [bool; TIERS],
    trailing_active: bool,
}

fn tp_reason(tier: usize) -> ExitReason {
    match tier {
        0 => ExitReason::Tp1,
        1 => ExitReason::Tp2,
        _ => ExitReason::Tp3,
    }
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn open(
        id: PositionId,
        group_id: GroupId,
        direction: Direction,
        regime_at_entry: Regime,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        stop_loss: f64,
        size: f64,
        profile: ParameterProfile,
    ) -> Self {
        Self {
            id,
            group_id,
            direction,
            regime_at_entry,
            entry_time,
            entry_price,
            size,
            tp_prices: profile.tp_prices(direction, entry_price),
            profile,
            stop: RatchetState::new(direction, stop_loss),
            original_stop_loss: stop_loss,
            tp_hit: [false; TIERS],
            remaining: 1.0,
            realized_points: 0.0,
            realized_fraction: 0.0,
            fill_count: 1,
            trailing_active: false,
            trailing_extreme: entry_price,
        }
    }

    // ── Read-only view ──

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn regime_at_entry(&self) -> Regime {
        self.regime_at_entry
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn profile(&self) -> &ParameterProfile {
        &self.profile
    }

    pub fn tp_prices(&self) -> [f64; TIERS] {
        self.tp_prices
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop.level()
    }

    pub fn original_stop_loss(&self) -> f64 {
        self.original_stop_loss
    }

    pub fn tp_hit(&self) -> [bool; TIERS] {
        self.tp_hit
    }

    /// Fraction of the original size still open, in [0, 1].
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Points per unit realized so far, weighted by filled fraction.
    pub fn realized_points(&self) -> f64 {
        self.realized_points
    }

    pub fn realized_fraction(&self) -> f64 {
        self.realized_fraction
    }

    pub fn fill_count(&self) -> u32 {
        self.fill_count
    }

    pub fn trailing_active(&self) -> bool {
        self.trailing_active
    }

    pub fn trailing_extreme(&self) -> f64 {
        self.trailing_extreme
    }

    /// True while the stop is still the group stop set at open.
    pub fn shares_group_stop(&self) -> bool {
        self.stop.level() == self.original_stop_loss
    }

    // ── Per-bar lifecycle ──

    /// Evaluate one candle in fixed precedence. Returns the exit if the
    /// position closes on this bar; partial fills are applied in place.
    ///
    /// `group_trip` is the stop price at which a sibling sharing this
    /// position's group stop was already stopped out on this bar.
    pub(crate) fn advance(
        &mut self,
        candle: &Candle,
        config: &EngineConfig,
        group_trip: Option<f64>,
    ) -> Option<Exit> {
        if candle.timestamp - self.entry_time >= self.profile.timeout() {
            return Some(Exit::new(ExitReason::Timeout, candle.close));
        }

        self.track_extreme(candle);

        // Stop moves made by TP fills on this bar take effect from the next.
        let guard = StopGuard {
            level: self.stop.level(),
            sharing: self.shares_group_stop(),
            trailing: self.trailing_active,
        };

        match config.intrabar_policy {
            IntrabarPolicy::WorstCase => self
                .stop_exit(guard, candle, config.gap_policy, group_trip)
                .or_else(|| self.take_profits(candle, config)),
            IntrabarPolicy::BestCase => self
                .take_profits(candle, config)
                .or_else(|| self.stop_exit(guard, candle, config.gap_policy, group_trip)),
        }
    }

    fn track_extreme(&mut self, candle: &Candle) {
        self.trailing_extreme = self
            .direction
            .better(self.trailing_extreme, self.direction.favorable_extreme(candle));
        if self.trailing_active {
            let proposed = self
                .direction
                .offset(self.trailing_extreme, -self.profile.trailing_distance());
            self.stop.apply(proposed);
        }
    }

    fn stop_exit(
        &self,
        guard: StopGuard,
        candle: &Candle,
        gap_policy: GapPolicy,
        group_trip: Option<f64>,
    ) -> Option<Exit> {
        if guard.sharing {
            if let Some(price) = group_trip {
                return Some(Exit::new(ExitReason::GroupSlCascade, price));
            }
        }
        if !self.direction.stop_touched(guard.level, candle) {
            return None;
        }
        let price = match gap_policy {
            GapPolicy::FillAtOpen if self.direction.gapped_through(guard.level, candle) => {
                candle.open
            }
            _ => guard.level,
        };
        let reason = if guard.trailing {
            ExitReason::TrailingSl
        } else {
            ExitReason::Sl
        };
        Some(Exit {
            reason,
            price,
            trips_group: guard.sharing,
        })
    }

    fn take_profits(&mut self, candle: &Candle, config: &EngineConfig) -> Option<Exit> {
        let fractions = self.profile.tp_fractions();
        let half_spread = config.half_spread();
        let mut highest = None;

        for tier in 0..TIERS {
            if self.tp_hit[tier] || !self.direction.target_touched(self.tp_prices[tier], candle) {
                continue;
            }
            self.tp_hit[tier] = true;
            highest = Some(tier);

            let fill = fractions[tier].min(self.remaining);
            if fill > 0.0 {
                self.realize(fill, self.tp_prices[tier], half_spread);
            }
            if tier == 0 {
                self.trailing_active = true;
                let anchor = self
                    .profile
                    .trail_anchor_price(self.direction, self.entry_price);
                self.stop.apply(anchor);
            }
        }

        let tier = highest?;
        let dust = config.dust_threshold.max(FRACTION_EPSILON);
        if self.tp_hit.iter().all(|&hit| hit) || self.remaining <= dust {
            Some(Exit::new(tp_reason(tier), self.tp_prices[tier]))
        } else {
            None
        }
    }

    fn realize(&mut self, fraction: f64, level: f64, half_spread: f64) -> f64 {
        let fill_price = self.direction.exit_fill(level, half_spread);
        self.realized_points += fraction * self.direction.points(self.entry_price, fill_price);
        self.realized_fraction += fraction;
        self.remaining -= fraction;
        if self.remaining < FRACTION_EPSILON {
            self.remaining = 0.0;
        }
        self.fill_count += 1;
        fill_price
    }

    /// Close whatever is left at `exit.price`.
    pub(crate) fn close(
        &mut self,
        exit: Exit,
        exit_time: DateTime<Utc>,
        half_spread: f64,
    ) -> ClosedFill {
        let exit_price = if self.remaining > FRACTION_EPSILON {
            self.realize(self.remaining, exit.price, half_spread)
        } else {
            self.direction.exit_fill(exit.price, half_spread)
        };
        self.remaining = 0.0;
        ClosedFill {
            reason: exit.reason,
            exit_time,
            exit_price,
        }
    }

    /// Force-close at stream end.
    pub(crate) fn close_end_of_stream(
        &mut self,
        last: &Candle,
        half_spread: f64,
    ) -> ClosedFill {
        self.close(
            Exit::new(ExitReason::EndOfStream, last.close),
            last.timestamp,
            half_spread,
        )
    }

    /// Build the output record for a closed position.
    pub(crate) fn to_record(
        &self,
        closed: &ClosedFill,
        costs: &CostModel,
    ) -> Result<TradeRecord, CostModelError> {
        let duration = closed.exit_time - self.entry_time;
        let hours_held = duration.num_seconds() as f64 / 3600.0;
        let breakdown = costs.apply_costs(&CostInput {
            entry_price: self.entry_price,
            direction: self.direction,
            gross_points: self.realized_points,
            size: self.size,
            hours_held,
            fill_events: self.fill_count,
        })?;
        let pnl_pct = breakdown.net_points / (self.entry_price * self.size) * 100.0;

        Ok(TradeRecord {
            position_id: self.id,
            group_id: self.group_id,
            direction: self.direction,
            regime_at_entry: self.regime_at_entry,
            entry_time: self.entry_time,
            exit_time: closed.exit_time,
            entry_price: self.entry_price,
            exit_price: closed.exit_price,
            stop_loss_at_exit: self.stop.level(),
            original_stop_loss: self.original_stop_loss,
            tp1_hit: self.tp_hit[0],
            tp2_hit: self.tp_hit[1],
            tp3_hit: self.tp_hit[2],
            trailing_used: self.trailing_active,
            exit_reason: closed.reason,
            fill_count: self.fill_count,
            size: self.size,
            gross_points: self.realized_points,
            commission: breakdown.commission,
            swap: breakdown.swap,
            pnl_points: breakdown.net_points,
            pnl_pct,
            duration,
        })
    }

    // ── Invariant guard ──

    pub(crate) fn mark(&self) -> PositionMark {
        PositionMark {
            remaining: self.remaining,
            stop: self.stop.level(),
            tp_hit: self.tp_hit,
            trailing_active: self.trailing_active,
        }
    }

    /// Compare against the state at the start of the bar.
    pub(crate) fn check_invariants(&self, before: &PositionMark) -> Result<(), EngineError> {
        let fail = |detail: String| {
            Err(EngineError::Invariant {
                position: self.id,
                detail,
            })
        };

        if !(0.0..=1.0).contains(&self.remaining) {
            return fail(format!("remaining {} outside [0, 1]", self.remaining));
        }
        if self.remaining > before.remaining {
            return fail(format!(
                "remaining increased from {} to {}",
                before.remaining, self.remaining
            ));
        }
        if (self.realized_fraction + self.remaining - 1.0).abs() > FRACTION_EPSILON {
            return fail(format!(
                "realized {} + remaining {} != 1",
                self.realized_fraction, self.remaining
            ));
        }
        for tier in 0..TIERS {
            if before.tp_hit[tier] && !self.tp_hit[tier] {
                return fail(format!("TP{} flag was unset", tier + 1));
            }
        }
        if before.trailing_active {
            if !self.trailing_active {
                return fail("trailing latch was released".into());
            }
            if self.direction.is_tighter(before.stop, self.stop.level()) {
                return fail(format!(
                    "trailing stop loosened from {} to {}",
                    before.stop,
                    self.stop.level()
                ));
            }
        }
        if !(self.stop.level().is_finite()
            && self.trailing_extreme.is_finite()
            && self.realized_points.is_finite())
        {
            return fail("non-finite price state".into());
        }
        Ok(())
    }
}
